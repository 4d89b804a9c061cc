mod helpers;

use std::sync::Arc;
use std::time::Duration;

use dossier::index::SearchFilter;
use dossier::{NewRecord, RecordPatch, StoreError};
use helpers::{create_issue, test_dossier};

#[tokio::test]
async fn related_must_point_at_existing_records() {
    let (_tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Target", "").await;

    let linked = dossier
        .create(NewRecord::new("plans", "Fix target").related(["issues-1"]))
        .await
        .unwrap();
    assert_eq!(linked.related, vec!["issues-1"]);

    let err = dossier
        .create(NewRecord::new("plans", "Dangling").related(["issues-99"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }), "got {err:?}");

    let err = dossier
        .create(NewRecord::new("plans", "Malformed").related(["not a reference"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }), "got {err:?}");
}

#[tokio::test]
async fn self_references_are_rejected() {
    let (_tmp, dossier) = test_dossier().await;
    let id = create_issue(&dossier, "Loop", "").await;

    let patch = RecordPatch {
        related: Some(vec![format!("issues-{id}")]),
        ..RecordPatch::default()
    };
    let err = dossier.update("issues", &id, patch).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }), "got {err:?}");
}

#[tokio::test]
async fn delete_reports_dangling_links_and_keeps_referrers() {
    let (_tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Doomed", "").await;
    let plan = dossier
        .create(NewRecord::new("plans", "Depends on doomed").related(["issues-1"]))
        .await
        .unwrap();

    let outcome = dossier.delete("issues", "1").await.unwrap();
    assert_eq!(outcome.dangling.len(), 1);
    assert_eq!(outcome.dangling[0].from, plan.reference());
    assert_eq!(outcome.dangling[0].to, "issues-1");

    let plan = dossier.get("plans", &plan.id).await.unwrap();
    assert_eq!(plan.related, vec!["issues-1"], "referrer is left intact");
    assert_eq!(
        dossier.broken_references("plans", &plan.id).await.unwrap(),
        vec!["issues-1"]
    );

    // An unrelated edit to the referrer still goes through.
    let patch = RecordPatch {
        body: Some("still waiting".into()),
        ..RecordPatch::default()
    };
    let updated = dossier.update("plans", &plan.id, patch).await.unwrap();
    assert_eq!(updated.body, "still waiting");
}

#[tokio::test]
async fn backlinks_come_from_the_index() {
    let (_tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Popular", "").await;
    dossier
        .create(NewRecord::new("plans", "One").related(["issues-1"]))
        .await
        .unwrap();
    dossier
        .create(NewRecord::new("decisions", "Two").related(["issues-1"]))
        .await
        .unwrap();
    dossier
        .create(NewRecord::new("plans", "Unrelated"))
        .await
        .unwrap();

    let mut backlinks: Vec<String> = dossier
        .backlinks("issues", "1")
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    backlinks.sort();
    assert_eq!(backlinks, vec!["decisions-1", "plans-1"]);
}

#[tokio::test]
async fn retype_moves_record_and_rewrites_referrers() {
    let (tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Actually a decision", "we chose option B").await;
    let plan = dossier
        .create(NewRecord::new("plans", "Follow up").related(["issues-1"]))
        .await
        .unwrap();

    let moved = dossier.retype("issues", "1", "decisions").await.unwrap();
    assert_eq!(moved.to_string(), "decisions-1");
    assert!(!tmp.path().join("issues").join("issues-1.md").exists());

    let decision = dossier.get("decisions", "1").await.unwrap();
    assert_eq!(decision.title, "Actually a decision");
    assert_eq!(decision.status(), None, "document records drop task fields");

    let plan = dossier.get("plans", &plan.id).await.unwrap();
    assert_eq!(plan.related, vec!["decisions-1"]);

    let err = dossier.get("issues", "1").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let hits = dossier
        .search("option", SearchFilter::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].reference(), moved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retypes_of_linked_records_finish() {
    let (_tmp, dossier) = test_dossier().await;
    let first = dossier
        .create(NewRecord::new("knowledge", "First"))
        .await
        .unwrap();
    dossier
        .create(NewRecord::new("knowledge", "Second").related(["knowledge-1"]))
        .await
        .unwrap();
    let patch = RecordPatch {
        related: Some(vec!["knowledge-2".into()]),
        ..RecordPatch::default()
    };
    dossier.update("knowledge", &first.id, patch).await.unwrap();

    let dossier = Arc::new(dossier);
    let a = tokio::spawn({
        let dossier = dossier.clone();
        async move { dossier.retype("knowledge", "1", "decisions").await }
    });
    let b = tokio::spawn({
        let dossier = dossier.clone();
        async move { dossier.retype("knowledge", "2", "decisions").await }
    });
    let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
        (a.await.unwrap(), b.await.unwrap())
    })
    .await
    .expect("linked retypes should not block each other");
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);

    let moved_first = dossier.get(&a.record_type, &a.id).await.unwrap();
    let moved_second = dossier.get(&b.record_type, &b.id).await.unwrap();
    assert_eq!(moved_first.title, "First");
    assert_eq!(moved_first.related, vec![b.to_string()]);
    assert_eq!(moved_second.related, vec![a.to_string()]);
    assert!(dossier.search("", SearchFilter::of_type("knowledge")).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retype_alongside_referrer_update_finishes() {
    let (_tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Target", "").await;
    let plan = dossier
        .create(NewRecord::new("plans", "Tracks target").related(["issues-1"]))
        .await
        .unwrap();

    let dossier = Arc::new(dossier);
    let retype = tokio::spawn({
        let dossier = dossier.clone();
        async move { dossier.retype("issues", "1", "decisions").await }
    });
    let update = tokio::spawn({
        let dossier = dossier.clone();
        let id = plan.id.clone();
        async move {
            let patch = RecordPatch {
                title: Some("Still tracks target".into()),
                ..RecordPatch::default()
            };
            dossier.update("plans", &id, patch).await
        }
    });
    let (moved, updated) = tokio::time::timeout(Duration::from_secs(10), async {
        (retype.await.unwrap(), update.await.unwrap())
    })
    .await
    .expect("retype and update should not block each other");
    let moved = moved.unwrap();
    updated.unwrap();

    let plan = dossier.get("plans", &plan.id).await.unwrap();
    assert_eq!(plan.title, "Still tracks target");
    assert_eq!(plan.related, vec![moved.to_string()]);
}

#[tokio::test]
async fn retype_to_task_type_applies_defaults() {
    let (_tmp, dossier) = test_dossier().await;
    let note = dossier
        .create(NewRecord::new("knowledge", "Should be tracked"))
        .await
        .unwrap();

    let moved = dossier.retype("knowledge", &note.id, "issues").await.unwrap();
    let issue = dossier.get(&moved.record_type, &moved.id).await.unwrap();
    assert_eq!(issue.status(), Some("open"));
    assert_eq!(issue.priority(), Some("medium"));
}

#[tokio::test]
async fn mentions_find_references_in_body() {
    let (_tmp, dossier) = test_dossier().await;
    let note = dossier
        .create(
            NewRecord::new("sessions", "Standup")
                .body("Discussed issues-4 and plans-2, then issues-4 again. x-1 is not a type; see my-issues-12."),
        )
        .await
        .unwrap();

    let mentions: Vec<String> = dossier
        .mentions("sessions", &note.id)
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(mentions, vec!["issues-4", "plans-2", "issues-12"]);
}
