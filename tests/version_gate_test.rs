mod helpers;

use std::path::Path;

use dossier::db::version;
use dossier::resilience::CancelFlag;
use dossier::{Dossier, StoreError};
use helpers::{create_issue, test_config, test_dossier};
use rusqlite::Connection;

fn index_conn(root: &Path) -> Connection {
    Connection::open(root.join(".index").join("index.db")).unwrap()
}

#[tokio::test]
async fn fresh_index_is_stamped_with_running_version() {
    let (tmp, dossier) = test_dossier().await;
    dossier.verify().await.unwrap();
    drop(dossier);

    let conn = index_conn(tmp.path());
    let stored = version::get_schema_version(&conn).unwrap();
    assert_eq!(stored.as_deref(), Some(version::running_version()));
}

#[tokio::test]
async fn mismatched_version_refuses_to_open() {
    let (tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Before upgrade", "").await;
    drop(dossier);

    let conn = index_conn(tmp.path());
    version::set_schema_version(&conn, "0.0.1").unwrap();
    drop(conn);

    let err = Dossier::open(test_config(tmp.path())).await.err().unwrap();
    match &err {
        StoreError::VersionMismatch { expected, found } => {
            assert_eq!(expected, version::running_version());
            assert_eq!(found.as_deref(), Some("0.0.1"));
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("0.0.1"), "message: {message}");
    assert!(message.contains("dossier rebuild"), "message: {message}");
}

#[tokio::test]
async fn missing_version_refuses_to_open() {
    let (tmp, dossier) = test_dossier().await;
    drop(dossier);

    let conn = index_conn(tmp.path());
    conn.execute("DROP TABLE schema_meta", []).unwrap();
    drop(conn);

    let err = Dossier::open(test_config(tmp.path())).await.err().unwrap();
    assert!(
        matches!(err, StoreError::VersionMismatch { found: None, .. }),
        "got {err:?}"
    );
    assert!(err.to_string().contains("older release"));
}

#[tokio::test]
async fn maintenance_rebuild_clears_the_gate() {
    let (tmp, dossier) = test_dossier().await;
    create_issue(&dossier, "Carried over", "rebuilt from the file").await;
    drop(dossier);

    let conn = index_conn(tmp.path());
    version::set_schema_version(&conn, "0.0.1").unwrap();
    drop(conn);

    let maintenance = Dossier::open_for_maintenance(test_config(tmp.path()))
        .await
        .unwrap();
    assert!(matches!(
        maintenance.verify().await,
        Err(StoreError::VersionMismatch { .. })
    ));
    let report = maintenance.rebuild(&CancelFlag::new()).await.unwrap();
    assert_eq!(report.records, 1);
    drop(maintenance);

    let dossier = Dossier::open(test_config(tmp.path())).await.unwrap();
    let record = dossier.get("issues", "1").await.unwrap();
    assert_eq!(record.title, "Carried over");
}
