pub mod codec;
pub mod types;

pub use codec::{decode, encode, Metadata};
pub use types::{normalize_tag, normalize_tags, MetaValue, Priority, Record, Reference, Status};
