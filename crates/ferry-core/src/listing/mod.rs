//! Producers of work items: the remote lister and the local tree walker.

pub mod local;
pub mod remote;

pub use local::{remote_key, upload_items, walk, LocalEntry};
pub use remote::{ExtensionFilter, ListingStatus, RemoteListing};
