pub mod downloader;
pub mod logging;
pub mod models;
pub mod s3;
pub mod store;

mod coordinator;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::downloader::{DownloadError, DownloadOptions, Downloader, MAX_CONCURRENCY};
    pub use crate::models::DownloadStats;
    pub use crate::s3::{S3Settings, S3Store};
    pub use crate::store::{ObjectLocator, ObjectStore};
}
