// Logs module - THE BLACK BOX
// Retrieval of the device event log

mod downloader;
mod transfer;

pub use downloader::{LogDownloader, LogDownloaderConfig};
pub use transfer::{preview, suggested_filename, LogError, LogTransfer, PREVIEW_CHARS};
