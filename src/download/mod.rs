mod blocking;
pub mod interrupt;
pub mod progress;
pub mod utils;

pub use blocking::{BlockingDownloader, DownloadError, DownloadOptions, Fetcher};
pub use interrupt::Interrupt;
