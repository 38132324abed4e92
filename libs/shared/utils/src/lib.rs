pub mod cache;
pub mod duration;
pub mod erfid;
pub mod extractor;
pub mod fingerprint;
pub mod hashing;
pub mod test_utils;

pub use cache::ConfigCache;
pub use duration::format_duration;
pub use erfid::{ErfidConfig, ErfidFormat};
pub use extractor::extract_request_metadata;
