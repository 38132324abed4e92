pub mod error;
pub mod metadata;

pub use error::AppError;
pub use metadata::{Ja4Signals, RequestMetadata};
