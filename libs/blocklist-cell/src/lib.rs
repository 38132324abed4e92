pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::create_blocklist_router;
pub use services::policy;
pub use services::store::BlocklistStore;
