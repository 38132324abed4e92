pub mod supabase;
pub mod time;

pub use supabase::SupabaseClient;
pub use time::{parse_timestamp, sql_timestamp, window_start};
