pub mod connection;
pub mod store;
pub mod sync_runs;

pub use connection::{init_db, Database};
pub use store::SqliteStore;
