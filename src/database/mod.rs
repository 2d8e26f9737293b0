pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use models::remote_connection::{ConnectionKey, RemoteConnection};
pub use store::{ConnectionStore, TargetStore};
