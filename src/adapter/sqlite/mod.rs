mod database;
pub mod query;
pub mod repository;
pub mod row;

pub use database::Database;
pub use repository::SqliteStore;
