pub mod error;
pub mod table_store;
