pub mod error;
pub mod memory;
pub mod resource_cache;
pub mod transport;
