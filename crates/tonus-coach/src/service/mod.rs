pub mod context;
pub mod memory;
pub mod store;
pub mod vision;
