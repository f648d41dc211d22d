pub mod adapter;
pub mod btle;
pub mod constants;
pub mod log_ring;
pub mod matcher;
pub mod runtime;
pub mod session;
pub mod types;
