pub mod application;
pub mod render;
pub mod types;
