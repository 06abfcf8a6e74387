pub mod config;
pub mod core;
pub mod user_config;
