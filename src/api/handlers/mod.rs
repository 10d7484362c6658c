//! API Handlers

pub mod config_handler;
pub mod memory_handler;
pub mod search_handler;
pub mod system_handler;
