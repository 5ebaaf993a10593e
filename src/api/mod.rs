pub mod error;
pub mod handler_utils;
pub mod process;
pub mod server;
