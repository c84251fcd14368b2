pub mod config;
pub mod connection;
pub mod display;
pub mod errors;
pub mod models;
pub mod progress;
pub mod stream;
pub mod utils;
