pub mod catalog;
pub mod config;
pub mod http;
pub mod logs;
pub mod tools;
mod types;
