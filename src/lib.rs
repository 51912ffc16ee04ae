pub mod config;
pub mod readers;
pub mod reconcile;
pub mod services;
pub mod table;
pub mod utils;
pub mod writers;
