pub mod config;
pub mod database;
pub mod modules;
pub mod utils;
