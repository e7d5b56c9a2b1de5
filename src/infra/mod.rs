//! Usage: Infrastructure adapters (configuration, SQLite).

pub mod config;
pub mod db;
