//! Usage: HTTP surface: routing, auth extraction, error mapping, OAuth and YouTube calls.

mod auth;
mod errors;
mod handlers;
pub(crate) mod listen;
mod manager;
pub mod oauth;
mod routes;
mod youtube_api;

pub use manager::{ServerManager, ServerStatus};
