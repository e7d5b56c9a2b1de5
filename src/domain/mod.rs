//! Usage: Domain persistence (users, bearer sessions, provider token sets).

pub mod sessions;
pub mod token_store;
pub mod users;
