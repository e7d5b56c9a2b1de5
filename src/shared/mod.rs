//! Usage: Cross-cutting helpers shared by every layer.

pub(crate) mod blocking;
pub(crate) mod error;
pub(crate) mod mutex_ext;
pub(crate) mod security;
pub(crate) mod time;
