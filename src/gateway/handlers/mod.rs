//! Usage: axum handlers for the public API surface.

pub(crate) mod identity;
pub(crate) mod youtube;
