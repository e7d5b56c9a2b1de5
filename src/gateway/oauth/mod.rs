//! Usage: Delegated OAuth for YouTube: provider seam, consent, code exchange and refresh guard.

pub(crate) mod consent;
pub(crate) mod google;
pub mod provider_trait;
pub(crate) mod refresh;
pub mod return_page;
pub(crate) mod single_flight;
pub(crate) mod token_exchange;
