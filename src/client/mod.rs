//! Usage: Client library for hosts embedding the consent flow (service API, popup broker, connection state).

pub mod api;
pub mod connection;
pub mod consent_broker;
pub mod popup;

pub use api::{HttpServiceApi, ServiceApi};
pub use connection::{ConnectionStateMachine, ConnectionStatus};
pub use consent_broker::{BrokerConfig, ConsentBroker, ConsentOutcome, ConsentState};
