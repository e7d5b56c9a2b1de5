//! Usage: Client-side view of whether YouTube is linked (Unknown / Disconnected / Connected).

use crate::client::api::{ChannelSummary, Identity, ServiceApi, TimelineEntry};
use crate::client::consent_broker::ConnectedCallback;
use crate::shared::error::{AppResult, CODE_AUTH_EXPIRED};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unknown,
    Disconnected,
    Connected,
}

#[derive(Clone)]
pub struct ConnectionStateMachine {
    api: Arc<dyn ServiceApi>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionStateMachine {
    pub fn new(api: Arc<dyn ServiceApi>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Unknown);
        Self {
            api,
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn set(&self, next: ConnectionStatus) {
        let prev = self.status.send_replace(next);
        if prev != next {
            tracing::debug!(from = ?prev, to = ?next, "youtube connection status changed");
        }
    }

    /// Initial load. An identity failure leaves the machine `Disconnected` and is returned
    /// so the host can route to login.
    pub async fn reconcile(&self) -> AppResult<Identity> {
        match self.api.identity().await {
            Ok(identity) => {
                self.set(if identity.youtube_connected {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Disconnected
                });
                Ok(identity)
            }
            Err(err) => {
                self.set(ConnectionStatus::Disconnected);
                Err(err)
            }
        }
    }

    pub fn mark_connected(&self) {
        self.set(ConnectionStatus::Connected);
    }

    pub fn on_auth_expired(&self) {
        self.set(ConnectionStatus::Disconnected);
    }

    /// Hook for [`crate::client::consent_broker::ConsentBroker::with_on_connected`].
    pub fn connected_callback(&self) -> ConnectedCallback {
        let machine = self.clone();
        Arc::new(move || machine.mark_connected())
    }

    fn observe<T>(&self, result: AppResult<T>) -> AppResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                if err.code() == CODE_AUTH_EXPIRED {
                    tracing::info!("youtube session expired; reconnect required");
                    self.on_auth_expired();
                }
                Err(err)
            }
        }
    }

    /// `Ok(None)` without any request unless `Connected`.
    pub async fn fetch_channel_stats(&self) -> AppResult<Option<ChannelSummary>> {
        if self.status() != ConnectionStatus::Connected {
            return Ok(None);
        }
        let result = self.api.channel_stats().await;
        self.observe(result)
    }

    pub async fn fetch_timeline(&self, range_days: u32) -> AppResult<Option<Vec<TimelineEntry>>> {
        if self.status() != ConnectionStatus::Connected {
            return Ok(None);
        }
        let result = self.api.timeline(range_days).await;
        self.observe(result)
    }
}
