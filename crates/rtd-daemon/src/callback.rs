//! Bridges a [`ClientCallback`] to a live `subscribeClientEvents` stream.
//!
//! One instance is created per successful subscription and handed to
//! [`Dispatcher::attach_callback`](rtd_dispatch::Dispatcher::attach_callback);
//! its lifetime IS the wire protocol's notion of "the client has a live
//! callback" (spec §4.4).

use async_trait::async_trait;
use jsonrpsee::{SubscriptionMessage, SubscriptionSink};
use rtd_core::{ClientId, TaskId};
use rtd_registry::{ClientCallback, RegistrationInfo, RegistryError, RegistryResult};
use tracing::warn;

use crate::rpc::ClientEvent;

/// Forwards dispatcher notifications onto a jsonrpsee subscription sink.
pub struct SubscriptionCallback {
    sink: SubscriptionSink,
}

impl SubscriptionCallback {
    /// Wrap an accepted subscription sink.
    #[must_use]
    pub fn new(sink: SubscriptionSink) -> Self {
        Self { sink }
    }

    async fn send(&self, event: ClientEvent) -> RegistryResult<()> {
        let msg = SubscriptionMessage::from_json(&event).map_err(|e| RegistryError::TransportError(e.to_string()))?;
        self.sink.send(msg).await.map_err(|e| RegistryError::TransportError(e.to_string()))
    }
}

#[async_trait]
impl ClientCallback for SubscriptionCallback {
    async fn on_client_registration_updated(&self, info: RegistrationInfo) {
        if self
            .send(ClientEvent::RegistrationUpdated { info: info.into() })
            .await
            .is_err()
        {
            warn!("failed to deliver registration update; subscriber likely disconnected");
        }
    }

    async fn on_serverless_client_registered(&self, client_id: ClientId) {
        if self
            .send(ClientEvent::ServerlessClientRegistered {
                client_id: client_id.to_string(),
            })
            .await
            .is_err()
        {
            warn!("failed to deliver serverless registration notice; subscriber likely disconnected");
        }
    }

    async fn on_remote_task_requested(
        &self,
        client_id: ClientId,
        task_id: TaskId,
        data: Vec<u8>,
        max_duration_s: u64,
    ) -> RegistryResult<()> {
        self.send(ClientEvent::RemoteTaskRequested {
            client_id: client_id.to_string(),
            task_id: task_id.to_string(),
            data,
            max_duration_s,
        })
        .await
    }

    async fn on_shutdown_starting(&self) {
        if self.send(ClientEvent::ShutdownStarting).await.is_err() {
            warn!("failed to deliver shutdown-starting notice; subscriber likely disconnected");
        }
    }
}
