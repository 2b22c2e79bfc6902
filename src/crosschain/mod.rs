pub mod connector;
pub mod store;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use connector::{Connector, StubConnector};
use store::{IntentStore, StoreError};
use types::{
    ConnectorKind, InboundRequest, IntentCreateRequest, IntentRecord, LifecycleState,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unsupported connector")]
    UnsupportedConnector,
    #[error("inbound message not verified")]
    UnverifiedInbound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cross-chain intent lifecycle: dedup, connector dispatch and
/// authenticated inbound settlement.
pub struct CrossChainService {
    pub store: IntentStore,
    connectors: HashMap<ConnectorKind, Arc<dyn Connector>>,
}

impl Default for CrossChainService {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossChainService {
    pub fn new() -> Self {
        let mut connectors: HashMap<ConnectorKind, Arc<dyn Connector>> = HashMap::new();
        connectors.insert(ConnectorKind::Xcm, Arc::new(StubConnector::new(ConnectorKind::Xcm)));
        connectors.insert(
            ConnectorKind::HyperbridgeIsmp,
            Arc::new(StubConnector::new(ConnectorKind::HyperbridgeIsmp)),
        );
        CrossChainService { store: IntentStore::new(), connectors }
    }

    fn connector(&self, kind: ConnectorKind) -> Result<&Arc<dyn Connector>, ServiceError> {
        self.connectors.get(&kind).ok_or(ServiceError::UnsupportedConnector)
    }

    /// Allocate (or re-use) the intent, hand it to the connector and move
    /// it to pending. Idempotent per client_request_id: replays return the
    /// already-dispatched record.
    pub async fn create_and_dispatch(
        &self,
        req: IntentCreateRequest,
    ) -> Result<IntentRecord, ServiceError> {
        let connector = self.connector(req.target.connector)?.clone();
        let mut intent = self.store.create_intent(req).await;
        if intent.state == LifecycleState::Created {
            let dispatch_id = connector.dispatch(&intent).await;
            tracing::info!(intent_id = %intent.intent_id, dispatch_id = %dispatch_id, "intent dispatched");
            intent = self.store.set_dispatched(&intent.intent_id, dispatch_id).await?;
        }
        Ok(intent)
    }

    pub async fn apply_verified_inbound(
        &self,
        inbound: &InboundRequest,
    ) -> Result<(IntentRecord, bool), ServiceError> {
        let connector = self.connector(inbound.connector)?.clone();
        if !connector.verify_inbound(inbound).await {
            return Err(ServiceError::UnverifiedInbound);
        }
        Ok(self.store.apply_inbound(inbound).await?)
    }
}
