use async_trait::async_trait;
use uuid::Uuid;

use super::types::{ConnectorKind, InboundRequest, IntentRecord};

/// A bridging backend. Dispatch hands the intent to the bridge and
/// returns its message handle; verify_inbound authenticates a settlement
/// message before it may touch the store.
#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    async fn dispatch(&self, intent: &IntentRecord) -> String;

    async fn verify_inbound(&self, inbound: &InboundRequest) -> bool;
}

/// Stub connector used for both XCM and Hyperbridge/ISMP until the real
/// relays are wired in. Dispatch mints an opaque id; verification echoes
/// the relay's own flag.
pub struct StubConnector {
    kind: ConnectorKind,
}

impl StubConnector {
    pub fn new(kind: ConnectorKind) -> Self {
        StubConnector { kind }
    }
}

#[async_trait]
impl Connector for StubConnector {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn dispatch(&self, _intent: &IntentRecord) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn verify_inbound(&self, inbound: &InboundRequest) -> bool {
        inbound.verified
    }
}
