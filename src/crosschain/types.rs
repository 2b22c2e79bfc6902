use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    Xcm,
    HyperbridgeIsmp,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Xcm => "xcm",
            ConnectorKind::HyperbridgeIsmp => "hyperbridge_ismp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Deposit,
    Withdraw,
    PathCRoundtrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Native,
    Erc20,
}

/// created → pending → {settled | failed}; pending|created → cancelled;
/// failed → refunded. No other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Pending,
    Settled,
    Failed,
    Cancelled,
    Refunded,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Settled | LifecycleState::Cancelled | LifecycleState::Refunded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentTarget {
    pub connector: ConnectorKind,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAsset {
    pub kind: AssetKind,
    pub amount: String,
    #[serde(default)]
    pub token_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentCreateRequest {
    #[serde(default)]
    pub client_request_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub goal: GoalKind,
    pub target: IntentTarget,
    pub asset: IntentAsset,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEvent {
    pub timestamp_unix_s: f64,
    pub state: LifecycleState,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent_id: String,
    pub client_request_id: Option<String>,
    pub session_id: Option<String>,
    pub goal: GoalKind,
    pub target: IntentTarget,
    pub asset: IntentAsset,
    pub state: LifecycleState,
    pub dispatch_id: Option<String>,
    pub created_unix_s: f64,
    pub expires_unix_s: Option<f64>,
    pub events: Vec<IntentEvent>,
}

/// Authenticated settlement message arriving from a bridge relay.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundRequest {
    pub connector: ConnectorKind,
    pub intent_id: String,
    pub message_id: String,
    pub status: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub detail: Option<String>,
}
