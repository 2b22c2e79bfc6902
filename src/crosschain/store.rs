use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::unix_now_s;

use super::types::{
    InboundRequest, IntentCreateRequest, IntentEvent, IntentRecord, LifecycleState,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("intent not found")]
    NotFound,
    #[error("intent cannot be cancelled")]
    CannotCancel,
    #[error("intent cannot be refunded")]
    CannotRefund,
}

#[derive(Default)]
struct StoreInner {
    intents: HashMap<String, IntentRecord>,
    client_request_index: HashMap<String, String>,
    applied_message_ids: HashSet<String>,
}

/// Lifecycle store for cross-chain intents. A single mutex spans the
/// intent index, the client-request-id index and the applied-message-id
/// set, so every operation is serializable.
#[derive(Default)]
pub struct IntentStore {
    inner: Mutex<StoreInner>,
}

fn push_event(
    intent: &mut IntentRecord,
    state: LifecycleState,
    detail: Option<String>,
    message_id: Option<String>,
) {
    intent.events.push(IntentEvent {
        timestamp_unix_s: unix_now_s(),
        state,
        detail,
        message_id,
    });
}

/// Lazy expiry: a pending intent past its deadline fails with a
/// "timeout" event. Applied on every read and mutation.
fn apply_timeout_if_needed(intent: &mut IntentRecord) {
    if intent.state != LifecycleState::Pending {
        return;
    }
    let Some(expires) = intent.expires_unix_s else { return };
    if unix_now_s() < expires {
        return;
    }
    intent.state = LifecycleState::Failed;
    push_event(intent, LifecycleState::Failed, Some("timeout".into()), None);
}

impl IntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new intent in state created, or return the existing one when
    /// the client_request_id was seen before.
    pub async fn create_intent(&self, req: IntentCreateRequest) -> IntentRecord {
        let mut inner = self.inner.lock().await;

        if let Some(ref crid) = req.client_request_id {
            if let Some(existing_id) = inner.client_request_index.get(crid).cloned() {
                if let Some(existing) = inner.intents.get_mut(&existing_id) {
                    apply_timeout_if_needed(existing);
                    return existing.clone();
                }
            }
        }

        let now = unix_now_s();
        let intent_id = Uuid::new_v4().simple().to_string();
        let expires = req.timeout_seconds.map(|t| now + t.max(1) as f64);

        let intent = IntentRecord {
            intent_id: intent_id.clone(),
            client_request_id: req.client_request_id.clone(),
            session_id: req.session_id,
            goal: req.goal,
            target: req.target,
            asset: req.asset,
            state: LifecycleState::Created,
            dispatch_id: None,
            created_unix_s: now,
            expires_unix_s: expires,
            events: vec![IntentEvent {
                timestamp_unix_s: now,
                state: LifecycleState::Created,
                detail: None,
                message_id: None,
            }],
        };
        inner.intents.insert(intent_id.clone(), intent.clone());
        if let Some(crid) = req.client_request_id {
            inner.client_request_index.insert(crid, intent_id);
        }
        intent
    }

    pub async fn set_dispatched(
        &self,
        intent_id: &str,
        dispatch_id: String,
    ) -> Result<IntentRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let intent = inner.intents.get_mut(intent_id).ok_or(StoreError::NotFound)?;
        apply_timeout_if_needed(intent);
        if intent.state == LifecycleState::Created {
            intent.state = LifecycleState::Pending;
            intent.dispatch_id = Some(dispatch_id);
            push_event(intent, LifecycleState::Pending, None, None);
        }
        Ok(intent.clone())
    }

    pub async fn get_intent(&self, intent_id: &str) -> Option<IntentRecord> {
        let mut inner = self.inner.lock().await;
        let intent = inner.intents.get_mut(intent_id)?;
        apply_timeout_if_needed(intent);
        Some(intent.clone())
    }

    pub async fn cancel_intent(&self, intent_id: &str) -> Result<IntentRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let intent = inner.intents.get_mut(intent_id).ok_or(StoreError::NotFound)?;
        apply_timeout_if_needed(intent);
        if !matches!(intent.state, LifecycleState::Created | LifecycleState::Pending) {
            return Err(StoreError::CannotCancel);
        }
        intent.state = LifecycleState::Cancelled;
        push_event(intent, LifecycleState::Cancelled, None, None);
        Ok(intent.clone())
    }

    pub async fn refund_intent(&self, intent_id: &str) -> Result<IntentRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let intent = inner.intents.get_mut(intent_id).ok_or(StoreError::NotFound)?;
        apply_timeout_if_needed(intent);
        if intent.state != LifecycleState::Failed {
            return Err(StoreError::CannotRefund);
        }
        intent.state = LifecycleState::Refunded;
        push_event(intent, LifecycleState::Refunded, None, None);
        Ok(intent.clone())
    }

    /// Record a verified inbound message. Each (connector, message_id) is
    /// applied at most once; replays return `applied = false` untouched.
    /// Terminal states are never transitioned away from.
    pub async fn apply_inbound(
        &self,
        inbound: &InboundRequest,
    ) -> Result<(IntentRecord, bool), StoreError> {
        let mut inner = self.inner.lock().await;

        let dedupe_key = format!("{}:{}", inbound.connector.as_str(), inbound.message_id);
        if inner.applied_message_ids.contains(&dedupe_key) {
            let existing =
                inner.intents.get_mut(&inbound.intent_id).ok_or(StoreError::NotFound)?;
            apply_timeout_if_needed(existing);
            return Ok((existing.clone(), false));
        }

        let intent = inner.intents.get_mut(&inbound.intent_id).ok_or(StoreError::NotFound)?;
        apply_timeout_if_needed(intent);

        let status = inbound.status.trim().to_lowercase();
        let detail = inbound.detail.clone().unwrap_or_else(|| status.clone());
        let state_at_event = intent.state;
        push_event(intent, state_at_event, Some(detail.clone()), Some(inbound.message_id.clone()));

        if !intent.state.is_terminal() {
            match status.as_str() {
                // Outbound leg landed; the intent stays pending until the
                // return leg settles.
                "execution_completed" => {}
                "return_completed" | "settled" => {
                    intent.state = LifecycleState::Settled;
                    push_event(
                        intent,
                        LifecycleState::Settled,
                        Some(detail),
                        Some(inbound.message_id.clone()),
                    );
                }
                "failed" => {
                    intent.state = LifecycleState::Failed;
                    push_event(
                        intent,
                        LifecycleState::Failed,
                        Some(detail),
                        Some(inbound.message_id.clone()),
                    );
                }
                _ => {}
            }
        }

        let record = intent.clone();
        inner.applied_message_ids.insert(dedupe_key);
        Ok((record, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosschain::types::{AssetKind, ConnectorKind, GoalKind, IntentAsset, IntentTarget};

    fn create_req(crid: Option<&str>, timeout: Option<u64>) -> IntentCreateRequest {
        IntentCreateRequest {
            client_request_id: crid.map(str::to_string),
            session_id: Some("s".into()),
            goal: GoalKind::Deposit,
            target: IntentTarget {
                connector: ConnectorKind::Xcm,
                destination: "para-2000".into(),
            },
            asset: IntentAsset { kind: AssetKind::Native, amount: "1".into(), token_address: None },
            timeout_seconds: timeout,
        }
    }

    fn inbound(intent_id: &str, message_id: &str, status: &str) -> InboundRequest {
        InboundRequest {
            connector: ConnectorKind::Xcm,
            intent_id: intent_id.into(),
            message_id: message_id.into(),
            status: status.into(),
            verified: true,
            detail: None,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_client_request_id() {
        let store = IntentStore::new();
        let a = store.create_intent(create_req(Some("req-1"), None)).await;
        let b = store.create_intent(create_req(Some("req-1"), None)).await;
        assert_eq!(a.intent_id, b.intent_id);

        let c = store.create_intent(create_req(Some("req-2"), None)).await;
        assert_ne!(a.intent_id, c.intent_id);
    }

    #[tokio::test]
    async fn dispatch_moves_created_to_pending() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, None)).await;
        assert_eq!(intent.state, LifecycleState::Created);

        let intent = store.set_dispatched(&intent.intent_id, "d1".into()).await.unwrap();
        assert_eq!(intent.state, LifecycleState::Pending);
        assert_eq!(intent.dispatch_id.as_deref(), Some("d1"));
        assert_eq!(intent.events.len(), 2);
    }

    #[tokio::test]
    async fn inbound_replay_is_deduped() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, None)).await;
        let store_id = intent.intent_id.clone();
        store.set_dispatched(&store_id, "d1".into()).await.unwrap();

        let (first, applied) = store.apply_inbound(&inbound(&store_id, "m1", "settled")).await.unwrap();
        assert!(applied);
        assert_eq!(first.state, LifecycleState::Settled);

        let (second, applied) =
            store.apply_inbound(&inbound(&store_id, "m1", "failed")).await.unwrap();
        assert!(!applied);
        assert_eq!(second.state, LifecycleState::Settled);
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, None)).await;
        let id = intent.intent_id.clone();
        store.cancel_intent(&id).await.unwrap();

        let (after, applied) = store.apply_inbound(&inbound(&id, "m-fail", "failed")).await.unwrap();
        assert!(applied);
        assert_eq!(after.state, LifecycleState::Cancelled);
    }

    #[tokio::test]
    async fn execution_completed_records_without_transition() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, None)).await;
        let id = intent.intent_id.clone();
        store.set_dispatched(&id, "d1".into()).await.unwrap();

        let (after, applied) =
            store.apply_inbound(&inbound(&id, "m1", "execution_completed")).await.unwrap();
        assert!(applied);
        assert_eq!(after.state, LifecycleState::Pending);
        assert!(after.events.iter().any(|e| e.message_id.as_deref() == Some("m1")));
    }

    #[tokio::test]
    async fn pending_intent_times_out_lazily() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, Some(1))).await;
        let id = intent.intent_id.clone();
        store.set_dispatched(&id, "d1".into()).await.unwrap();

        let current = store.get_intent(&id).await.unwrap();
        assert_eq!(current.state, LifecycleState::Pending);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let expired = store.get_intent(&id).await.unwrap();
        assert_eq!(expired.state, LifecycleState::Failed);
        assert!(expired.events.iter().any(|e| e.detail.as_deref() == Some("timeout")));
    }

    #[tokio::test]
    async fn cancel_and_refund_legality() {
        let store = IntentStore::new();
        let intent = store.create_intent(create_req(None, None)).await;
        let id = intent.intent_id.clone();

        // refund is only legal from failed
        assert_eq!(store.refund_intent(&id).await.unwrap_err(), StoreError::CannotRefund);

        store.set_dispatched(&id, "d1".into()).await.unwrap();
        store.apply_inbound(&inbound(&id, "m1", "failed")).await.unwrap();
        let refunded = store.refund_intent(&id).await.unwrap();
        assert_eq!(refunded.state, LifecycleState::Refunded);

        // cancelling a refunded intent is illegal
        assert_eq!(store.cancel_intent(&id).await.unwrap_err(), StoreError::CannotCancel);
        assert!(store.get_intent("missing").await.is_none());
    }
}
