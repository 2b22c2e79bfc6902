use serde::Serialize;
use serde_json::Value;

use crate::config::EvmConfig;

// ── Deterministic buy recipe ─────────────────────────────────────────

const ORIGIN_CHAIN: &str = "asset_hub_paseo";
const ORIGIN_PARACHAIN_ID: u32 = 1000;
const ORIGIN_SUBSTRATE_WS: &str = "wss://sys.ibp.network/asset-hub-paseo";
const DESTINATION_CHAIN: &str = "passet_hub";
const DESTINATION_PARACHAIN_ID: u32 = 1111;
const DESTINATION_EVM_RPC: &str = "https://testnet-passet-hub-eth-rpc.polkadot.io";

pub const BUY_SLIPPAGE_BPS: u32 = 100;
pub const BUY_DEADLINE_SECONDS: u32 = 600;

#[derive(Debug, Clone, Serialize)]
pub struct TokenOut {
    pub symbol: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginLeg {
    pub chain: &'static str,
    pub parachain_id: u32,
    pub substrate_ws: &'static str,
    pub asset: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationLeg {
    pub chain: &'static str,
    pub parachain_id: u32,
    pub evm_rpc: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskControls {
    pub slippage_bps: u32,
    pub deadline_seconds: u32,
}

/// Every step is signed locally by the user; the backend never holds keys.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanStep {
    XcmTransfer {
        id: &'static str,
        requires_local_signature: bool,
        from_parachain_id: u32,
        to_parachain_id: u32,
        asset: &'static str,
        amount: String,
    },
    UniswapV2Swap {
        id: &'static str,
        requires_local_signature: bool,
        evm_rpc: &'static str,
        router: Option<String>,
        weth: Option<String>,
        token_out: TokenOut,
    },
}

/// Declarative multi-step recipe for the "buy N PAS worth of TOKEN"
/// fast path: bridge PAS over XCM, then swap on the destination AMM.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    #[serde(rename = "type")]
    pub plan_type: &'static str,
    pub version: u32,
    pub amount_in_pas: String,
    pub token_out: TokenOut,
    pub origin: OriginLeg,
    pub destination: DestinationLeg,
    pub risk_controls: RiskControls,
    pub requires_user_confirmation: bool,
    pub steps: Vec<PlanStep>,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

pub fn build_buy_execution_plan(
    evm: &EvmConfig,
    amount_in_pas: &str,
    token_out_symbol: &str,
) -> ExecutionPlan {
    let token_out = TokenOut {
        symbol: token_out_symbol.to_string(),
        address: non_empty(&evm.token_demo),
    };

    ExecutionPlan {
        plan_type: "buy_token",
        version: 1,
        amount_in_pas: amount_in_pas.to_string(),
        token_out: token_out.clone(),
        origin: OriginLeg {
            chain: ORIGIN_CHAIN,
            parachain_id: ORIGIN_PARACHAIN_ID,
            substrate_ws: ORIGIN_SUBSTRATE_WS,
            asset: "PAS",
        },
        destination: DestinationLeg {
            chain: DESTINATION_CHAIN,
            parachain_id: DESTINATION_PARACHAIN_ID,
            evm_rpc: DESTINATION_EVM_RPC,
        },
        risk_controls: RiskControls {
            slippage_bps: BUY_SLIPPAGE_BPS,
            deadline_seconds: BUY_DEADLINE_SECONDS,
        },
        requires_user_confirmation: true,
        steps: vec![
            PlanStep::XcmTransfer {
                id: "xcm_bridge_pas",
                requires_local_signature: true,
                from_parachain_id: ORIGIN_PARACHAIN_ID,
                to_parachain_id: DESTINATION_PARACHAIN_ID,
                asset: "PAS",
                amount: amount_in_pas.to_string(),
            },
            PlanStep::UniswapV2Swap {
                id: "swap_pas_to_token",
                requires_local_signature: true,
                evm_rpc: DESTINATION_EVM_RPC,
                router: non_empty(&evm.router),
                weth: non_empty(&evm.weth),
                token_out,
            },
        ],
    }
}

impl ExecutionPlan {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
