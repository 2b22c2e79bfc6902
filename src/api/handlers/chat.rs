use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::execution::{BUY_DEADLINE_SECONDS, BUY_SLIPPAGE_BPS, build_buy_execution_plan};
use crate::intent::{IntentHint, extract_buy_intent, extract_symbol, infer_intent_hint};
use crate::llm::model::DeltaSink;
use crate::llm::{Msg, Role, plan_simple, plan_with_tools};
use crate::plan::{
    Action, ensure_strategy_params, execution_preview, routing_stub, strategy_label,
};
use crate::tools::Tool;
use crate::tools::preview::PreviewExecutionTool;

use super::super::error::ApiError;
use super::super::state::AppState;
use super::super::types::{ChatRequest, ChatResponse};

/// Shared request validation for both chat endpoints.
pub fn validate_chat_request(
    state: &AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(String, String), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    if state.model.is_none() {
        return Err(ApiError::NotReady("Service not initialized".into()));
    }

    let user_input = request.user_input;
    if user_input.trim().is_empty() {
        return Err(ApiError::InvalidInput("user_input is required".into()));
    }
    if user_input.chars().count() > state.config.max_input_chars {
        return Err(ApiError::InputTooLarge("user_input too large".into()));
    }

    let session_id =
        request.session_id.filter(|s| !s.is_empty()).unwrap_or_else(mint_session_id);
    Ok((session_id, user_input))
}

fn mint_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// What one chat turn produced, independent of transport.
pub struct ChatOutcome {
    pub assistant_text: String,
    pub actions: Vec<Action>,
    pub execution_preview: Option<Value>,
    pub execution_plan: Option<Value>,
}

/// The full chat pipeline under the per-session lock: buy fast-path,
/// planner, normalization, preview synthesis, memory persistence.
pub async fn run_chat(
    state: AppState,
    session_id: String,
    user_input: String,
    on_delta: Option<DeltaSink>,
) -> Result<ChatOutcome, ApiError> {
    let model = state
        .model
        .clone()
        .ok_or_else(|| ApiError::NotReady("Service not initialized".into()))?;

    let lock = state.sessions.session_lock(&session_id).await;
    let _guard = lock.lock().await;

    if let Some(buy) = extract_buy_intent(&user_input) {
        let execution_plan =
            build_buy_execution_plan(&state.config.evm, &buy.amount_in_pas, &buy.token_out_symbol);
        let assistant_text = format!(
            "我已为你生成购买计划：用 {} PAS 购买 {}。\n\n下一步：请在 App 内确认并分别签名执行跨链（XCM）与 swap 交易。",
            buy.amount_in_pas, buy.token_out_symbol,
        );
        let preview = json!({
            "mode": "preview",
            "intent": "buy_token",
            "params": {
                "amount_in_pas": buy.amount_in_pas,
                "token_out": buy.token_out_symbol,
                "slippage_bps": BUY_SLIPPAGE_BPS,
                "deadline_seconds": BUY_DEADLINE_SECONDS,
            },
            "requires_confirmation": true,
        });

        let mut memory = state.sessions.load_memory(&session_id).await;
        memory.push(Msg::text(Role::User, user_input));
        memory.push(Msg::text(Role::Assistant, assistant_text.clone()));
        state.sessions.save_memory(&session_id, memory).await;

        return Ok(ChatOutcome {
            assistant_text,
            actions: Vec::new(),
            execution_preview: Some(preview),
            execution_plan: Some(execution_plan.to_value()),
        });
    }

    let memory = state.sessions.load_memory(&session_id).await;
    let config = &state.config;

    let (mut plan, requested_symbol) = if config.use_simple_strategy {
        let intent_hint = infer_intent_hint(&user_input);
        let symbol = extract_symbol(&user_input, &config.cex.default_quote, &config.default_symbol);

        let snapshot = if intent_hint == IntentHint::Strategy {
            tracing::info!(symbol = %symbol, "prefetching market snapshot");
            let outcome = state
                .market
                .snapshot(&symbol, &config.cex.kline_interval, config.cex.kline_limit.min(200))
                .await;
            tracing::info!(ok = outcome.is_ready(), "snapshot fetched");
            outcome.ready().cloned()
        } else {
            None
        };

        let plan = plan_simple(
            model.as_ref(),
            config,
            &memory,
            &user_input,
            snapshot.as_ref(),
            intent_hint,
            Some(symbol.as_str()),
            on_delta,
        )
        .await?;
        (plan, Some(symbol))
    } else {
        let plan =
            plan_with_tools(model.as_ref(), &state.tools, config, &memory, &user_input, on_delta)
                .await?;
        (plan, None)
    };

    let snapshot_for_params = plan.market_snapshot().cloned();
    ensure_strategy_params(&mut plan, requested_symbol.as_deref(), snapshot_for_params.as_ref());

    let (assistant_text, actions, mut preview) = execution_preview(&plan);

    // A non-chat plan that somehow produced no preview still gets a generic one.
    if plan.intent != "chat" && preview.is_none() {
        let amount_in = plan
            .params
            .get("amount_in")
            .or_else(|| plan.params.get("amount"))
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();
        let mut args = Map::new();
        args.insert("action_type".into(), json!(plan.intent));
        args.insert("amount_in".into(), json!(amount_in));
        if let Some(token_in) = plan.params.get("token_in") {
            args.insert("token_in".into(), token_in.clone());
        }
        if let Some(token_out) = plan.params.get("token_out") {
            args.insert("token_out".into(), token_out.clone());
        }
        let output = PreviewExecutionTool.invoke(args).await;
        preview = Some(
            crate::llm::json_extract::extract_json_object(&output)
                .map(Value::Object)
                .unwrap_or_else(|| json!({"mode": "preview", "requires_confirmation": true})),
        );
    }

    if let Some(Value::Object(p)) = preview.as_mut() {
        if !p.contains_key("routing") {
            p.insert("routing".into(), routing_stub(plan.market_snapshot()));
        }
    }

    let mut memory = memory;
    memory.push(Msg::text(Role::User, user_input));
    memory.push(Msg::text(Role::Assistant, assistant_text.clone()));
    state.sessions.save_memory(&session_id, memory).await;

    Ok(ChatOutcome {
        assistant_text,
        actions,
        execution_preview: preview,
        execution_plan: None,
    })
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (session_id, user_input) = validate_chat_request(&state, payload)?;
    let outcome = run_chat(state, session_id.clone(), user_input, None).await?;

    // The buy fast path carries its own deterministic plan and no strategy.
    let (strategy_type, label) = if outcome.execution_plan.is_some() {
        (None, None)
    } else {
        let strategy_type = outcome.actions.first().map(|a| a.action_type.clone());
        let label = Some(strategy_label(strategy_type.as_deref()));
        (strategy_type, label)
    };

    Ok(Json(ChatResponse {
        session_id,
        assistant_text: outcome.assistant_text,
        actions: outcome.actions,
        execution_preview: outcome.execution_preview,
        execution_plan: outcome.execution_plan,
        strategy_type,
        strategy_label: label,
    }))
}
