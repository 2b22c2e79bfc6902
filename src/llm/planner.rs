use std::time::Duration;

use crate::config::AppConfig;
use crate::intent::IntentHint;
use crate::market::MarketSnapshot;
use crate::plan::Plan;
use crate::tools::ToolRegistry;

use super::json_extract::extract_json_object;
use super::message::{Msg, Role};
use super::model::{ChatModel, DeltaSink, ModelError, ModelRequest, ModelResponse};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("tool_call_limit_exceeded")]
    ToolCallLimitExceeded,
}

async fn call_with_budget(
    model: &dyn ChatModel,
    req: ModelRequest<'_>,
    timeout_s: f64,
) -> Result<ModelResponse, ModelError> {
    if timeout_s > 0.0 {
        tokio::time::timeout(Duration::from_secs_f64(timeout_s), model.chat(req))
            .await
            .map_err(|_| ModelError::Timeout)?
    } else {
        model.chat(req).await
    }
}

/// Streamed calls run under the (usually larger) stream budget.
fn effective_timeout_s(config: &AppConfig, streaming: bool) -> f64 {
    if streaming { config.llm.stream_timeout_s } else { config.llm.timeout_s }
}

fn fmt_f64(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn market_context(snapshot: &MarketSnapshot) -> String {
    let p = &snapshot.price;
    let v = &snapshot.volume;
    let i = &snapshot.indicators;
    format!(
        "\n当前市场数据 ({}, {}):\n\
         - 价格: ${} (24h变化: {:.2}%)\n\
         - 24h高/低: ${} / ${}\n\
         - 成交量比率: {:.2}x (当前/24h均值)\n\
         - RSI(14): {}\n\
         - MACD: {} (信号线: {}, 柱状图: {})\n\
         - EMA(12/26): {} / {}\n\
         - 布林带: 上轨 ${} / 中轨 ${} / 下轨 ${}\n",
        snapshot.symbol,
        snapshot.timestamp,
        p.current,
        p.change_24h_pct,
        p.high_24h,
        p.low_24h,
        v.ratio,
        fmt_f64(i.rsi_14),
        fmt_f64(i.macd),
        fmt_f64(i.macd_signal),
        fmt_f64(i.macd_histogram),
        fmt_f64(i.ema_12),
        fmt_f64(i.ema_26),
        fmt_f64(i.bollinger_upper),
        fmt_f64(i.bollinger_middle),
        fmt_f64(i.bollinger_lower),
    )
}

fn simple_strategy_prompt(market_context: &str) -> String {
    format!(
        "You are StrategyAgent for a crypto trading assistant.\n\
         {market_context}\n\
         Based on the above market data, provide trading strategy recommendations.\n\
         When the user asks for a trading strategy for a pair, you MUST choose exactly one strategy from this DEMO set:\n\
         - start_dca (智能DCA)\n\
         - start_grid (网格)\n\
         - start_mean_reversion (均值回归)\n\
         - start_martingale (马丁格尔)\n\
         - none (暂时观望)\n\
         If you are unsure or market data is insufficient, choose none.\n\
         Always output a single JSON object with fields:\n\
         - assistant_text (string): Your response to the user in Chinese\n\
         - intent (string): \"strategy_recommendation\" or \"chat\"\n\
         - params (object): Strategy parameters including the market data summary. It MUST include:\n\
         \x20 - symbol (string, e.g. \"ETHUSDT\")\n\
         \x20 - entry_price_range (array of 2 numbers, e.g. [2400, 2520])\n\
         \x20 - take_profit_percent (number)\n\
         \x20 - stop_loss_percent (number)\n\
         \x20 - grid_levels (number, only for start_grid)\n\
         - rationale (string): Reasoning for your recommendation\n\
         - risk_notes (array of strings): Risk warnings\n\
         - actions (array of {{type, params}}): MUST contain 0 or 1 item. If intent is strategy_recommendation, include exactly 1 item. The first action params MUST also include symbol and the above key fields when applicable.\n\
         IMPORTANT: Start by outputting assistant_text as early as possible.\n\
         If the user is not requesting a trading action, set intent='chat' and actions=[].\n\
         Return JSON only."
    )
}

fn simple_chat_prompt(requested_symbol: Option<&str>) -> String {
    let sym = requested_symbol.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("N/A");
    format!(
        "You are a crypto assistant.\n\
         The user may ask either for a trading strategy or a general question.\n\
         If the user is asking for a strategy, you MUST choose exactly one strategy from this DEMO set:\n\
         - start_dca (智能DCA)\n\
         - start_grid (网格)\n\
         - start_mean_reversion (均值回归)\n\
         - start_martingale (马丁格尔)\n\
         - none (暂时观望)\n\
         If you are unsure or market data is insufficient, choose none.\n\
         The requested symbol (if any) is: {sym}\n\
         Always output a single JSON object with fields:\n\
         - assistant_text (string): Your response to the user in Chinese\n\
         - intent (string): \"strategy_recommendation\" or \"chat\"\n\
         - params (object)\n\
         - rationale (string)\n\
         - risk_notes (array of strings)\n\
         - actions (array of {{type, params}})\n\
         IMPORTANT: Start by outputting assistant_text as early as possible.\n\
         Return JSON only."
    )
}

const TOOL_PROMPT: &str = "You are StrategyAgent for a crypto trading assistant. \
You MAY use tools to query on-chain AMM quotes and CEX klines, and produce an execution preview. \
If you call the AMM quote tool, you MUST include its parsed JSON output in params.market_snapshot. \
If you call the CEX kline tool, you MUST include its parsed JSON output in params.kline_snapshot. \
If you call the kline feature tool, you MUST include its parsed JSON output in params.kline_features. \
When recommending an automated strategy, you MUST produce actions with type one of: start_dca, start_grid, start_mean_reversion. \
Always output a single JSON object with fields in this order: \
assistant_text (string), intent (string), params (object), rationale (string), \
risk_notes (array of strings), actions (array of {type, params}). \
IMPORTANT: When streaming, start by outputting assistant_text as early as possible, then fill the remaining fields. \
If the user is not requesting a trading action, set intent='chat' and actions=[]. \
Return JSON only.";

fn parse_plan(response: &ModelResponse, rationale_fallback: bool) -> Result<Plan, PlannerError> {
    let text = response.text();
    match extract_json_object(&text) {
        Some(obj) => Ok(Plan::from_map(obj)),
        None => {
            if text.trim().is_empty() {
                return Err(ModelError::EmptyResponse.into());
            }
            let rationale = if rationale_fallback { text.as_str() } else { "" };
            Ok(Plan::chat_fallback(&text, rationale))
        }
    }
}

/// One-shot planner working from a pre-fetched market snapshot.
#[allow(clippy::too_many_arguments)]
pub async fn plan_simple(
    model: &dyn ChatModel,
    config: &AppConfig,
    memory: &[Msg],
    user_input: &str,
    snapshot: Option<&MarketSnapshot>,
    intent_hint: IntentHint,
    requested_symbol: Option<&str>,
    on_delta: Option<DeltaSink>,
) -> Result<Plan, PlannerError> {
    let sys_prompt = match intent_hint {
        IntentHint::Strategy => {
            let ctx = snapshot.map(market_context).unwrap_or_default();
            simple_strategy_prompt(&ctx)
        }
        IntentHint::Chat => simple_chat_prompt(requested_symbol),
    };

    let mut msgs = Vec::with_capacity(memory.len() + 2);
    msgs.push(Msg::text(Role::System, sys_prompt));
    msgs.extend_from_slice(memory);
    msgs.push(Msg::text(Role::User, user_input));

    let timeout_s = effective_timeout_s(config, on_delta.is_some());
    let started = std::time::Instant::now();
    let response = call_with_budget(
        model,
        ModelRequest { messages: &msgs, tools: None, tool_choice: None, on_delta },
        timeout_s,
    )
    .await?;
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "strategy call done");

    let mut plan = parse_plan(&response, false)?;

    if let Some(snap) = snapshot {
        let outcome = crate::market::SnapshotOutcome::Ready(snap.clone());
        plan.params.insert("market_snapshot".into(), outcome.to_value());
    }
    Ok(plan)
}

/// Iterative reason–tool-call–observe loop, bounded by TOOL_MAX_ITERS.
/// Tool failures are recovered locally as error JSON so the model can
/// route around them.
pub async fn plan_with_tools(
    model: &dyn ChatModel,
    registry: &ToolRegistry,
    config: &AppConfig,
    memory: &[Msg],
    user_input: &str,
    on_delta: Option<DeltaSink>,
) -> Result<Plan, PlannerError> {
    let mut msgs = Vec::with_capacity(memory.len() + 2);
    msgs.push(Msg::text(Role::System, TOOL_PROMPT));
    msgs.extend_from_slice(memory);
    msgs.push(Msg::text(Role::User, user_input));

    let descriptors = registry.descriptors();
    let timeout_s = effective_timeout_s(config, on_delta.is_some());

    for iter in 0..config.llm.tool_max_iters {
        tracing::info!(iter, msgs_count = msgs.len(), "strategy loop");
        let started = std::time::Instant::now();
        let response = call_with_budget(
            model,
            ModelRequest {
                messages: &msgs,
                tools: (!descriptors.is_empty()).then_some(&descriptors[..]),
                tool_choice: Some("auto"),
                on_delta: on_delta.clone(),
            },
            timeout_s,
        )
        .await?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "llm call done");

        let tool_calls = response.tool_calls();
        if !tool_calls.is_empty() && !registry.is_empty() {
            msgs.push(Msg::tool_uses(tool_calls.clone()));

            for call in tool_calls {
                let started = std::time::Instant::now();
                let output = registry.call(&call, config.llm.tool_timeout_s).await;
                tracing::info!(
                    tool = %call.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output_len = output.len(),
                    "tool done"
                );
                msgs.push(Msg::tool_result(call.id, call.name, output));
            }
            continue;
        }

        return parse_plan(&response, true);
    }

    Err(PlannerError::ToolCallLimitExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::{ContentBlock, ToolCall};
    use async_trait::async_trait;
    use serde_json::{Map, json};
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<ModelResponse>>,
        seen_msgs: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ModelResponse>) -> Self {
            ScriptedModel { responses: Mutex::new(responses), seen_msgs: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, req: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
            self.seen_msgs.lock().unwrap().push(req.messages.len());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ModelError::EmptyResponse);
            }
            Ok(responses.remove(0))
        }
    }

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse { content: vec![ContentBlock::Text { text: text.into() }] }
    }

    fn test_config() -> AppConfig {
        AppConfig::from_env()
    }

    #[tokio::test]
    async fn simple_plan_parses_json() {
        let plan_json = json!({
            "intent": "chat",
            "assistant_text": "ok",
            "params": {},
            "rationale": "",
            "risk_notes": [],
            "actions": [],
        });
        let model = ScriptedModel::new(vec![text_response(&plan_json.to_string())]);
        let plan = plan_simple(
            &model,
            &test_config(),
            &[],
            "hello",
            None,
            IntentHint::Chat,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(plan.intent, "chat");
        assert_eq!(plan.assistant_text, "ok");
    }

    #[tokio::test]
    async fn simple_plan_falls_back_to_chat_on_prose() {
        let model = ScriptedModel::new(vec![text_response("plain words")]);
        let plan = plan_simple(
            &model,
            &test_config(),
            &[],
            "hello",
            None,
            IntentHint::Chat,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(plan.intent, "chat");
        assert_eq!(plan.assistant_text, "plain words");
        assert!(plan.actions.is_empty());
    }

    #[tokio::test]
    async fn tool_loop_feeds_results_back() {
        let mut input = Map::new();
        input.insert("klines".into(), json!([{"close": "1"}, {"close": "2"}]));
        let tool_turn = ModelResponse {
            content: vec![ContentBlock::ToolUse(ToolCall {
                id: "c1".into(),
                name: "compute_kline_features".into(),
                input,
            })],
        };
        let final_plan = json!({
            "intent": "chat", "assistant_text": "done", "params": {},
            "rationale": "", "risk_notes": [], "actions": [],
        });
        let model = ScriptedModel::new(vec![tool_turn, text_response(&final_plan.to_string())]);

        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(crate::tools::features::KlineFeaturesTool));

        let plan = plan_with_tools(&model, &registry, &test_config(), &[], "go", None)
            .await
            .unwrap();
        assert_eq!(plan.assistant_text, "done");

        // Second call saw the assistant echo + tool result appended.
        let seen = model.seen_msgs.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], seen[0] + 2);
    }

    #[tokio::test]
    async fn tool_loop_limit_is_fatal() {
        let tool_turn = |i: u32| ModelResponse {
            content: vec![ContentBlock::ToolUse(ToolCall {
                id: format!("c{i}"),
                name: "missing_tool".into(),
                input: Map::new(),
            })],
        };
        let responses: Vec<ModelResponse> = (0..10).map(tool_turn).collect();
        let model = ScriptedModel::new(responses);
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(crate::tools::features::KlineFeaturesTool));

        let err = plan_with_tools(&model, &registry, &test_config(), &[], "go", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::ToolCallLimitExceeded));
    }
}
