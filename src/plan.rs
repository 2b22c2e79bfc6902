use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ── Demo action vocabulary ───────────────────────────────────────────

pub const DEMO_ACTION_TYPES: &[&str] =
    &["start_dca", "start_grid", "start_mean_reversion", "start_martingale", "none"];

/// Collapse model-invented variants onto the closed demo vocabulary.
/// Unknown types map to None and get dropped by the normalizer.
pub fn normalize_action_type(raw: &str) -> Option<String> {
    let s = raw.trim().to_lowercase().replace(['-', ' '], "_");
    if s.is_empty() {
        return None;
    }
    if DEMO_ACTION_TYPES.contains(&s.as_str()) {
        return Some(s);
    }

    let mapped = match s.as_str() {
        "dca" | "smart_dca" | "intelligent_dca" | "ai_dca" | "start_smart_dca" => "start_dca",
        "grid" | "grid_trading" | "start_grid_trading" => "start_grid",
        "mean_reversion" | "meanreversion" | "start_meanreversion" => "start_mean_reversion",
        "martingale" | "start_martingale_strategy" => "start_martingale",
        "wait" | "hold" | "no_trade" | "observe" | "none_strategy" => "none",
        _ => return None,
    };
    Some(mapped.to_string())
}

/// Demo UI label for an action type.
pub fn strategy_label(action_type: Option<&str>) -> String {
    match action_type.unwrap_or("none") {
        "start_dca" => "智能DCA",
        "start_grid" => "网格",
        "start_mean_reversion" => "均值回归",
        "start_martingale" => "马丁格尔",
        _ => "暂时观望",
    }
    .to_string()
}

// ── Plan & actions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// The model's output contract, parsed tolerantly: anything missing or
/// mistyped collapses to an empty default.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub assistant_text: String,
    pub intent: String,
    pub params: Map<String, Value>,
    pub rationale: String,
    pub risk_notes: Vec<String>,
    pub actions: Vec<Value>,
}

impl Plan {
    pub fn from_map(mut obj: Map<String, Value>) -> Self {
        let take_str = |obj: &mut Map<String, Value>, key: &str| -> String {
            match obj.remove(key) {
                Some(Value::String(s)) => s,
                _ => String::new(),
            }
        };
        let assistant_text = take_str(&mut obj, "assistant_text");
        let intent = {
            let s = take_str(&mut obj, "intent");
            if s.is_empty() { "chat".to_string() } else { s }
        };
        let rationale = take_str(&mut obj, "rationale");
        let params = match obj.remove("params") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        let risk_notes = match obj.remove("risk_notes") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let actions = match obj.remove("actions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        Plan { assistant_text, intent, params, rationale, risk_notes, actions }
    }

    /// Non-JSON model output becomes a plain chat reply.
    pub fn chat_fallback(text: &str, rationale: &str) -> Self {
        Plan {
            assistant_text: text.to_string(),
            intent: "chat".to_string(),
            rationale: rationale.to_string(),
            ..Plan::default()
        }
    }

    pub fn market_snapshot(&self) -> Option<&Value> {
        self.params.get("market_snapshot").filter(|v| v.is_object())
    }
}

// ── Parameter back-fill ──────────────────────────────────────────────

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn is_missing(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn set_if_missing(params: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    let Some(value) = value else { return };
    if is_missing(params.get(key)) {
        params.insert(key.to_string(), value);
    }
}

fn snapshot_f64(snapshot: Option<&Value>, section: &str, key: &str) -> Option<f64> {
    snapshot?.get(section)?.get(key)?.as_f64()
}

/// Back-fill the strategy parameters the demo UI renders, without ever
/// overwriting what the model already provided. Mirrors the key fields
/// into the first action's params.
pub fn ensure_strategy_params(
    plan: &mut Plan,
    requested_symbol: Option<&str>,
    snapshot: Option<&Value>,
) {
    let action_type = plan
        .actions
        .first()
        .and_then(|a| a.get("type"))
        .and_then(Value::as_str)
        .and_then(normalize_action_type);

    if let Some(symbol) = requested_symbol {
        set_if_missing(&mut plan.params, "symbol", Some(json!(symbol)));
    }

    if let Some(first) = plan.actions.first_mut() {
        if let Some(obj) = first.as_object_mut() {
            if !obj.get("params").map(Value::is_object).unwrap_or(false) {
                obj.insert("params".into(), Value::Object(Map::new()));
            }
            if let (Some(symbol), Some(Value::Object(ap))) =
                (requested_symbol, obj.get_mut("params"))
            {
                set_if_missing(ap, "symbol", Some(json!(symbol)));
            }
        }
    }

    // Bollinger bands make a reasonable default entry range; fall back to
    // ±2% around the current price.
    let bb_upper = snapshot_f64(snapshot, "indicators", "bollinger_upper");
    let bb_lower = snapshot_f64(snapshot, "indicators", "bollinger_lower");
    let current = snapshot_f64(snapshot, "price", "current");

    let entry_range: Option<Value> = match (bb_lower, bb_upper) {
        (Some(l), Some(u)) if l > 0.0 && u > l => Some(json!([round2(l), round2(u)])),
        _ => current
            .filter(|p| *p > 0.0)
            .map(|p| json!([round2(p * 0.98), round2(p * 1.02)])),
    };

    let defaults: Option<(Option<i64>, i64, i64)> = match action_type.as_deref() {
        Some("start_grid") => Some((Some(10), 3, 8)),
        Some("start_dca") => Some((None, 4, 10)),
        Some("start_mean_reversion") => Some((None, 3, 6)),
        Some("start_martingale") => Some((None, 2, 12)),
        _ => None,
    };

    if let Some((grid_levels, take_profit, stop_loss)) = defaults {
        set_if_missing(&mut plan.params, "entry_price_range", entry_range);
        if let Some(levels) = grid_levels {
            set_if_missing(&mut plan.params, "grid_levels", Some(json!(levels)));
        }
        set_if_missing(&mut plan.params, "take_profit_percent", Some(json!(take_profit)));
        set_if_missing(&mut plan.params, "stop_loss_percent", Some(json!(stop_loss)));
    }

    // Mirror key params into the first action for clients that read them there.
    let mirrored: Vec<(String, Value)> =
        ["entry_price_range", "grid_levels", "take_profit_percent", "stop_loss_percent"]
            .iter()
            .filter_map(|k| plan.params.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
    if let Some(Value::Object(obj)) = plan.actions.first_mut() {
        if let Some(Value::Object(ap)) = obj.get_mut("params") {
            for (k, v) in mirrored {
                set_if_missing(ap, &k, Some(v));
            }
        }
    }
}

// ── Execution preview ────────────────────────────────────────────────

/// Coerce the plan's actions onto the demo vocabulary and build the
/// preview payload. Returns (assistant_text, actions, preview).
pub fn execution_preview(plan: &Plan) -> (String, Vec<Action>, Option<Value>) {
    let intent = if plan.intent.is_empty() { "chat" } else { plan.intent.as_str() };

    let mut actions: Vec<Action> = plan
        .actions
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let norm_type = normalize_action_type(obj.get("type")?.as_str()?)?;
            let params = match obj.get("params") {
                Some(Value::Object(m)) => m.clone(),
                _ => Map::new(),
            };
            Some(Action { action_type: norm_type, params })
        })
        .collect();

    if intent != "chat" {
        if actions.is_empty() {
            actions.push(Action { action_type: "none".into(), params: Map::new() });
        }
        actions.truncate(1);
    }

    if intent == "chat" && actions.is_empty() {
        let assistant_text = if !plan.assistant_text.is_empty() {
            plan.assistant_text.clone()
        } else {
            plan.rationale.clone()
        };
        return (assistant_text, actions, None);
    }

    let preview = json!({
        "mode": "preview",
        "intent": if intent == "chat" { "strategy_recommendation" } else { intent },
        "params": Value::Object(plan.params.clone()),
        "requires_confirmation": true,
        "actions": actions,
    });

    let risk_text: Vec<String> = plan
        .risk_notes
        .iter()
        .filter(|x| !x.trim().is_empty())
        .map(|x| format!("- {x}"))
        .collect();

    let mut assistant_text = plan.rationale.clone();
    if !risk_text.is_empty() {
        assistant_text =
            format!("{assistant_text}\n\nRisk notes:\n{}", risk_text.join("\n")).trim().to_string();
    }
    if assistant_text.is_empty() {
        assistant_text = "I created an execution preview. Please confirm before proceeding.".into();
    }

    (assistant_text, actions, Some(preview))
}

/// Route advisory attached to previews. Advisory only while routing is
/// stubbed out.
pub fn routing_stub(market_snapshot: Option<&Value>) -> Value {
    match market_snapshot {
        None => json!({"route": "AMM", "reason": "default_route", "stub": true}),
        Some(s) if s.get("ok") == Some(&Value::Bool(false)) => {
            json!({"route": "AMM", "reason": "market_snapshot_error", "stub": true})
        }
        Some(_) => json!({"route": "AMM", "reason": "amm_quote_available", "stub": false}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_aliases() {
        assert_eq!(normalize_action_type("start_dca").as_deref(), Some("start_dca"));
        assert_eq!(normalize_action_type("Smart DCA").as_deref(), Some("start_dca"));
        assert_eq!(normalize_action_type("grid-trading").as_deref(), Some("start_grid"));
        assert_eq!(normalize_action_type("MeanReversion").as_deref(), Some("start_mean_reversion"));
        assert_eq!(normalize_action_type("hold").as_deref(), Some("none"));
        assert_eq!(normalize_action_type("moon_shot"), None);
        assert_eq!(normalize_action_type(""), None);
    }

    #[test]
    fn labels_cover_vocabulary() {
        assert_eq!(strategy_label(Some("start_dca")), "智能DCA");
        assert_eq!(strategy_label(Some("start_grid")), "网格");
        assert_eq!(strategy_label(Some("start_mean_reversion")), "均值回归");
        assert_eq!(strategy_label(Some("start_martingale")), "马丁格尔");
        assert_eq!(strategy_label(None), "暂时观望");
    }

    fn plan_with_action(action_type: &str) -> Plan {
        Plan::from_map(
            json!({
                "intent": "strategy_recommendation",
                "assistant_text": "ok",
                "rationale": "looks good",
                "risk_notes": ["volatile"],
                "actions": [{"type": action_type, "params": {}}],
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
    }

    #[test]
    fn preview_caps_actions_at_one() {
        let mut plan = plan_with_action("start_dca");
        plan.actions.push(json!({"type": "start_grid", "params": {}}));
        let (_, actions, preview) = execution_preview(&plan);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "start_dca");
        let preview = preview.unwrap();
        assert_eq!(preview["requires_confirmation"], true);
        assert_eq!(preview["actions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn non_chat_intent_gets_synthetic_none() {
        let plan = Plan::from_map(
            json!({
                "intent": "strategy_recommendation",
                "actions": [{"type": "moon_shot", "params": {}}],
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let (_, actions, preview) = execution_preview(&plan);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "none");
        assert!(preview.is_some());
    }

    #[test]
    fn chat_intent_has_no_preview() {
        let plan = Plan::from_map(
            json!({"intent": "chat", "assistant_text": "hi", "actions": []})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let (text, actions, preview) = execution_preview(&plan);
        assert_eq!(text, "hi");
        assert!(actions.is_empty());
        assert!(preview.is_none());
    }

    #[test]
    fn risk_notes_folded_into_text() {
        let plan = plan_with_action("start_grid");
        let (text, _, _) = execution_preview(&plan);
        assert!(text.contains("looks good"));
        assert!(text.contains("Risk notes:"));
        assert!(text.contains("- volatile"));
    }

    fn snapshot(bb_lower: f64, bb_upper: f64, price: f64) -> Value {
        json!({
            "ok": true,
            "price": {"current": price},
            "indicators": {"bollinger_lower": bb_lower, "bollinger_upper": bb_upper},
        })
    }

    #[test]
    fn backfill_prefers_bollinger_range() {
        let mut plan = plan_with_action("start_dca");
        ensure_strategy_params(&mut plan, Some("BTCUSDT"), Some(&snapshot(95.0, 105.0, 100.0)));
        assert_eq!(plan.params["symbol"], "BTCUSDT");
        assert_eq!(plan.params["entry_price_range"], json!([95.0, 105.0]));
        assert_eq!(plan.params["take_profit_percent"], 4);
        assert_eq!(plan.params["stop_loss_percent"], 10);
        assert!(plan.params.get("grid_levels").is_none());
        // Mirrored into the action params too.
        let ap = plan.actions[0]["params"].as_object().unwrap();
        assert_eq!(ap["symbol"], "BTCUSDT");
        assert_eq!(ap["take_profit_percent"], 4);
    }

    #[test]
    fn backfill_falls_back_to_price_band() {
        let mut plan = plan_with_action("start_grid");
        let snap = json!({"ok": true, "price": {"current": 100.0}, "indicators": {}});
        ensure_strategy_params(&mut plan, None, Some(&snap));
        assert_eq!(plan.params["entry_price_range"], json!([98.0, 102.0]));
        assert_eq!(plan.params["grid_levels"], 10);
        assert_eq!(plan.params["take_profit_percent"], 3);
        assert_eq!(plan.params["stop_loss_percent"], 8);
    }

    #[test]
    fn backfill_never_overwrites_model_values() {
        let mut plan = plan_with_action("start_dca");
        plan.params.insert("take_profit_percent".into(), json!(7));
        plan.params.insert("symbol".into(), json!("SOLUSDT"));
        ensure_strategy_params(&mut plan, Some("BTCUSDT"), Some(&snapshot(95.0, 105.0, 100.0)));
        assert_eq!(plan.params["take_profit_percent"], 7);
        assert_eq!(plan.params["symbol"], "SOLUSDT");
    }

    #[test]
    fn routing_stub_reasons() {
        assert_eq!(routing_stub(None)["reason"], "default_route");
        let bad = json!({"ok": false});
        assert_eq!(routing_stub(Some(&bad))["reason"], "market_snapshot_error");
        let good = json!({"ok": true});
        let r = routing_stub(Some(&good));
        assert_eq!(r["reason"], "amm_quote_available");
        assert_eq!(r["stub"], false);
    }
}
