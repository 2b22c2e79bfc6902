use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

// ── Deterministic buy fast-path ──────────────────────────────────────

/// "buy N PAS for TOKEN" in either surface order, Chinese or English.
static BUY_PAS_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|\s)(?:给我|帮我)?(?:买|购买|buy)\s*(?P<amount>\d+(?:\.\d+)?)\s*PAS\s*(?:的)?\s*(?P<token>[A-Za-z][A-Za-z0-9_\-]{1,63})(?:\b|$)|(?:^|\s)(?:用|拿)\s*(?P<amount2>\d+(?:\.\d+)?)\s*PAS\s*(?:去|来)?\s*(?:买|购买|buy)\s*(?P<token2>[A-Za-z][A-Za-z0-9_\-]{1,63})(?:\b|$)",
    )
    .expect("buy intent regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyIntent {
    /// Decimal string with trailing fractional zeros stripped.
    pub amount_in_pas: String,
    pub token_out_symbol: String,
}

pub fn extract_buy_intent(user_input: &str) -> Option<BuyIntent> {
    let text = user_input.trim();
    if text.is_empty() {
        return None;
    }

    let caps = BUY_PAS_TOKEN_RE.captures(text)?;
    let amount = caps
        .name("amount")
        .or_else(|| caps.name("amount2"))
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    let token = caps
        .name("token")
        .or_else(|| caps.name("token2"))
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    if amount.is_empty() || token.is_empty() {
        return None;
    }

    let amt = Decimal::from_str(amount).ok()?;
    if amt <= Decimal::ZERO {
        return None;
    }

    Some(BuyIntent {
        amount_in_pas: amt.normalize().to_string(),
        token_out_symbol: token.to_string(),
    })
}

// ── Intent hint ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentHint {
    Strategy,
    Chat,
}

const STRATEGY_KEYWORDS: &[&str] = &[
    "策略", "网格", "dca", "定投", "买入", "卖出", "做多", "做空", "交易", "开仓",
    "加仓", "止损", "止盈", "指标", "技术指标", "技术分析", "分析", "行情", "k线",
    "kline", "rsi", "macd", "boll", "bollinger", "布林", "strategy", "grid", "long",
    "short", "buy", "sell", "technical", "indicator", "ta",
];

pub fn infer_intent_hint(user_input: &str) -> IntentHint {
    let text = user_input.trim().to_lowercase();
    if text.is_empty() {
        return IntentHint::Chat;
    }
    if STRATEGY_KEYWORDS.iter().any(|k| text.contains(k)) {
        IntentHint::Strategy
    } else {
        IntentHint::Chat
    }
}

// ── CEX symbol extraction ────────────────────────────────────────────

/// Indicator vocabulary that must never be mistaken for a base asset.
const INDICATOR_TOKENS: &[&str] = &["RSI", "MACD", "BOLL", "MA", "EMA", "SMA", "VWAP"];

#[derive(Debug, thiserror::Error)]
#[error("symbol is required")]
pub struct EmptySymbol;

/// Uppercase, strip `/`, and append the default quote to short bare bases.
pub fn normalize_cex_symbol(symbol: &str, default_quote: &str) -> Result<String, EmptySymbol> {
    let mut s = symbol.trim().to_uppercase();
    if s.is_empty() {
        return Err(EmptySymbol);
    }
    if s.contains('/') {
        s = s.replace('/', "");
    }
    if s.ends_with(default_quote) {
        return Ok(s);
    }
    if s.len() <= default_quote.len() + 1 {
        return Ok(format!("{s}{default_quote}"));
    }
    Ok(s)
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit()
}

/// `tok` occurring in `upper` with no `[A-Z0-9]` on either side.
fn has_token(upper: &str, tok: &str) -> bool {
    for (idx, m) in upper.match_indices(tok) {
        let before_ok = upper[..idx].chars().next_back().is_none_or(|c| !is_symbol_char(c));
        let after_ok = upper[idx + m.len()..].chars().next().is_none_or(|c| !is_symbol_char(c));
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z]{2,10})\s*/?\s*(USDT|USDC|USD)").expect("pair regex")
});

static BARE_BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z]{2,10}").expect("bare base regex")
});

fn bounded(upper: &str, start: usize, end: usize) -> bool {
    let before_ok = upper[..start].chars().next_back().is_none_or(|c| !is_symbol_char(c));
    let after_ok = upper[end..].chars().next().is_none_or(|c| !is_symbol_char(c));
    before_ok && after_ok
}

/// Best-effort symbol from free text; falls back to `default_symbol`.
pub fn extract_symbol(user_input: &str, default_quote: &str, default_symbol: &str) -> String {
    let text = user_input.trim();
    if text.is_empty() {
        return default_symbol.to_string();
    }

    let upper = text.to_uppercase();

    // Minimal alias support
    if text.contains("以太坊") || has_token(&upper, "ETH") {
        return normalize_cex_symbol("ETH", default_quote)
            .unwrap_or_else(|_| default_symbol.to_string());
    }
    if text.contains("比特币") || has_token(&upper, "BTC") {
        return normalize_cex_symbol("BTC", default_quote)
            .unwrap_or_else(|_| default_symbol.to_string());
    }

    // Explicit pairs like ETH/USDT, eth usdt, ETHUSDT
    for caps in PAIR_RE.captures_iter(&upper) {
        let whole = caps.get(0).expect("match");
        if !bounded(&upper, whole.start(), whole.end()) {
            continue;
        }
        let base = caps.get(1).expect("base").as_str();
        let quote = caps.get(2).expect("quote").as_str();
        return normalize_cex_symbol(&format!("{base}{quote}"), default_quote)
            .unwrap_or_else(|_| default_symbol.to_string());
    }

    // Bare base assets like SOL, ETH, BTC
    for m in BARE_BASE_RE.find_iter(&upper) {
        if !bounded(&upper, m.start(), m.end()) {
            continue;
        }
        let token = m.as_str();
        if INDICATOR_TOKENS.contains(&token) {
            return default_symbol.to_string();
        }
        return normalize_cex_symbol(token, default_quote)
            .unwrap_or_else(|_| default_symbol.to_string());
    }

    default_symbol.to_string()
}
