use std::env;

// ── Paseo testnet defaults ───────────────────────────────────────────

const DEFAULT_EVM_RPC_URL: &str = "https://testnet-passet-hub-eth-rpc.polkadot.io";
const DEFAULT_UNISWAP_WETH9: &str = "0x4042196503b0C1E1f4188277bFfA46373FCf3576";
const DEFAULT_UNISWAP_FACTORY: &str = "0xdCB1Bc3F7b806E553FC79E48768c809c051734Ef";
const DEFAULT_UNISWAP_ROUTER: &str = "0x9aeAf6995b64A490fe1c2a8c06Dc2E912a487710";
const DEFAULT_TOKENDEMO: &str = "0xDD128D3998Ca3DfACEbbC4218F7101B10aC8b09F";
const DEFAULT_TOKEN_A: &str = "0x252Fdde220E559f4c88B458CD67A7841256F87Fa";
const DEFAULT_TOKEN_B: &str = "0x03b0875d24782055C28BE0ba558F0626A19DC68f";
const DEFAULT_PAIR: &str = "0x7849dBD762857A7Bdc37766255d97E0f3C8B9e89";

pub const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";
/// Mirror host for regions where the canonical Binance endpoint is blocked.
pub const BINANCE_FALLBACK_BASE_URL: &str = "https://data-api.binance.vision";

// ── Env helpers ──────────────────────────────────────────────────────

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Flags default to ON; "0", "false" and "no" turn them off.
fn env_flag_on(name: &str) -> bool {
    match env::var(name) {
        Ok(v) => !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no"),
        Err(_) => true,
    }
}

// ── Config sections ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model_name: String,
    pub upstream_streaming: bool,
    /// Budget for a single non-streaming model call.
    pub timeout_s: f64,
    /// Budget for a whole streamed response; 0 disables the limit.
    pub stream_timeout_s: f64,
    pub tool_timeout_s: f64,
    pub tool_max_iters: u32,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub chunk_size: usize,
    pub delay_ms: u64,
    pub keepalive_s: f64,
    pub total_timeout_s: f64,
}

#[derive(Debug, Clone)]
pub struct CexConfig {
    pub base_url: String,
    pub timeout_s: f64,
    pub default_quote: String,
    pub kline_interval: String,
    pub kline_limit: u32,
}

#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub rpc_timeout_s: f64,
    pub router: String,
    pub factory: String,
    pub weth: String,
    pub token_demo: String,
    pub token_a: String,
    pub token_b: String,
    pub pair: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub max_input_chars: usize,
    pub session_ttl_seconds: u64,
    pub default_symbol: String,
    pub use_simple_strategy: bool,
    pub crosschain_inbound_token: String,
    pub llm: LlmConfig,
    pub stream: StreamConfig,
    pub cex: CexConfig,
    pub evm: EvmConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let upstream_timeout_s = env_f64("UPSTREAM_TIMEOUT_SECONDS", 60.0);
        let stream = StreamConfig {
            chunk_size: env_u64("STREAM_CHUNK_SIZE", 12) as usize,
            delay_ms: env_u64("STREAM_DELAY_MS", 15),
            keepalive_s: env_f64("STREAM_KEEPALIVE_SECONDS", 2.0),
            total_timeout_s: env_f64("STREAM_TOTAL_TIMEOUT_SECONDS", 75.0),
        };

        AppConfig {
            max_input_chars: env_u64("MAX_INPUT_CHARS", 2000) as usize,
            session_ttl_seconds: env_u64("SESSION_TTL_SECONDS", 1800),
            default_symbol: env_str("DEFAULT_SYMBOL", "BTCUSDT").to_uppercase(),
            use_simple_strategy: env_flag_on("USE_SIMPLE_STRATEGY"),
            crosschain_inbound_token: env_str("CROSSCHAIN_INBOUND_TOKEN", ""),
            llm: LlmConfig {
                provider: env_str("MODEL_PROVIDER", "deepseek").to_lowercase(),
                model_name: env_str("MODEL_NAME", ""),
                upstream_streaming: env_flag_on("UPSTREAM_STREAMING"),
                timeout_s: env_f64("LLM_TIMEOUT_SECONDS", upstream_timeout_s),
                stream_timeout_s: env_f64("LLM_STREAM_TIMEOUT_SECONDS", 0.0),
                tool_timeout_s: env_f64("TOOL_TIMEOUT_SECONDS", 20.0),
                tool_max_iters: env_u64("TOOL_MAX_ITERS", 6) as u32,
            },
            stream,
            cex: CexConfig {
                base_url: env_str("BINANCE_BASE_URL", DEFAULT_BINANCE_BASE_URL),
                timeout_s: env_f64("CEX_TIMEOUT_SECONDS", 10.0),
                default_quote: env_str("CEX_DEFAULT_QUOTE", "USDT").to_uppercase(),
                kline_interval: env_str("CEX_KLINE_INTERVAL", "1h"),
                kline_limit: env_u64("CEX_KLINE_LIMIT", 200) as u32,
            },
            evm: EvmConfig {
                rpc_url: env_str("EVM_RPC_URL", DEFAULT_EVM_RPC_URL),
                rpc_timeout_s: env_f64("EVM_RPC_TIMEOUT_SECONDS", 10.0),
                router: env_str("UNISWAP_V2_ROUTER", DEFAULT_UNISWAP_ROUTER),
                factory: env_str("UNISWAP_V2_FACTORY", DEFAULT_UNISWAP_FACTORY),
                weth: env_str("WETH9", DEFAULT_UNISWAP_WETH9),
                token_demo: env_str("TOKENDEMO", DEFAULT_TOKENDEMO),
                token_a: env_str("DEFAULT_TOKEN_A", DEFAULT_TOKEN_A),
                token_b: env_str("DEFAULT_TOKEN_B", DEFAULT_TOKEN_B),
                pair: env_str("DEFAULT_PAIR", DEFAULT_PAIR),
            },
        }
    }

    /// Test hook: skip model/tool construction entirely at startup.
    pub fn startup_disabled() -> bool {
        env::var("DISABLE_STARTUP").map(|v| v.trim() == "1").unwrap_or(false)
    }
}
