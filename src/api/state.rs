use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::crosschain::CrossChainService;
use crate::llm::{ChatModel, build_model};
use crate::market::{BinanceMarketData, MarketData};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

/// Everything a request handler needs. Built once at startup; tests
/// assemble it directly with fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// None until startup initialization ran (DISABLE_STARTUP test hook);
    /// chat endpoints answer `not_ready` in that state.
    pub model: Option<Arc<dyn ChatModel>>,
    pub market: Arc<dyn MarketData>,
    pub tools: Arc<ToolRegistry>,
    pub sessions: Arc<SessionStore>,
    pub cross_chain: Arc<CrossChainService>,
}

impl AppState {
    pub fn assemble(
        config: AppConfig,
        model: Option<Arc<dyn ChatModel>>,
        market: Arc<dyn MarketData>,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::builtin(&config, market.clone()));
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(config.session_ttl_seconds)));
        AppState {
            config: Arc::new(config),
            model,
            market,
            tools,
            sessions,
            cross_chain: Arc::new(CrossChainService::new()),
        }
    }

    pub fn from_env() -> Result<Self> {
        let config = AppConfig::from_env();
        let market: Arc<dyn MarketData> = Arc::new(BinanceMarketData::new(&config.cex));

        let model = if AppConfig::startup_disabled() {
            tracing::warn!("startup disabled; chat endpoints will answer not_ready");
            None
        } else {
            Some(build_model(&config).context("constructing model provider")?)
        };

        Ok(AppState::assemble(config, model, market))
    }
}
