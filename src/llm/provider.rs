use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::config::AppConfig;

use super::anthropic::AnthropicModel;
use super::model::ChatModel;
use super::openai::OpenAiCompatModel;

const DEEPSEEK_DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DASHSCOPE_DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

fn require_key(var: &str) -> Result<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty()).with_context(|| {
        format!("Missing required env: {var}")
    })
}

fn http_client(timeout_s: f64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs_f64(timeout_s.max(1.0)))
        .build()
        .context("building upstream http client")
}

/// Construct the configured provider. The transport timeout covers a
/// whole streamed response when streaming is on, so it is stretched to
/// max(call budget, stream budget + slack).
pub fn build_model(config: &AppConfig) -> Result<Arc<dyn ChatModel>> {
    let llm = &config.llm;
    let provider = llm.provider.as_str();

    let mut model_name = llm.model_name.clone();
    if model_name.is_empty() && provider == "deepseek" {
        model_name = "deepseek-chat".to_string();
    }
    if model_name.is_empty() {
        bail!("Missing required env: MODEL_NAME");
    }

    let stream_slack_s = config.stream.total_timeout_s + 30.0;
    let client_timeout_s = if llm.upstream_streaming {
        llm.timeout_s.max(stream_slack_s)
    } else {
        llm.timeout_s
    };

    match provider {
        "deepseek" => {
            let api_key = require_key("DEEPSEEK_API_KEY")?;
            let base_url = env::var("DEEPSEEK_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEEPSEEK_DEFAULT_BASE_URL.to_string());
            Ok(Arc::new(OpenAiCompatModel::new(
                http_client(client_timeout_s)?,
                base_url,
                api_key,
                model_name,
                llm.upstream_streaming,
            )))
        }
        "openai" => {
            let api_key = require_key("OPENAI_API_KEY")?;
            Ok(Arc::new(OpenAiCompatModel::new(
                http_client(llm.timeout_s)?,
                OPENAI_DEFAULT_BASE_URL.to_string(),
                api_key,
                model_name,
                false,
            )))
        }
        "dashscope" => {
            let api_key = require_key("DASHSCOPE_API_KEY")?;
            Ok(Arc::new(OpenAiCompatModel::new(
                http_client(llm.timeout_s)?,
                DASHSCOPE_DEFAULT_BASE_URL.to_string(),
                api_key,
                model_name,
                false,
            )))
        }
        "anthropic" => {
            let api_key = require_key("ANTHROPIC_API_KEY")?;
            Ok(Arc::new(AnthropicModel::new(
                http_client(llm.timeout_s)?,
                ANTHROPIC_DEFAULT_BASE_URL.to_string(),
                api_key,
                model_name,
            )))
        }
        other => bail!("Unsupported MODEL_PROVIDER: {other}"),
    }
}
