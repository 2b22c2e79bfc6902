use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::clock::unix_now_s;
use crate::config::EvmConfig;

use super::{Tool, ToolDescriptor, arg_str, error_output};

// ── Uniswap V2 interfaces ────────────────────────────────────────────

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IUniswapV2Router {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IUniswapV2Pair {
        function getReserves() external view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

// ── Unit conversion ──────────────────────────────────────────────────

/// Human-readable decimal string to raw token units, rounding down.
pub fn to_wei(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        bail!("empty amount");
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        bail!("invalid amount: {amount}");
    }

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat_n('0', decimals - frac_part.len()));
    }

    U256::from_str_radix(&digits, 10).context("amount out of range")
}

/// Raw token units back to a decimal string, trailing zeros trimmed.
pub fn from_wei(amount: U256, decimals: u8) -> String {
    let divisor = U256::from(10u8).pow(U256::from(decimals));
    let quotient = amount / divisor;
    let remainder = amount % divisor;
    if remainder.is_zero() {
        return quotient.to_string();
    }
    let frac = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{quotient}.{frac}")
}

// ── Tool ─────────────────────────────────────────────────────────────

/// On-chain AMM (Uniswap V2) market snapshot and quote.
pub struct AmmSnapshotTool {
    cfg: EvmConfig,
}

impl AmmSnapshotTool {
    pub fn new(cfg: EvmConfig) -> Self {
        AmmSnapshotTool { cfg }
    }

    async fn snapshot(
        &self,
        amount_in: &str,
        token_in: Option<String>,
        token_out: Option<String>,
    ) -> Result<Value> {
        let cfg = &self.cfg;
        if cfg.rpc_url.is_empty()
            || cfg.router.is_empty()
            || cfg.pair.is_empty()
            || cfg.token_a.is_empty()
            || cfg.token_b.is_empty()
        {
            bail!("missing preset configuration");
        }

        let token_in_addr = token_in.unwrap_or_else(|| cfg.token_a.clone());
        let token_out_addr = token_out.unwrap_or_else(|| cfg.token_b.clone());

        let router_addr: Address = cfg.router.parse().context("invalid router address")?;
        let pair_addr: Address = cfg.pair.parse().context("invalid pair address")?;
        let token_in_parsed: Address =
            token_in_addr.parse().context("invalid token_in address")?;
        let token_out_parsed: Address =
            token_out_addr.parse().context("invalid token_out address")?;

        let provider = ProviderBuilder::new()
            .connect_http(cfg.rpc_url.parse().context("invalid rpc url")?);

        let router = IUniswapV2Router::new(router_addr, &provider);
        let pair = IUniswapV2Pair::new(pair_addr, &provider);
        let token_in_c = IERC20::new(token_in_parsed, &provider);
        let token_out_c = IERC20::new(token_out_parsed, &provider);

        let token0 = pair.token0().call().await.context("pair.token0")?;
        let token1 = pair.token1().call().await.context("pair.token1")?;
        let reserves = pair.getReserves().call().await.context("pair.getReserves")?;

        let decimals_in = token_in_c.decimals().call().await.context("token_in.decimals")?;
        let decimals_out = token_out_c.decimals().call().await.context("token_out.decimals")?;

        // Symbols are cosmetic; tokens without them still quote fine.
        let symbol_in = token_in_c.symbol().call().await.unwrap_or_default();
        let symbol_out = token_out_c.symbol().call().await.unwrap_or_default();

        let amount_in_wei = to_wei(amount_in, decimals_in)?;
        let amounts_out = router
            .getAmountsOut(amount_in_wei, vec![token_in_parsed, token_out_parsed])
            .call()
            .await
            .context("router.getAmountsOut")?;
        let amount_out_wei = amounts_out.last().copied().unwrap_or(U256::ZERO);

        Ok(json!({
            "ok": true,
            "source": "amm_uniswap_v2",
            "network": {"rpc_url": cfg.rpc_url},
            "contracts": {"router": cfg.router, "pair": cfg.pair},
            "pair": {
                "token0": format!("{token0:?}"),
                "token1": format!("{token1:?}"),
                "reserve0": reserves.reserve0.to_string(),
                "reserve1": reserves.reserve1.to_string(),
            },
            "trade": {
                "token_in": token_in_addr,
                "token_out": token_out_addr,
                "symbol_in": symbol_in,
                "symbol_out": symbol_out,
                "decimals_in": decimals_in,
                "decimals_out": decimals_out,
                "amount_in": amount_in,
                "amount_in_wei": amount_in_wei.to_string(),
                "amount_out_wei": amount_out_wei.to_string(),
                "amount_out": from_wei(amount_out_wei, decimals_out),
            },
            "timestamp_unix_s": unix_now_s(),
        }))
    }
}

#[async_trait]
impl Tool for AmmSnapshotTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_amm_market_snapshot".into(),
            description: "Get an on-chain AMM (Uniswap V2) market snapshot and quote for \
                          swapping amount_in of token_in into token_out."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "amount_in": {
                        "type": "string",
                        "description": "Amount in human-readable units (e.g. \"1.5\")."
                    },
                    "token_in": {
                        "type": "string",
                        "description": "Optional ERC20 address. Defaults to the configured TokenA."
                    },
                    "token_out": {
                        "type": "string",
                        "description": "Optional ERC20 address. Defaults to the configured TokenB."
                    }
                },
                "required": ["amount_in"]
            }),
        }
    }

    async fn invoke(&self, args: Map<String, Value>) -> String {
        let Some(amount_in) = arg_str(&args, "amount_in") else {
            return error_output("InvalidInput", "amount_in is required");
        };
        let token_in = arg_str(&args, "token_in").filter(|s| !s.is_empty());
        let token_out = arg_str(&args, "token_out").filter(|s| !s.is_empty());

        let budget = Duration::from_secs_f64(self.cfg.rpc_timeout_s.max(1.0));
        match tokio::time::timeout(budget, self.snapshot(&amount_in, token_in, token_out)).await
        {
            Ok(Ok(snapshot)) => snapshot.to_string(),
            Ok(Err(e)) => error_output("RpcError", &format!("{e:#}")),
            Err(_) => error_output("TimeoutError", "evm rpc timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_wei_rounds_down() {
        assert_eq!(to_wei("1.5", 18).unwrap(), U256::from(15u128) * U256::from(10u128).pow(U256::from(17u8)));
        assert_eq!(to_wei("0.0000000000000000019", 18).unwrap(), U256::from(1u8));
        assert_eq!(to_wei("2", 6).unwrap(), U256::from(2_000_000u64));
        assert!(to_wei("abc", 18).is_err());
        assert!(to_wei("", 18).is_err());
    }

    #[test]
    fn from_wei_trims_trailing_zeros() {
        assert_eq!(from_wei(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(from_wei(U256::from(2_000_000u64), 6), "2");
        assert_eq!(from_wei(U256::from(1u8), 6), "0.000001");
    }

    #[test]
    fn wei_round_trip_of_integers() {
        let wei = to_wei("42", 18).unwrap();
        assert_eq!(from_wei(wei, 18), "42");
    }
}
