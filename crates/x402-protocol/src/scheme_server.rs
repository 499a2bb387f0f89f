use std::sync::Arc;

use alloy::primitives::U256;

use crate::network::{AssetInfo, NetworkRegistry};
use crate::{SchemeServer, X402Error};

/// Server-side `exact` scheme: prices routes in the network's USDC.
pub struct ExactEvmSchemeServer {
    registry: Arc<NetworkRegistry>,
}

impl ExactEvmSchemeServer {
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for ExactEvmSchemeServer {
    fn default() -> Self {
        Self::new(Arc::new(NetworkRegistry::default()))
    }
}

impl SchemeServer for ExactEvmSchemeServer {
    fn parse_price(&self, price: &str, network: &str) -> Result<(U256, AssetInfo), X402Error> {
        let asset = self.registry.resolve(network)?.asset.clone();
        let amount = parse_money(price, asset.decimals)?;
        Ok((amount, asset))
    }
}

/// Convert a money string into atomic units with `decimals` places.
///
/// Accepts an optional leading `$` and surrounding whitespace. Digits past
/// `decimals` are truncated. No floating point is involved.
pub fn parse_money(price: &str, decimals: u32) -> Result<U256, X402Error> {
    let invalid = |why: &str| X402Error::InvalidPayment(format!("invalid price '{price}': {why}"));

    let cleaned = price.trim();
    let cleaned = cleaned.strip_prefix('$').unwrap_or(cleaned);
    if cleaned.is_empty() {
        return Err(invalid("no numeric content"));
    }

    let (integer_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned, ""));
    if integer_part.is_empty() && fractional_part.is_empty() {
        return Err(invalid("no numeric content"));
    }
    if !integer_part.bytes().all(|b| b.is_ascii_digit())
        || !fractional_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid("expected digits with an optional decimal point"));
    }

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(integer_part.len() + decimals);
    digits.push_str(integer_part);
    let kept = &fractional_part[..fractional_part.len().min(decimals)];
    digits.push_str(kept);
    digits.extend(std::iter::repeat_n('0', decimals - kept.len()));

    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    if trimmed.len() > 30 {
        return Err(invalid("overflow"));
    }
    U256::from_str_radix(trimmed, 10).map_err(|e| invalid(&e.to_string()))
}
