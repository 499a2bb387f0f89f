use alloy::primitives::{address, Address};

/// x402 protocol version spoken by this engine.
pub const X402_VERSION: u32 = 1;

/// Scheme tag for exact-amount payments.
pub const SCHEME_EXACT: &str = "exact";

/// Request header carrying the base64 payment payload.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64 settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header the client sets so the receipt header is readable.
pub const EXPOSE_HEADERS_HEADER: &str = "Access-Control-Expose-Headers";

/// Base mainnet.
pub const NETWORK_BASE: &str = "base";
pub const BASE_CHAIN_ID: u64 = 8453;
pub const BASE_USDC: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
pub const BASE_USDC_NAME: &str = "USD Coin";

/// Base Sepolia testnet.
pub const NETWORK_BASE_SEPOLIA: &str = "base-sepolia";
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;
pub const BASE_SEPOLIA_USDC: Address = address!("036cbd53842c5426634e7929541ec2318f3dcf7e");
pub const BASE_SEPOLIA_USDC_NAME: &str = "USDC";

/// EIP-712 domain version of the USDC deployments above. Servers advertise it
/// in `extra`; verification always reads the live value from the contract.
pub const USDC_EIP712_VERSION: &str = "2";

/// USDC has 6 decimal places on every supported network.
pub const USDC_DECIMALS: u32 = 6;

/// Public RPC endpoints used when no override is configured.
pub const BASE_RPC_URL: &str = "https://mainnet.base.org";
pub const BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";

/// `validAfter` is backdated by this much to absorb clock skew and block timestamping.
pub const VALID_AFTER_SKEW_SECS: u64 = 5;

/// An authorization must stay valid at least this long past verification.
pub const VALID_BEFORE_MARGIN_SECS: u64 = 6;

/// Default `maxTimeoutSeconds` advertised by resource servers.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

/// Upper bound the payer applies to any server-advertised timeout.
pub const MAX_AUTHORIZATION_WINDOW_SECS: u64 = 3600;

/// Default client payment ceiling: 0.10 USDC in atomic units.
pub const DEFAULT_MAX_PAYMENT: u64 = 100_000;
