use alloy::primitives::Address;
use std::collections::HashMap;
use url::Url;
use x402::{
    AssetExtra, PaymentRequirements, SchemeServer, X402Error, DEFAULT_MAX_TIMEOUT_SECONDS,
    NETWORK_BASE_SEPOLIA, SCHEME_EXACT,
};

/// Payment configuration for a single route.
#[derive(Debug, Clone)]
pub struct RoutePaymentConfig {
    pub requirements: PaymentRequirements,
}

/// Deployment settings for the payment gate, read from the environment.
#[derive(Debug, Clone)]
pub struct PaymentGateConfig {
    pub facilitator_url: Url,
    pub hmac_secret: Option<Vec<u8>>,
    pub network: String,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
}

impl PaymentGateConfig {
    /// Read `FACILITATOR_URL`, `FACILITATOR_SHARED_SECRET`,
    /// `X402_INSECURE_NO_HMAC`, `NETWORK`, `RATE_LIMIT_RPM` and `ALLOWED_ORIGINS`.
    ///
    /// A missing shared secret is an error unless `X402_INSECURE_NO_HMAC` is set.
    pub fn from_env() -> Result<Self, X402Error> {
        let facilitator_url = std::env::var("FACILITATOR_URL")
            .unwrap_or_else(|_| "http://localhost:4022".to_string());
        let facilitator_url = Url::parse(&facilitator_url)
            .map_err(|e| X402Error::ConfigError(format!("invalid FACILITATOR_URL: {e}")))?;

        let hmac_secret = std::env::var("FACILITATOR_SHARED_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        let insecure_no_hmac = std::env::var("X402_INSECURE_NO_HMAC")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if hmac_secret.is_none() && !insecure_no_hmac {
            return Err(X402Error::ConfigError(
                "FACILITATOR_SHARED_SECRET is required. \
                 Set it to a secure random value (e.g. `openssl rand -hex 32`). \
                 For local development only, set X402_INSECURE_NO_HMAC=true to skip."
                    .to_string(),
            ));
        } else if hmac_secret.is_none() {
            tracing::warn!(
                "X402_INSECURE_NO_HMAC=true: facilitator requests will be UNAUTHENTICATED. \
                 DO NOT use this in production!"
            );
        }

        let network =
            std::env::var("NETWORK").unwrap_or_else(|_| NETWORK_BASE_SEPOLIA.to_string());

        let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(60);

        let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            facilitator_url,
            hmac_secret,
            network,
            rate_limit_rpm,
            allowed_origins,
        })
    }
}

/// Holds payment configuration for all protected routes.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfig {
    pub routes: HashMap<String, RoutePaymentConfig>,
}

/// Builder for constructing a `PaymentConfig` with multiple priced routes.
pub struct PaymentConfigBuilder {
    scheme: Box<dyn SchemeServer>,
    pay_to: Address,
    network: String,
    resource_base: Url,
    max_timeout_seconds: u64,
    routes: HashMap<String, RoutePaymentConfig>,
    error: Option<X402Error>,
}

impl PaymentConfigBuilder {
    /// Create a new builder. `scheme` converts prices into asset amounts on
    /// `network`; `resource_base` is the public URL the routes live under.
    pub fn new(
        scheme: impl SchemeServer + 'static,
        pay_to: Address,
        network: impl Into<String>,
        resource_base: Url,
    ) -> Self {
        Self {
            scheme: Box::new(scheme),
            pay_to,
            network: network.into(),
            resource_base,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            routes: HashMap::new(),
            error: None,
        }
    }

    /// `maxTimeoutSeconds` for routes registered after this call.
    pub fn max_timeout_seconds(mut self, secs: u64) -> Self {
        self.max_timeout_seconds = secs;
        self
    }

    /// Register a priced route (e.g. `route("GET", "/weather", "$0.001", Some("..."))`).
    ///
    /// `price` is a money string like `"$0.001"`. The first invalid route is
    /// reported by [`build`](Self::build).
    pub fn route(
        mut self,
        method: &str,
        path: &str,
        price: &str,
        description: Option<&str>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.requirements_for(path, price, description) {
            Ok(requirements) => {
                self.routes.insert(
                    route_key(method, path),
                    RoutePaymentConfig { requirements },
                );
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    fn requirements_for(
        &self,
        path: &str,
        price: &str,
        description: Option<&str>,
    ) -> Result<PaymentRequirements, X402Error> {
        let (amount, asset) = self.scheme.parse_price(price, &self.network)?;
        let resource = self
            .resource_base
            .join(path)
            .map_err(|e| X402Error::ConfigError(format!("invalid route path {path}: {e}")))?;

        let requirements = PaymentRequirements {
            scheme: SCHEME_EXACT.to_string(),
            network: self.network.clone(),
            max_amount_required: amount,
            resource,
            description: description.unwrap_or_default().to_string(),
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: self.pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset: asset.address,
            extra: Some(AssetExtra {
                name: asset.name,
                version: asset.eip712_version,
            }),
        };
        requirements.validate()?;
        Ok(requirements)
    }

    /// Consume the builder and produce a `PaymentConfig`.
    pub fn build(self) -> Result<PaymentConfig, X402Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(PaymentConfig {
                routes: self.routes,
            }),
        }
    }
}

impl PaymentConfig {
    /// Look up the payment config for a given route (e.g. `GET /weather`).
    pub fn get_route(&self, method: &str, path: &str) -> Option<&RoutePaymentConfig> {
        self.routes.get(&route_key(method, path))
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {path}", method.to_ascii_uppercase())
}
