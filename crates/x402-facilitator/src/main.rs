use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_facilitator::bootstrap::{self, BootstrapConfig, FacilitatorChain};
use x402_facilitator::routes;

fn parse_list(var: &str) -> Vec<String> {
    match std::env::var(var) {
        Ok(values) => values
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => vec![],
    }
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-facilitator-auth"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-facilitator-auth"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let private_key = match std::env::var("FACILITATOR_PRIVATE_KEY") {
        Ok(key) => key,
        Err(_) => {
            tracing::error!("FACILITATOR_PRIVATE_KEY environment variable is required");
            std::process::exit(1);
        }
    };

    let hmac_secret: Vec<u8> = match std::env::var("FACILITATOR_SHARED_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
    {
        Some(s) => {
            let bytes = s.into_bytes();
            if bytes.len() < 32 {
                tracing::warn!(
                    "FACILITATOR_SHARED_SECRET is only {} bytes (minimum 32 recommended); \
                     use `openssl rand -hex 32` to generate a secure secret",
                    bytes.len()
                );
            }
            bytes
        }
        None => {
            tracing::error!(
                "FACILITATOR_SHARED_SECRET is required. \
                 Set it to a secure random value (e.g. `openssl rand -hex 32`)."
            );
            std::process::exit(1);
        }
    };

    let metrics_token = std::env::var("METRICS_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.into_bytes());

    let mut network_names = parse_list("FACILITATOR_NETWORKS");
    if network_names.is_empty() {
        network_names.push(x402::NETWORK_BASE_SEPOLIA.to_string());
    }

    let mut networks = Vec::with_capacity(network_names.len());
    for network in network_names {
        match bootstrap::rpc_url_for(&network) {
            Some(rpc) => networks.push((network, rpc)),
            None => {
                tracing::error!(network = %network, "unsupported network in FACILITATOR_NETWORKS");
                std::process::exit(1);
            }
        }
    }

    let state = match bootstrap::bootstrap_facilitator(BootstrapConfig {
        private_key: &private_key,
        networks,
        hmac_secret,
        metrics_token,
    }) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to start facilitator");
            std::process::exit(1);
        }
    };

    let port: u16 = std::env::var("FACILITATOR_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4022);

    let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(120);

    let cors_origins = parse_list("ALLOWED_ORIGINS");

    tracing::info!("x402 Facilitator listening on port {port}");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");
    tracing::info!("  POST http://localhost:{port}/settle");

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("invalid RATE_LIMIT_RPM: {rate_limit_rpm}");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .configure(routes::configure::<FacilitatorChain>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
