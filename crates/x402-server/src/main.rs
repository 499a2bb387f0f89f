use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use alloy::primitives::Address;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod routes;

use x402::{ExactEvmSchemeServer, FacilitatorClient, EXPOSE_HEADERS_HEADER, PAYMENT_HEADER};
use x402_server::{PaymentConfigBuilder, PaymentGate, PaymentGateConfig};

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allow_any_method()
        .allowed_headers(vec!["content-type", "authorization", PAYMENT_HEADER, EXPOSE_HEADERS_HEADER])
        .expose_headers(vec![x402::PAYMENT_RESPONSE_HEADER])
        .max_age(3600)
}

fn fail(message: impl std::fmt::Display) -> ! {
    tracing::error!("{message}");
    std::process::exit(1);
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

    let pay_to: Address = match std::env::var("PAY_TO") {
        Ok(addr) => addr
            .parse()
            .unwrap_or_else(|e| fail(format!("invalid PAY_TO: {e}"))),
        Err(_) => fail("PAY_TO environment variable is required"),
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4021);

    let gate_config = PaymentGateConfig::from_env().unwrap_or_else(|e| fail(e));

    let public_url = std::env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
    let resource_base =
        Url::parse(&public_url).unwrap_or_else(|e| fail(format!("invalid PUBLIC_URL: {e}")));

    let config = PaymentConfigBuilder::new(
        ExactEvmSchemeServer::default(),
        pay_to,
        gate_config.network.clone(),
        resource_base,
    )
    .route("GET", "/weather", "$0.001", Some("Current weather report"))
    .build()
    .unwrap_or_else(|e| fail(format!("invalid route configuration: {e}")));

    let mut facilitator = FacilitatorClient::new(gate_config.facilitator_url.clone())
        .unwrap_or_else(|e| fail(e));
    if let Some(secret) = &gate_config.hmac_secret {
        facilitator = facilitator.with_hmac_secret(secret.clone());
    }

    let state = web::Data::new(routes::ServerState {
        gate: PaymentGate::new(facilitator),
        config,
        network: gate_config.network.clone(),
    });

    let cors_origins = gate_config.allowed_origins.clone();

    tracing::info!("x402 resource server listening at http://localhost:{port}");
    tracing::info!("Facilitator: {}", gate_config.facilitator_url);
    tracing::info!("Paying to {pay_to} on {}", gate_config.network);
    tracing::info!("Endpoints: GET /weather ($0.001), GET /health, GET /metrics");
    tracing::info!("Rate limit: {} req/min per IP", gate_config.rate_limit_rpm);

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(gate_config.rate_limit_rpm)
        .finish()
        .unwrap_or_else(|| fail("failed to build rate limiter config"));

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .route("/weather", web::get().to(routes::weather))
            .route("/health", web::get().to(routes::health))
            .route("/metrics", web::get().to(routes::metrics_endpoint))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
