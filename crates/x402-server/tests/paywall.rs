//! The actix adapter end to end, backed by an in-process facilitator.

use std::sync::Arc;

use actix_web::{test, web, App, HttpRequest, HttpResponse};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use url::Url;

use x402::eip712::sign_authorization;
use x402::testing::MockChain;
use x402::{
    decode_settle_response, encode_payment, prepare_payment, AuthorizationPolicy,
    ExactEvmFacilitator, ExactEvmSchemeServer, FacilitatorClient, FacilitatorEngine,
    NetworkRegistry, PaymentRequiredBody, PaymentRequirements,
};
use x402_server::gate::VERIFY_UNAVAILABLE;
use x402_server::{require_payment, PaymentConfig, PaymentConfigBuilder, PaymentGate};

type Gate = PaymentGate<FacilitatorEngine<Arc<MockChain>>>;

struct TestState {
    gate: Gate,
    config: PaymentConfig,
}

fn weather_config(registry: Arc<NetworkRegistry>) -> PaymentConfig {
    PaymentConfigBuilder::new(
        ExactEvmSchemeServer::new(registry),
        Address::repeat_byte(0xaa),
        "base-sepolia",
        Url::parse("http://localhost:4021").unwrap(),
    )
    .route("GET", "/weather", "$0.01", Some("weather report"))
    .build()
    .unwrap()
}

fn state(chain: Arc<MockChain>) -> web::Data<TestState> {
    let registry = Arc::new(NetworkRegistry::default());
    let config = weather_config(registry.clone());

    web::Data::new(TestState {
        gate: PaymentGate::new(
            FacilitatorEngine::new()
                .with_exact(ExactEvmFacilitator::new("base-sepolia", registry, chain)),
        ),
        config,
    })
}

async fn handler(req: HttpRequest, state: web::Data<TestState>) -> HttpResponse {
    require_payment(&req, &state.config, &state.gate, || async {
        HttpResponse::Ok().json(serde_json::json!({ "weather": "sunny" }))
    })
    .await
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state)
                .route("/weather", web::get().to(handler))
                .route("/free", web::get().to(handler)),
        )
        .await
    };
}

async fn payment_header(signer: &PrivateKeySigner, req: &PaymentRequirements) -> String {
    let mut domain = NetworkRegistry::default()
        .resolve(&req.network)
        .unwrap()
        .asset_domain("2");
    domain.verifying_contract = req.asset;
    let unsigned = prepare_payment(signer.address(), req, &AuthorizationPolicy::default()).unwrap();
    let sig = sign_authorization(signer, &unsigned.authorization, &domain)
        .await
        .unwrap();
    encode_payment(&unsigned.into_signed(sig)).unwrap()
}

fn offered(state: &web::Data<TestState>) -> PaymentRequirements {
    state
        .config
        .get_route("GET", "/weather")
        .unwrap()
        .requirements
        .clone()
}

#[actix_rt::test]
async fn test_unpaid_request_gets_402_with_requirements() {
    let state = state(Arc::new(MockChain::new()));
    let expected = offered(&state);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/weather").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert_eq!(body.x402_version, 1);
    assert_eq!(body.error, "X-PAYMENT header is required");
    assert_eq!(body.accepts, vec![expected]);
}

#[actix_rt::test]
async fn test_paid_request_is_served_with_receipt() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(20_000u64)));
    let state = state(Arc::clone(&chain));
    let header = payment_header(&signer, &offered(&state)).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", header))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let receipt = resp
        .headers()
        .get("X-PAYMENT-RESPONSE")
        .expect("receipt header")
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(
        resp.headers().get("Access-Control-Expose-Headers").unwrap(),
        "X-PAYMENT-RESPONSE"
    );
    let settlement = decode_settle_response(&receipt).unwrap();
    assert!(settlement.success);
    assert_eq!(settlement.payer, Some(signer.address()));

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["weather"], "sunny");
    assert_eq!(chain.submitted().len(), 1);
}

#[actix_rt::test]
async fn test_reverted_settlement_downgrades_to_402() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(20_000u64)));
    chain.revert_transfers(true);
    let state = state(Arc::clone(&chain));
    let header = payment_header(&signer, &offered(&state)).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", header))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    assert!(resp.headers().get("X-PAYMENT-RESPONSE").is_none());
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert_eq!(body.error, "invalid_scheme");
}

#[actix_rt::test]
async fn test_underfunded_payer_is_rejected_before_handler() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(9_999u64)));
    let state = state(Arc::clone(&chain));
    let header = payment_header(&signer, &offered(&state)).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", header))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert_eq!(body.error, "insufficient_funds");
    assert_eq!(body.payer_address, Some(signer.address()));
    assert!(chain.submitted().is_empty());
}

#[actix_rt::test]
async fn test_garbage_header_is_402() {
    let app = app!(state(Arc::new(MockChain::new())));

    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", "bm90IGpzb24="))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert!(body.error.contains("malformed payload"));
    assert_eq!(body.accepts.len(), 1);
}

#[actix_rt::test]
async fn test_unpriced_route_passes_through() {
    let app = app!(state(Arc::new(MockChain::new())));

    let req = test::TestRequest::get().uri("/free").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn test_non_ascii_header_is_malformed_not_missing() {
    let app = app!(state(Arc::new(MockChain::new())));

    let value = actix_web::http::header::HeaderValue::from_bytes(b"\xff\xfe payment").unwrap();
    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", value))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert_ne!(body.error, "X-PAYMENT header is required");
    assert!(body.error.contains("malformed payload"));
}

struct RemoteState {
    gate: PaymentGate<FacilitatorClient>,
    config: PaymentConfig,
}

async fn remote_handler(req: HttpRequest, state: web::Data<RemoteState>) -> HttpResponse {
    require_payment(&req, &state.config, &state.gate, || async {
        HttpResponse::Ok().json(serde_json::json!({ "weather": "sunny" }))
    })
    .await
}

#[actix_rt::test]
async fn test_unreachable_facilitator_is_402_with_accepts() {
    // Nothing listens on the discard port.
    let facilitator = FacilitatorClient::new(Url::parse("http://127.0.0.1:9").unwrap())
        .unwrap()
        .with_hmac_secret(b"secret".to_vec());
    let state = web::Data::new(RemoteState {
        gate: PaymentGate::new(facilitator),
        config: weather_config(Arc::new(NetworkRegistry::default())),
    });
    let offered = state
        .config
        .get_route("GET", "/weather")
        .unwrap()
        .requirements
        .clone();
    let header = payment_header(&PrivateKeySigner::random(), &offered).await;
    let app = test::init_service(
        App::new()
            .app_data(state)
            .route("/weather", web::get().to(remote_handler)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/weather")
        .insert_header(("X-PAYMENT", header))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
    let body: PaymentRequiredBody = test::read_body_json(resp).await;
    assert_eq!(body.error, VERIFY_UNAVAILABLE);
    assert_eq!(body.accepts, vec![offered]);
}
