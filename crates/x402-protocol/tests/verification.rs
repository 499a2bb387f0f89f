use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use serde_json::json;

use x402::eip712::sign_authorization;
use x402::testing::MockChain;
use x402::{
    prepare_payment, prepare_payment_at, AssetDomain, AuthorizationPolicy, ErrorReason,
    ExactEvmAuthorization, ExactEvmFacilitator, Facilitator, FacilitatorEngine, NetworkRegistry,
    PaymentPayload, PaymentRequirements, SchemeFacilitator, X402Error,
};

const NOW: u64 = 1_700_000_000;

fn pay_to() -> Address {
    Address::repeat_byte(0xaa)
}

fn requirements(network: &str, amount: u64) -> PaymentRequirements {
    let registry = NetworkRegistry::default();
    let asset = registry.resolve(network).unwrap().asset.address;
    PaymentRequirements::from_value(json!({
        "scheme": "exact",
        "network": network,
        "maxAmountRequired": amount.to_string(),
        "resource": "https://api.example.com/weather",
        "description": "weather report",
        "mimeType": "application/json",
        "payTo": pay_to(),
        "maxTimeoutSeconds": 60,
        "asset": asset,
        "extra": { "name": "USDC", "version": "2" }
    }))
    .unwrap()
}

fn domain_for(req: &PaymentRequirements) -> AssetDomain {
    let registry = NetworkRegistry::default();
    let info = registry.resolve(&req.network).unwrap();
    AssetDomain {
        name: info.asset.name.clone(),
        version: "2".to_string(),
        chain_id: info.chain_id,
        verifying_contract: req.asset,
    }
}

async fn sign(
    signer: &PrivateKeySigner,
    req: &PaymentRequirements,
    now: Option<u64>,
    mutate: impl FnOnce(&mut ExactEvmAuthorization),
) -> PaymentPayload {
    let policy = AuthorizationPolicy::default();
    let mut unsigned = match now {
        Some(now) => prepare_payment_at(signer.address(), req, &policy, now),
        None => prepare_payment(signer.address(), req, &policy).unwrap(),
    };
    mutate(&mut unsigned.authorization);
    let signature = sign_authorization(signer, &unsigned.authorization, &domain_for(req))
        .await
        .unwrap();
    unsigned.into_signed(signature)
}

struct Fixture {
    signer: PrivateKeySigner,
    chain: Arc<MockChain>,
    facilitator: ExactEvmFacilitator<Arc<MockChain>>,
}

fn fixture(network: &str, balance: u64) -> Fixture {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(balance)));
    let facilitator = ExactEvmFacilitator::new(
        network,
        Arc::new(NetworkRegistry::default()),
        Arc::clone(&chain),
    );
    Fixture {
        signer,
        chain,
        facilitator,
    }
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_verify_accepts_exact_payment() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(resp.is_valid, "{resp:?}");
    assert_eq!(resp.invalid_reason, None);
    assert_eq!(resp.payer_address, Some(f.signer.address()));
}

#[tokio::test]
async fn test_verify_rejects_underpayment() {
    let f = fixture("base-sepolia", 1_000_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |a| a.value = U256::from(5_000u64)).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
}

#[tokio::test]
async fn test_verify_rejects_zero_balance() {
    let f = fixture("base-sepolia", 0);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InsufficientFunds));
    assert_eq!(resp.payer_address, Some(f.signer.address()));
}

#[tokio::test]
async fn test_verify_time_window_edges() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    // validAfter = NOW - 5, validBefore = NOW + 60
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let cases = [
        (NOW - 6, false),  // not yet valid
        (NOW - 5, true),   // validAfter == now
        (NOW + 54, true),  // validBefore == now + 6
        (NOW + 55, false), // expiring inside the margin
        (NOW + 120, false),
    ];
    for (now, expected) in cases {
        let resp = f.facilitator.verify_at(&payload, &req, now).await.unwrap();
        assert_eq!(resp.is_valid, expected, "now = NOW{:+}", now as i64 - NOW as i64);
        if !expected {
            assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
        }
    }
}

#[tokio::test]
async fn test_verify_rejects_any_signature_byte_flip() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    for i in 0..payload.payload.signature.len() {
        let mut tampered = payload.clone();
        let mut bytes = tampered.payload.signature.to_vec();
        bytes[i] ^= 0x01;
        tampered.payload.signature = Bytes::from(bytes);

        let resp = f.facilitator.verify_at(&tampered, &req, NOW).await.unwrap();
        assert!(!resp.is_valid, "byte {i} flip accepted");
        assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
    }
}

#[tokio::test]
async fn test_verify_rejects_authorization_field_changes() {
    let f = fixture("base-sepolia", 1_000_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let mutations: Vec<(&str, Box<dyn Fn(&mut ExactEvmAuthorization)>)> = vec![
        ("value", Box::new(|a: &mut ExactEvmAuthorization| a.value += U256::from(1u64))),
        ("to", Box::new(|a: &mut ExactEvmAuthorization| a.to = Address::repeat_byte(0xbb))),
        ("from", Box::new(|a: &mut ExactEvmAuthorization| a.from = Address::repeat_byte(0xcc))),
        ("validAfter", Box::new(|a: &mut ExactEvmAuthorization| a.valid_after -= 1)),
        ("validBefore", Box::new(|a: &mut ExactEvmAuthorization| a.valid_before += 1)),
        ("nonce", Box::new(|a: &mut ExactEvmAuthorization| a.nonce = B256::repeat_byte(0x01))),
    ];
    for (field, mutate) in mutations {
        let mut tampered = payload.clone();
        mutate(&mut tampered.payload.authorization);
        let resp = f.facilitator.verify_at(&tampered, &req, NOW).await.unwrap();
        assert!(!resp.is_valid, "changed {field} accepted");
    }
}

#[tokio::test]
async fn test_signature_check_runs_before_balance_lookup() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let mut payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;
    payload.payload.signature = Bytes::from(vec![0u8; 65]);

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(f.chain.balance_calls(), 0);
}

#[tokio::test]
async fn test_verify_rejects_foreign_asset() {
    let f = fixture("base-sepolia", 10_000);
    let mut req = requirements("base-sepolia", 10_000);
    req.asset = Address::repeat_byte(0x77);
    // Correctly signed for the foreign contract, so only the asset check fails.
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
    assert_eq!(f.chain.balance_calls(), 0);
}

#[tokio::test]
async fn test_verify_rejects_wrong_recipient() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |a| a.to = Address::repeat_byte(0xbb)).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
}

#[tokio::test]
async fn test_verify_rejects_wrong_version_and_scheme() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let mut wrong_version = payload.clone();
    wrong_version.x402_version = 2;
    let resp = f.facilitator.verify_at(&wrong_version, &req, NOW).await.unwrap();
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));

    let mut wrong_scheme = payload.clone();
    wrong_scheme.scheme = "upto".to_string();
    let resp = f.facilitator.verify_at(&wrong_scheme, &req, NOW).await.unwrap();
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidScheme));
}

#[tokio::test]
async fn test_verify_rejects_network_mismatch() {
    let f = fixture("base", 10_000);
    let req = requirements("base", 10_000);
    let sepolia_req = requirements("base-sepolia", 10_000);
    // Well-formed and correctly signed, but for the other network.
    let payload = sign(&f.signer, &sepolia_req, Some(NOW), |_| {}).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidNetwork));
}

#[tokio::test]
async fn test_verify_unreadable_asset_version_is_invalid_network() {
    let f = fixture("base-sepolia", 10_000);
    f.chain.fail_version_reads(true);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(!resp.is_valid);
    assert_eq!(resp.invalid_reason, Some(ErrorReason::InvalidNetwork));
    assert_eq!(f.chain.balance_calls(), 0);

    // Nothing was cached, so the next verify retries the lookup.
    f.chain.fail_version_reads(false);
    let resp = f.facilitator.verify_at(&payload, &req, NOW).await.unwrap();
    assert!(resp.is_valid, "{resp:?}");
}

#[tokio::test]
async fn test_asset_version_fetched_once_across_verifies() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, Some(NOW), |_| {}).await;

    for _ in 0..3 {
        assert!(f.facilitator.verify_at(&payload, &req, NOW).await.unwrap().is_valid);
    }
    assert_eq!(f.chain.version_calls(), 1);
}

// ---------------------------------------------------------------------------
// settle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_settle_success() {
    let f = fixture("base-sepolia", 10_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, None, |_| {}).await;

    let resp = f.facilitator.settle(&payload, &req).await.unwrap();
    assert!(resp.success, "{resp:?}");
    assert!(resp.transaction.starts_with("0x"));
    assert_eq!(resp.transaction.len(), 66);
    assert_eq!(resp.network, "base-sepolia");
    assert_eq!(resp.payer, Some(f.signer.address()));

    let submitted = f.chain.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].asset, req.asset);
    assert_eq!(submitted[0].authorization, payload.payload.authorization);
    assert_eq!(submitted[0].signature, payload.payload.signature);
}

#[tokio::test]
async fn test_settle_reverified_failure_submits_nothing() {
    let f = fixture("base-sepolia", 0);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, None, |_| {}).await;

    let resp = f.facilitator.settle(&payload, &req).await.unwrap();
    assert!(!resp.success);
    assert_eq!(resp.error_reason, Some(ErrorReason::InsufficientFunds));
    assert_eq!(resp.transaction, "");
    assert!(f.chain.submitted().is_empty());
}

#[tokio::test]
async fn test_settle_reverted_transaction_reports_hash() {
    let f = fixture("base-sepolia", 10_000);
    f.chain.revert_transfers(true);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, None, |_| {}).await;

    let resp = f.facilitator.settle(&payload, &req).await.unwrap();
    assert!(!resp.success);
    assert_eq!(resp.error_reason, Some(ErrorReason::InvalidScheme));
    assert!(resp.transaction.starts_with("0x"));
    assert_eq!(resp.network, "base-sepolia");
}

#[tokio::test]
async fn test_settle_same_authorization_twice_submits_once() {
    let f = fixture("base-sepolia", 1_000_000);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, None, |_| {}).await;

    assert!(f.facilitator.settle(&payload, &req).await.unwrap().success);
    let replay = f.facilitator.settle(&payload, &req).await.unwrap();
    assert!(!replay.success);
    assert_eq!(replay.error_reason, Some(ErrorReason::InvalidScheme));
    assert_eq!(replay.transaction, "");
    assert_eq!(f.chain.submitted().len(), 1);
}

#[tokio::test]
async fn test_settle_submit_error_propagates_and_keeps_nonce() {
    let f = fixture("base-sepolia", 1_000_000);
    f.chain.fail_submissions(true);
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&f.signer, &req, None, |_| {}).await;

    let err = f.facilitator.settle(&payload, &req).await.unwrap_err();
    assert!(matches!(err, X402Error::ChainError(_)));

    f.chain.fail_submissions(false);
    let retry = f.facilitator.settle(&payload, &req).await.unwrap();
    assert!(!retry.success);
    assert!(f.chain.submitted().is_empty());
}

// ---------------------------------------------------------------------------
// engine dispatch
// ---------------------------------------------------------------------------

fn engine(chain: Arc<MockChain>) -> FacilitatorEngine<Arc<MockChain>> {
    let registry = Arc::new(NetworkRegistry::default());
    FacilitatorEngine::new()
        .with_exact(ExactEvmFacilitator::new(
            "base",
            Arc::clone(&registry),
            Arc::clone(&chain),
        ))
        .with_exact(ExactEvmFacilitator::new("base-sepolia", registry, chain))
}

#[tokio::test]
async fn test_engine_end_to_end() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(10_000u64)));
    let engine = engine(Arc::clone(&chain));
    let req = requirements("base-sepolia", 10_000);
    let payload = sign(&signer, &req, None, |_| {}).await;

    let verdict = engine.verify(&payload, &req).await.unwrap();
    assert!(verdict.is_valid);

    let settled = engine.settle(&payload, &req).await.unwrap();
    assert!(settled.success);
    assert_eq!(settled.network, "base-sepolia");
    assert!(!settled.transaction.is_empty());
}

#[tokio::test]
async fn test_engine_never_verifies_cross_network_payload() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(10_000u64)));
    let engine = engine(chain);

    let accepts = [requirements("base", 10_000)];
    let payload = sign(&signer, &requirements("base-sepolia", 10_000), None, |_| {}).await;
    assert!(!accepts.iter().any(|r| payload.targets(r)));

    let verdict = engine.verify(&payload, &accepts[0]).await.unwrap();
    assert!(!verdict.is_valid);
    assert_eq!(verdict.invalid_reason, Some(ErrorReason::InvalidNetwork));
}

#[tokio::test]
async fn test_engine_dispatch_miss_is_invalid_scheme() {
    let signer = PrivateKeySigner::random();
    let engine = engine(Arc::new(MockChain::new()));
    let mut req = requirements("base", 10_000);
    let payload = sign(&signer, &req, None, |_| {}).await;

    req.network = "polygon".to_string();
    let verdict = engine.verify(&payload, &req).await.unwrap();
    assert_eq!(verdict.invalid_reason, Some(ErrorReason::InvalidScheme));

    let settled = engine.settle(&payload, &req).await.unwrap();
    assert!(!settled.success);
    assert_eq!(settled.error_reason, Some(ErrorReason::InvalidScheme));
    assert_eq!(settled.transaction, "");

    let supported = engine.supported().await.unwrap();
    assert!(supported.supports("exact", "base"));
    assert!(!supported.supports("exact", "polygon"));
}

#[tokio::test]
async fn test_verify_with_cancel() {
    let signer = PrivateKeySigner::random();
    let chain = Arc::new(MockChain::new().with_balance(signer.address(), U256::from(10_000u64)));
    let engine = engine(chain);
    let req = requirements("base", 10_000);
    let payload = sign(&signer, &req, None, |_| {}).await;

    let cancelled = engine
        .verify_with_cancel(&payload, &req, std::future::ready(()))
        .await;
    assert!(matches!(cancelled, Err(X402Error::Cancelled)));

    let verdict = engine
        .verify_with_cancel(&payload, &req, std::future::pending::<()>())
        .await
        .unwrap();
    assert!(verdict.is_valid);
}
