use criterion::{black_box, criterion_group, criterion_main, Criterion};
use msgauth_lib::canonical::canonicalize_value;
use msgauth_lib::crypto::base64url_encode;
use msgauth_lib::keystate::{InMemoryKeyStateStore, KeyStateStore};
use msgauth_lib::test_utils::alice;
use msgauth_protocol::nonce_store::ReplayLedger;
use msgauth_protocol::signing::{self, SigBlock};
use serde_json::json;

fn per_request_verification_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let identity = alice();
    let store = InMemoryKeyStateStore::new();
    rt.block_on(store.register(identity.key_state(0))).unwrap();

    let args = json!({"recipientAid": "Dbob", "ct": "YWJj"});
    let canonical_args = canonicalize_value(&args);
    let payload = format!("timestamp: 1000\nnonce: n1\nkeyId: {}\nargs: {canonical_args}", identity.aid);
    let sig_bytes = identity.sign(payload.as_bytes());
    let sig = SigBlock {
        signature: base64url_encode(&sig_bytes),
        timestamp: 1_000,
        nonce: "n1".to_string(),
        key_id: identity.aid.clone(),
        signed_fields: vec![],
    };
    let mut full_args = args.clone();
    full_args["sig"] = serde_json::to_value(&sig).unwrap();

    c.bench_function("verify_per_request", |b| {
        b.iter(|| {
            let ledger = ReplayLedger::new();
            rt.block_on(signing::verify_per_request(
                black_box(&full_args),
                black_box(&sig),
                "sig",
                &store,
                &ledger,
                1_000,
                300_000,
                600_000,
            ))
        })
    });
}

fn indexed_signature_counting_benchmark(c: &mut Criterion) {
    let identity = alice();
    let keys = vec![identity.signing_key.verifying_key().to_bytes()];
    let message = b"benchmark payload";
    let sig_bytes = identity.sign(message);
    let sigs = vec![format!("0-{}", base64url_encode(&sig_bytes))];

    c.bench_function("count_valid_indexed_signatures", |b| {
        b.iter(|| signing::count_valid_indexed_signatures(black_box(&sigs), black_box(&keys), black_box(message)))
    });
}

criterion_group!(benches, per_request_verification_benchmark, indexed_signature_counting_benchmark);
criterion_main!(benches);
