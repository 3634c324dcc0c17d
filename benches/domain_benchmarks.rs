use criterion::{Criterion, criterion_group, criterion_main};
use escrow_disbursement_engine::app::{EligibilityEvaluator, calculate_backoff};
use escrow_disbursement_engine::infra::signature;
use escrow_disbursement_engine::test_utils::{
    bank_business, payable_transaction, verified_individual,
};
use rust_decimal_macros::dec;
use std::hint::black_box;

fn bench_eligibility(c: &mut Criterion) {
    let transaction = payable_transaction("tx-1", "pay-1", "biz-1", "acct-1", dec!(25000.00));
    let recipient = verified_individual("acct-1");
    let business = bank_business("biz-1");

    c.bench_function("evaluate_eligibility", |b| {
        b.iter(|| {
            EligibilityEvaluator.evaluate(
                black_box(&transaction),
                black_box(&recipient),
                black_box(&business),
            )
        })
    });
}

fn bench_signature(c: &mut Criterion) {
    let body = br#"{"event":"transfer.completed","data":{"reference":"DSB-0192","status":"SUCCESSFUL"}}"#;
    let sig = signature::sign(b"whsec", body);

    c.bench_function("verify_webhook_signature", |b| {
        b.iter(|| signature::verify(b"whsec", black_box(body), black_box(&sig)))
    });
}

fn bench_backoff(c: &mut Criterion) {
    c.bench_function("webhook_backoff_schedule", |b| {
        b.iter(|| (0..12).map(|t| calculate_backoff(black_box(t))).sum::<i64>())
    });
}

criterion_group!(benches, bench_eligibility, bench_signature, bench_backoff);
criterion_main!(benches);
