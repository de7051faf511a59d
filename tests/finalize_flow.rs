// End-to-end finalization: draft -> finalize -> dispatch -> webhook
// settlement -> period completion.

mod common;

use common::Harness;
use paydome::config::SettlementConfig;
use paydome::models::{
    PayPeriodStatus, PayrollStatus, PaymentStatus, ProviderWebhook, TaxType, TransactionStatus,
};
use paydome::store::{PayPeriodStore, RecordStore, TransactionStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn webhook(tracking_id: &str, state: &str) -> ProviderWebhook {
    ProviderWebhook {
        tracking_id: Some(tracking_id.to_string()),
        invoice_id: None,
        state: state.to_string(),
        value: None,
        challenge: None,
    }
}

#[tokio::test]
async fn january_period_settles_end_to_end() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;

    let wanjiku = h.add_mobile_worker("Wanjiku", "254711000001").await;
    let otieno = h.add_mobile_worker("Otieno", "254711000002").await;
    let njeri = h.add_bank_worker("Njeri", "0102030405").await;

    h.save_draft_for(
        period.id,
        &[(&wanjiku, dec!(50000)), (&otieno, dec!(80000)), (&njeri, dec!(30000))],
    )
    .await;

    h.finalize_and_dispatch(period.id).await;

    // Every record is finalized; the bank payout settled synchronously,
    // the mobile ones are in flight.
    let records = h.record_store.find_by_period(period.id).await.unwrap();
    assert!(records.iter().all(|r| r.status == PayrollStatus::Finalized));
    let bank_record = records.iter().find(|r| r.worker_id == njeri.id).unwrap();
    assert_eq!(bank_record.payment_status, PaymentStatus::Paid);
    assert!(bank_record.payment_date.is_some());
    for r in records.iter().filter(|r| r.worker_id != njeri.id) {
        assert_eq!(r.payment_status, PaymentStatus::Processing);
    }

    // complete() already moved the period to COMPLETED; settlement catches
    // up asynchronously.
    let mid_flight = h.period_store.get(period.id).await.unwrap().unwrap();
    assert_eq!(mid_flight.status, PayPeriodStatus::Completed);
    assert!(mid_flight.processed_at.is_some());

    // The provider confirms both mobile payouts.
    let initiated = h.provider.initiated().await;
    assert_eq!(initiated.len(), 3);
    let mobile_refs: Vec<String> = h
        .tx_store
        .find_by_period(period.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Pending)
        .filter_map(|t| t.provider_ref)
        .collect();
    assert_eq!(mobile_refs.len(), 2);
    for tracking_id in &mobile_refs {
        h.reconcile
            .handle_webhook(webhook(tracking_id, "COMPLETED"))
            .await
            .unwrap();
    }

    let done = h.period_store.get(period.id).await.unwrap().unwrap();
    assert_eq!(done.status, PayPeriodStatus::Completed);
    assert!(done.processed_at.is_some());
    assert_eq!(done.processed_workers, 3);

    let records = h.record_store.find_by_period(period.id).await.unwrap();
    assert!(records.iter().all(|r| r.payment_status == PaymentStatus::Paid));

    // Obligations were booked for every tax type under the pay month.
    let obligations = h.obligations.recorded().await;
    assert_eq!(obligations.len(), TaxType::ALL.len());
    assert!(obligations.iter().all(|o| o.period_year == 2025 && o.period_month == 2));
    let paye_total = obligations
        .iter()
        .find(|o| o.tax_type == TaxType::Paye)
        .unwrap()
        .amount;
    let record_paye: Decimal = records.iter().map(|r| r.paye).sum();
    assert_eq!(paye_total, record_paye);
}

#[tokio::test]
async fn net_above_the_provider_ceiling_is_split_into_chunks() {
    let mut h = Harness::with_settlement(SettlementConfig {
        payout_limit: dec!(10000),
        ..SettlementConfig::default()
    });
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("Kamau", "254711000009").await;

    h.save_draft_for(period.id, &[(&worker, dec!(50000))]).await;
    h.finalize_and_dispatch(period.id).await;

    let txs = h.tx_store.find_by_period(period.id).await.unwrap();
    let records = h.record_store.find_by_period(period.id).await.unwrap();
    let record = &records[0];

    assert!(txs.len() > 1);
    assert!(txs.iter().all(|t| t.is_split));
    assert!(txs.iter().all(|t| t.amount <= dec!(10000)));
    let total: Decimal = txs.iter().map(|t| t.amount).sum();
    assert_eq!(total, record.net_salary);

    // Settling all chunks but one keeps the record in flight.
    let mut refs: Vec<String> = txs.iter().filter_map(|t| t.provider_ref.clone()).collect();
    let last = refs.pop().unwrap();
    for tracking_id in &refs {
        h.reconcile
            .handle_webhook(webhook(tracking_id, "COMPLETED"))
            .await
            .unwrap();
    }
    let record = h.record_store.get(record.id).await.unwrap().unwrap();
    assert_eq!(record.payment_status, PaymentStatus::Processing);

    h.reconcile
        .handle_webhook(webhook(&last, "COMPLETED"))
        .await
        .unwrap();
    let record = h.record_store.get(record.id).await.unwrap().unwrap();
    assert_eq!(record.payment_status, PaymentStatus::Paid);

    let period = h.period_store.get(period.id).await.unwrap().unwrap();
    assert_eq!(period.status, PayPeriodStatus::Completed);
}

#[tokio::test]
async fn retry_after_a_mid_split_failure_sends_only_the_remainder() {
    let mut h = Harness::with_settlement(SettlementConfig {
        payout_limit: dec!(10000),
        ..SettlementConfig::default()
    });
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("Chebet", "254711000031").await;
    h.save_draft_for(period.id, &[(&worker, dec!(30000))]).await;

    h.periods.process(period.id).await.unwrap();
    h.periods.complete(period.id).await.unwrap();

    // The first chunk goes through, then the provider declines.
    h.provider.limit_initiations(1).await;
    h.run_dispatch_job(period.id).await;

    let records = h.record_store.find_by_period(period.id).await.unwrap();
    let record = &records[0];
    assert_eq!(record.payment_status, PaymentStatus::Failed);
    let sent_first: Decimal = h.provider.initiated().await.iter().map(|p| p.amount).sum();
    assert_eq!(sent_first, dec!(10000));

    // The retry only covers what is still owed; the total ever handed to
    // the provider equals the net exactly.
    h.provider.clear_initiation_limit().await;
    h.dispatch.dispatch_period(period.id).await.unwrap();
    let sent_total: Decimal = h.provider.initiated().await.iter().map(|p| p.amount).sum();
    assert_eq!(sent_total, record.net_salary);

    // Once every chunk settles the record converges to paid.
    let refs: Vec<String> = h
        .tx_store
        .find_by_period(period.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Pending)
        .filter_map(|t| t.provider_ref)
        .collect();
    for tracking_id in &refs {
        h.reconcile
            .handle_webhook(webhook(tracking_id, "COMPLETED"))
            .await
            .unwrap();
    }
    let record = h.record_store.get(record.id).await.unwrap().unwrap();
    assert_eq!(record.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn rejected_destination_fails_the_record_without_blocking_the_batch() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;
    let good = h.add_mobile_worker("Good", "254711000011").await;
    let bad = h.add_mobile_worker("Bad", "254711000012").await;
    h.provider.reject_account("254711000012").await;

    h.save_draft_for(period.id, &[(&good, dec!(40000)), (&bad, dec!(40000))])
        .await;
    h.periods.process(period.id).await.unwrap();
    h.periods.complete(period.id).await.unwrap();
    let job = h.next_job();
    let summary = match job {
        paydome::services::queue::Job::DispatchPayouts { pay_period_id, .. } => {
            h.dispatch.dispatch_period(pay_period_id).await.unwrap()
        }
        other => panic!("expected dispatch job, got {other:?}"),
    };

    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.failure_count, 1);

    let records = h.record_store.find_by_period(period.id).await.unwrap();
    let bad_record = records.iter().find(|r| r.worker_id == bad.id).unwrap();
    assert_eq!(bad_record.payment_status, PaymentStatus::Failed);

    // The surviving payout settles and the period still completes; the
    // failed record is left for a re-run.
    let tracking = h.provider.initiated().await[0].tracking_id.clone();
    h.reconcile
        .handle_webhook(webhook(&tracking, "COMPLETED"))
        .await
        .unwrap();
    let period = h.period_store.get(period.id).await.unwrap().unwrap();
    assert_eq!(period.status, PayPeriodStatus::Completed);
}

#[tokio::test]
async fn refinalizing_a_completed_period_redispatches_only_unpaid_records() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;
    let good = h.add_mobile_worker("Good", "254711000021").await;
    let flaky = h.add_mobile_worker("Flaky", "254711000022").await;
    h.provider.reject_account("254711000022").await;

    h.save_draft_for(period.id, &[(&good, dec!(35000)), (&flaky, dec!(35000))])
        .await;
    h.finalize_and_dispatch(period.id).await;

    let tracking = h.provider.initiated().await[0].tracking_id.clone();
    h.reconcile
        .handle_webhook(webhook(&tracking, "COMPLETED"))
        .await
        .unwrap();
    assert_eq!(
        h.period_store.get(period.id).await.unwrap().unwrap().status,
        PayPeriodStatus::Completed
    );

    // Second run after the destination recovers: only the failed record
    // goes out again.
    let before = h.provider.initiated().await.len();
    h.provider.allow_account("254711000022").await;
    h.finalize_and_dispatch(period.id).await;
    let after = h.provider.initiated().await;
    assert_eq!(after.len(), before + 1);
    assert_eq!(after.last().unwrap().account, "254711000022");

    let tracking = after.last().unwrap().tracking_id.clone();
    h.reconcile
        .handle_webhook(webhook(&tracking, "COMPLETED"))
        .await
        .unwrap();

    let records = h.record_store.find_by_period(period.id).await.unwrap();
    assert!(records.iter().all(|r| r.payment_status == PaymentStatus::Paid));
    assert_eq!(
        h.period_store.get(period.id).await.unwrap().unwrap().status,
        PayPeriodStatus::Completed
    );
}
