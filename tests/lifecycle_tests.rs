// Pay-period lifecycle: creation guards, status transitions, reopening and
// deletion rules.

mod common;

use chrono::NaiveDate;
use common::Harness;
use paydome::errors::AppError;
use paydome::models::{CreatePayPeriodRequest, PayPeriodStatus, PayrollStatus};
use paydome::services::queue::Job;
use paydome::store::{PayPeriodStore, RecordStore};
use rust_decimal_macros::dec;

fn period_request(h: &Harness, name: &str, start: (i32, u32, u32), end: (i32, u32, u32)) -> CreatePayPeriodRequest {
    CreatePayPeriodRequest {
        owner_id: h.owner_id,
        name: name.to_string(),
        start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
        end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        pay_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
    }
}

#[tokio::test]
async fn overlapping_periods_are_rejected_per_owner() {
    let h = Harness::new();
    h.periods
        .create(period_request(&h, "January", (2025, 1, 1), (2025, 1, 31)))
        .await
        .unwrap();

    // Overlaps by a single day.
    let err = h
        .periods
        .create(period_request(&h, "Overlap", (2025, 1, 31), (2025, 2, 27)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Adjacent-but-disjoint is fine.
    h.periods
        .create(period_request(&h, "February", (2025, 2, 1), (2025, 2, 28)))
        .await
        .unwrap();

    // Same dates under a different owner are fine too.
    let other = Harness::new();
    other
        .periods
        .create(period_request(&other, "January", (2025, 1, 1), (2025, 1, 31)))
        .await
        .unwrap();
}

#[tokio::test]
async fn inverted_date_ranges_are_rejected() {
    let h = Harness::new();
    let err = h
        .periods
        .create(period_request(&h, "Backwards", (2025, 1, 31), (2025, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The range must be strictly increasing; a zero-length period is no
    // period at all.
    let err = h
        .periods
        .create(period_request(&h, "Single Day", (2025, 1, 15), (2025, 1, 15)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn rescheduling_skips_the_overlap_check_against_itself() {
    let h = Harness::new();
    let period = h.create_january_period().await;

    // Shifting within its own range is fine; the period does not clash
    // with itself.
    let updated = h
        .periods
        .update(
            period.id,
            paydome::models::UpdatePayPeriodRequest {
                end_date: Some(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        updated.end_date,
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    );

    // But it still clashes with a sibling.
    h.periods
        .create(period_request(&h, "Late Jan", (2025, 1, 16), (2025, 1, 31)))
        .await
        .unwrap();
    let err = h
        .periods
        .update(
            period.id,
            paydome::models::UpdatePayPeriodRequest {
                end_date: Some(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn activation_only_applies_to_draft_periods() {
    let h = Harness::new();
    let period = h.create_january_period().await;

    let activated = h.periods.activate(period.id).await.unwrap();
    assert_eq!(activated.status, PayPeriodStatus::Active);

    let err = h.periods.activate(period.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn processing_an_empty_period_is_rejected() {
    let h = Harness::new();
    let period = h.create_january_period().await;
    let err = h.periods.process(period.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn a_processing_period_cannot_be_processed_again() {
    let h = Harness::new();
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("A", "254733000001").await;
    h.save_draft_for(period.id, &[(&worker, dec!(30000))]).await;

    h.periods.process(period.id).await.unwrap();

    let err = h.periods.process(period.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn completing_skips_straight_from_draft_is_rejected() {
    let h = Harness::new();
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("A", "254733000005").await;
    h.save_draft_for(period.id, &[(&worker, dec!(30000))]).await;

    // COMPLETED is only reachable from PROCESSING.
    let err = h.periods.complete(period.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    h.periods.process(period.id).await.unwrap();
    let response = h.periods.complete(period.id).await.unwrap();
    assert_eq!(response.finalized_records, 1);
}

#[tokio::test]
async fn completion_response_references_the_queued_job() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("A", "254733000006").await;
    h.save_draft_for(period.id, &[(&worker, dec!(30000))]).await;
    h.periods.process(period.id).await.unwrap();

    let response = h.periods.complete(period.id).await.unwrap();
    match h.next_job() {
        Job::DispatchPayouts {
            job_id,
            pay_period_id,
        } => {
            assert_eq!(job_id, response.job_id);
            assert_eq!(pay_period_id, period.id);
        }
        other => panic!("expected dispatch job, got {other:?}"),
    }
}

#[tokio::test]
async fn closing_is_allowed_from_any_status() {
    let h = Harness::new();
    let period = h.create_january_period().await;
    let closed = h.periods.close(period.id).await.unwrap();
    assert_eq!(closed.status, PayPeriodStatus::Closed);
}

#[tokio::test]
async fn reopening_a_closed_period_resets_records_to_draft() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;
    let worker = h.add_mobile_worker("A", "254733000002").await;
    h.save_draft_for(period.id, &[(&worker, dec!(30000))]).await;
    h.finalize_and_dispatch(period.id).await;
    h.periods.close(period.id).await.unwrap();

    // Processing from CLOSED reopens: the record drops back to DRAFT and is
    // re-finalized under a fresh stamp on completion.
    let reopened = h.periods.process(period.id).await.unwrap();
    assert_eq!(reopened.status, PayPeriodStatus::Processing);
    let records = h.record_store.find_by_period(period.id).await.unwrap();
    assert_eq!(records[0].status, PayrollStatus::Draft);

    let response = h.periods.complete(period.id).await.unwrap();
    assert_eq!(response.finalized_records, 1);
    let records = h.record_store.find_by_period(period.id).await.unwrap();
    assert_eq!(records[0].status, PayrollStatus::Finalized);
    let period = h.period_store.get(period.id).await.unwrap().unwrap();
    assert_eq!(period.status, PayPeriodStatus::Completed);
}

#[tokio::test]
async fn deletion_requires_an_empty_draft_period() {
    let h = Harness::new();
    let empty = h.create_january_period().await;
    h.periods.delete(empty.id).await.unwrap();
    assert!(h.period_store.get(empty.id).await.unwrap().is_none());

    let h = Harness::new();
    let with_records = h.create_january_period().await;
    let worker = h.add_mobile_worker("A", "254733000003").await;
    h.save_draft_for(with_records.id, &[(&worker, dec!(30000))])
        .await;
    let err = h.periods.delete(with_records.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let closed = h
        .periods
        .create(period_request(&h, "February", (2025, 2, 1), (2025, 2, 28)))
        .await
        .unwrap();
    h.periods.close(closed.id).await.unwrap();
    let err = h.periods.delete(closed.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn statistics_track_settlement_progress() {
    let mut h = Harness::new();
    let period = h.create_january_period().await;
    let mobile = h.add_mobile_worker("A", "254733000004").await;
    let bank = h.add_bank_worker("B", "0100000001").await;
    h.save_draft_for(period.id, &[(&mobile, dec!(30000)), (&bank, dec!(30000))])
        .await;
    h.finalize_and_dispatch(period.id).await;

    // Bank settled synchronously; the mobile payout is still in flight.
    let stats = h.periods.statistics(period.id).await.unwrap();
    assert_eq!(stats.total_workers, 2);
    assert_eq!(stats.processed_payments, 1);
    assert_eq!(stats.pending_payments, 1);
    assert_eq!(stats.total_gross, dec!(60000));
}
