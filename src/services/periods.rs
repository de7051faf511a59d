// src/services/periods.rs
//
// Pay-period lifecycle: DRAFT -> ACTIVE -> PROCESSING -> COMPLETED -> CLOSED.
// CLOSED is reachable from any status. Processing a COMPLETED or CLOSED
// period reopens it: records drop back to DRAFT and are re-finalized under a
// fresh stamp on the next completion. Payout dispatch itself runs on the job
// queue; this service only flips statuses and hands the period over.

use crate::errors::{AppError, AppResult};
use crate::models::{
    CreatePayPeriodRequest, FinalizeResponse, PayPeriod, PayPeriodStatus, PaymentStatus,
    PeriodStatistics, TaxType,
};
use crate::services::queue::{Job, JobQueue};
use crate::store::{ActivityLog, ObligationSink, PayPeriodStore, RecordStore};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PeriodService {
    periods: Arc<dyn PayPeriodStore>,
    records: Arc<dyn RecordStore>,
    obligations: Arc<dyn ObligationSink>,
    activity: Arc<dyn ActivityLog>,
    queue: JobQueue,
}

impl PeriodService {
    pub fn new(
        periods: Arc<dyn PayPeriodStore>,
        records: Arc<dyn RecordStore>,
        obligations: Arc<dyn ObligationSink>,
        activity: Arc<dyn ActivityLog>,
        queue: JobQueue,
    ) -> Self {
        Self {
            periods,
            records,
            obligations,
            activity,
            queue,
        }
    }

    pub async fn create(&self, request: CreatePayPeriodRequest) -> AppResult<PayPeriod> {
        if request.start_date >= request.end_date {
            return Err(AppError::Validation(
                "Start date must be before end date".to_string(),
            ));
        }
        if request.pay_date < request.start_date {
            return Err(AppError::Validation(
                "Pay date must not precede the period start".to_string(),
            ));
        }

        if let Some(clash) = self
            .periods
            .find_overlapping(request.owner_id, request.start_date, request.end_date, None)
            .await?
        {
            return Err(AppError::Validation(format!(
                "Date range overlaps existing pay period '{}'",
                clash.name
            )));
        }

        let now = Utc::now();
        let period = self
            .periods
            .insert(PayPeriod {
                id: Uuid::new_v4(),
                owner_id: request.owner_id,
                name: request.name,
                start_date: request.start_date,
                end_date: request.end_date,
                pay_date: request.pay_date,
                status: PayPeriodStatus::Draft,
                total_gross: Decimal::ZERO,
                total_net: Decimal::ZERO,
                total_tax: Decimal::ZERO,
                total_workers: 0,
                processed_workers: 0,
                processed_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(pay_period_id = %period.id, name = %period.name, "Created pay period");
        Ok(period)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PayPeriod> {
        self.periods
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pay period {id}")))
    }

    pub async fn list(&self, owner_id: Uuid) -> AppResult<Vec<PayPeriod>> {
        self.periods.list(owner_id).await
    }

    /// Rename or reschedule a period that has not started processing. Date
    /// changes re-run the overlap guard against the owner's other periods.
    pub async fn update(
        &self,
        id: Uuid,
        request: crate::models::UpdatePayPeriodRequest,
    ) -> AppResult<PayPeriod> {
        let mut period = self.get(id).await?;
        if !matches!(
            period.status,
            PayPeriodStatus::Draft | PayPeriodStatus::Active
        ) {
            return Err(AppError::Validation(format!(
                "Pay period '{}' is {:?} and can no longer be edited",
                period.name, period.status
            )));
        }

        if let Some(name) = request.name {
            period.name = name;
        }
        if let Some(start_date) = request.start_date {
            period.start_date = start_date;
        }
        if let Some(end_date) = request.end_date {
            period.end_date = end_date;
        }
        if let Some(pay_date) = request.pay_date {
            period.pay_date = pay_date;
        }

        if period.start_date >= period.end_date {
            return Err(AppError::Validation(
                "Start date must be before end date".to_string(),
            ));
        }
        if let Some(clash) = self
            .periods
            .find_overlapping(
                period.owner_id,
                period.start_date,
                period.end_date,
                Some(period.id),
            )
            .await?
        {
            return Err(AppError::Validation(format!(
                "Date range overlaps existing pay period '{}'",
                clash.name
            )));
        }

        self.periods.update(period).await
    }

    /// DRAFT -> ACTIVE. Opens the period for draft entry in client UIs; any
    /// other starting status is rejected.
    pub async fn activate(&self, id: Uuid) -> AppResult<PayPeriod> {
        let moved = self
            .periods
            .update_status_if(id, &[PayPeriodStatus::Draft], PayPeriodStatus::Active)
            .await?;
        if !moved {
            let period = self.get(id).await?;
            return Err(AppError::Validation(format!(
                "Pay period '{}' is {:?} and cannot be activated",
                period.name, period.status
            )));
        }
        self.get(id).await
    }

    /// Move the period into PROCESSING with freshly aggregated totals.
    ///
    /// Allowed from DRAFT, ACTIVE, COMPLETED and CLOSED; the latter two are
    /// the reopen path, where every record drops back to DRAFT first. A
    /// period already PROCESSING is rejected.
    pub async fn process(&self, id: Uuid) -> AppResult<PayPeriod> {
        let period = self.get(id).await?;

        if period.status == PayPeriodStatus::Processing {
            return Err(AppError::Validation(format!(
                "Pay period '{}' is already processing",
                period.name
            )));
        }

        let reopening = matches!(
            period.status,
            PayPeriodStatus::Completed | PayPeriodStatus::Closed
        );
        if reopening {
            let reset = self.records.reset_period_records(id).await?;
            info!(pay_period_id = %id, records = reset, "Reopened pay period");
        }

        let records = self.records.find_by_period(id).await?;
        if records.is_empty() {
            return Err(AppError::Validation(format!(
                "Pay period '{}' has no payroll records to process",
                period.name
            )));
        }

        // Totals come from summation over the records, never incrementally.
        let mut period = period;
        period.total_gross = records.iter().map(|r| r.total_earnings()).sum();
        period.total_net = records.iter().map(|r| r.net_salary).sum();
        period.total_tax = records.iter().map(|r| r.total_deductions).sum();
        period.total_workers = records.len() as i32;
        period.processed_workers = records
            .iter()
            .filter(|r| r.payment_status == PaymentStatus::Paid)
            .count() as i32;
        period.status = PayPeriodStatus::Processing;
        period.processed_at = Some(Utc::now());
        let period = self.periods.update(period).await?;

        info!(
            pay_period_id = %id,
            total_net = %period.total_net,
            workers = period.total_workers,
            "Pay period processing"
        );
        Ok(period)
    }

    /// Finalize every record under a shared stamp, book the tax obligations,
    /// mark the period COMPLETED and queue payout dispatch. Only a
    /// PROCESSING period can complete; settlement then runs off the queue,
    /// with the reconciler re-completing the period if it is reopened while
    /// payouts are still in flight.
    pub async fn complete(&self, id: Uuid) -> AppResult<FinalizeResponse> {
        let period = self.get(id).await?;
        if period.status != PayPeriodStatus::Processing {
            return Err(AppError::Validation(format!(
                "Pay period '{}' is {:?} and cannot be completed",
                period.name, period.status
            )));
        }

        let finalized_at = Utc::now();
        let finalized = self
            .records
            .finalize_period_records(id, finalized_at)
            .await?;

        let records = self.records.find_by_period(id).await?;
        self.record_obligations(&period, &records).await;

        let mut period = period;
        period.status = PayPeriodStatus::Completed;
        let period = self.periods.update(period).await?;

        let job_id = Uuid::new_v4();
        self.queue.enqueue(Job::DispatchPayouts {
            job_id,
            pay_period_id: id,
        })?;

        info!(
            pay_period_id = %id,
            finalized,
            total_net = %period.total_net,
            "Pay period completed, dispatch queued"
        );
        self.log_activity(
            period.owner_id,
            "payroll_finalized",
            &format!(
                "Finalized '{}' with {} records, net {}",
                period.name, finalized, period.total_net
            ),
            json!({ "pay_period_id": id, "job_id": job_id }),
        )
        .await;

        Ok(FinalizeResponse {
            pay_period_id: id,
            job_id,
            finalized_records: records.len(),
            total_net: period.total_net,
        })
    }

    /// CLOSED is a hard stop reachable from any status. Closing does not
    /// cancel in-flight payouts; the reconciler keeps settling them.
    pub async fn close(&self, id: Uuid) -> AppResult<PayPeriod> {
        let mut period = self.get(id).await?;
        period.status = PayPeriodStatus::Closed;
        let period = self.periods.update(period).await?;

        self.log_activity(
            period.owner_id,
            "pay_period_closed",
            &format!("Closed pay period '{}'", period.name),
            json!({ "pay_period_id": id }),
        )
        .await;
        Ok(period)
    }

    /// Delete an empty DRAFT or ACTIVE period. Anything with records, or
    /// that ever started processing, is kept for the audit trail.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let period = self.get(id).await?;
        if !matches!(
            period.status,
            PayPeriodStatus::Draft | PayPeriodStatus::Active
        ) {
            return Err(AppError::Conflict(format!(
                "Pay period '{}' is {:?} and cannot be deleted",
                period.name, period.status
            )));
        }
        let records = self.records.find_by_period(id).await?;
        if !records.is_empty() {
            return Err(AppError::Conflict(format!(
                "Pay period '{}' has {} payroll records and cannot be deleted",
                period.name,
                records.len()
            )));
        }
        self.periods.delete(id).await
    }

    pub async fn statistics(&self, id: Uuid) -> AppResult<PeriodStatistics> {
        let period = self.get(id).await?;
        let records = self.records.find_by_period(id).await?;

        let processed = records
            .iter()
            .filter(|r| r.payment_status == PaymentStatus::Paid)
            .count();
        let pending = records
            .iter()
            .filter(|r| {
                matches!(
                    r.payment_status,
                    PaymentStatus::Pending | PaymentStatus::Processing
                )
            })
            .count();

        Ok(PeriodStatistics {
            total_workers: records.len(),
            pending_payments: pending,
            processed_payments: processed,
            total_gross: period.total_gross,
            total_net: period.total_net,
            total_tax: period.total_tax,
            pay_period: period,
        })
    }

    /// Aggregate statutory obligations per tax type for the remittance
    /// ledger, keyed on the pay date's calendar month. Best-effort: failures
    /// are logged, finalization proceeds.
    async fn record_obligations(&self, period: &PayPeriod, records: &[crate::models::PayrollRecord]) {
        let year = period.pay_date.year();
        let month = period.pay_date.month();

        for tax_type in TaxType::ALL {
            let amount: Decimal = records
                .iter()
                .map(|r| match tax_type {
                    TaxType::Nssf => r.nssf,
                    TaxType::Shif => r.shif,
                    TaxType::HousingLevy => r.housing_levy,
                    TaxType::Paye => r.paye,
                })
                .sum();

            if let Err(e) = self
                .obligations
                .record_obligation(period.owner_id, tax_type, amount, year, month)
                .await
            {
                warn!(
                    tax_type = tax_type.as_str(),
                    "Failed to record tax obligation: {}", e
                );
            }
        }
    }

    async fn log_activity(
        &self,
        owner_id: Uuid,
        category: &str,
        message: &str,
        metadata: serde_json::Value,
    ) {
        if let Err(e) = self.activity.log(owner_id, category, message, metadata).await {
            warn!("Failed to write activity log: {}", e);
        }
    }
}
