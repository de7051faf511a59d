// src/services/ledger.rs
//
// Draft payroll ledger: batch draft saves, per-item edits with overtime
// recomputation, and period total upkeep. Finalized records are immutable
// through every path here.

use crate::errors::{AppError, AppResult};
use crate::models::{
    DraftItem, DraftItemUpdate, EmploymentType, PayPeriod, PayPeriodStatus, PayrollRecord,
    PayrollStatus, PaymentStatus, SaveDraftRequest, Worker,
};
use crate::services::taxes::TaxEngine;
use crate::store::{ActivityLog, PayPeriodStore, RecordStore, WorkerDirectory};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Standard monthly working hours used to derive an hourly rate for
/// fixed-salary workers when computing overtime.
const MONTHLY_WORK_HOURS: Decimal = dec!(208);
const HOLIDAY_MULTIPLIER: Decimal = dec!(1.5);
const SUNDAY_MULTIPLIER: Decimal = dec!(2.0);

pub struct LedgerService {
    periods: Arc<dyn PayPeriodStore>,
    records: Arc<dyn RecordStore>,
    workers: Arc<dyn WorkerDirectory>,
    taxes: Arc<TaxEngine>,
    activity: Arc<dyn ActivityLog>,
}

impl LedgerService {
    pub fn new(
        periods: Arc<dyn PayPeriodStore>,
        records: Arc<dyn RecordStore>,
        workers: Arc<dyn WorkerDirectory>,
        taxes: Arc<TaxEngine>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            periods,
            records,
            workers,
            taxes,
            activity,
        }
    }

    /// Save a batch of draft records for a period. The whole batch lands or
    /// none of it does; any finalized record in the way aborts the save.
    pub async fn save_draft(
        &self,
        pay_period_id: Uuid,
        request: SaveDraftRequest,
    ) -> AppResult<Vec<PayrollRecord>> {
        if request.items.is_empty() {
            return Err(AppError::Validation(
                "Draft batch must contain at least one item".to_string(),
            ));
        }

        let period = self.require_period(pay_period_id).await?;
        if matches!(
            period.status,
            PayPeriodStatus::Completed | PayPeriodStatus::Closed
        ) {
            return Err(AppError::Validation(format!(
                "Pay period '{}' is {:?} and no longer accepts drafts",
                period.name, period.status
            )));
        }

        let mut seen = HashSet::new();
        for item in &request.items {
            if !seen.insert(item.worker_id) {
                return Err(AppError::Validation(format!(
                    "Worker {} appears more than once in the batch",
                    item.worker_id
                )));
            }
        }

        let mut batch = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let worker = self.require_worker(&period, item.worker_id).await?;
            batch.push(self.build_record(&period, &worker, item).await?);
        }

        let saved = self.records.save_draft_batch(batch).await?;
        self.refresh_period_totals(pay_period_id).await?;

        info!(
            pay_period_id = %pay_period_id,
            records = saved.len(),
            "Saved draft payroll batch"
        );
        self.log_activity(
            period.owner_id,
            "payroll_draft",
            &format!("Saved {} draft records for '{}'", saved.len(), period.name),
            json!({ "pay_period_id": pay_period_id }),
        )
        .await;

        Ok(saved)
    }

    /// Edit one draft record. Overtime pay is recomputed from the stored
    /// holiday and Sunday hours whenever pay inputs change, and the statutory
    /// breakdown is recomputed from the resulting earnings.
    pub async fn update_draft_item(
        &self,
        pay_period_id: Uuid,
        worker_id: Uuid,
        update: DraftItemUpdate,
    ) -> AppResult<PayrollRecord> {
        let period = self.require_period(pay_period_id).await?;
        let mut record = self
            .records
            .find_by_period_and_worker(pay_period_id, worker_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No payroll record for worker {worker_id} in this period"
                ))
            })?;

        if record.status != PayrollStatus::Draft {
            return Err(AppError::Conflict(format!(
                "Payroll record for worker {worker_id} is finalized and cannot be edited"
            )));
        }

        let worker = self.require_worker(&period, worker_id).await?;

        for (label, value) in [
            ("Gross salary", update.gross_salary),
            ("Bonuses", update.bonuses),
            ("Other earnings", update.other_earnings),
            ("Other deductions", update.other_deductions),
        ] {
            if value.unwrap_or(Decimal::ZERO) < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "{label} cannot be negative"
                )));
            }
        }
        if let Some(gross) = update.gross_salary {
            record.gross_salary = gross;
        }
        if let Some(bonuses) = update.bonuses {
            record.bonuses = bonuses;
        }
        if let Some(other_earnings) = update.other_earnings {
            record.other_earnings = other_earnings;
        }
        if let Some(other_deductions) = update.other_deductions {
            record.other_deductions = other_deductions;
        }
        if let Some(holiday_hours) = update.holiday_hours {
            record.holiday_hours = holiday_hours;
        }
        if let Some(sunday_hours) = update.sunday_hours {
            record.sunday_hours = sunday_hours;
        }

        record.overtime_pay = overtime_pay(
            &worker,
            record.gross_salary,
            record.holiday_hours,
            record.sunday_hours,
        );

        let breakdown = self
            .taxes
            .compute(record.total_earnings(), period.pay_date)
            .await?;
        record.apply_breakdown(&breakdown);

        let updated = self.records.update(record).await?;
        self.refresh_period_totals(pay_period_id).await?;
        Ok(updated)
    }

    pub async fn list_records(&self, pay_period_id: Uuid) -> AppResult<Vec<PayrollRecord>> {
        self.require_period(pay_period_id).await?;
        self.records.find_by_period(pay_period_id).await
    }

    /// Recompute the period's aggregates by summation over its records.
    pub async fn refresh_period_totals(&self, pay_period_id: Uuid) -> AppResult<PayPeriod> {
        let mut period = self.require_period(pay_period_id).await?;
        let records = self.records.find_by_period(pay_period_id).await?;

        period.total_gross = records.iter().map(|r| r.total_earnings()).sum();
        period.total_net = records.iter().map(|r| r.net_salary).sum();
        period.total_tax = records.iter().map(|r| r.total_deductions).sum();
        period.total_workers = records.len() as i32;
        period.processed_workers = records
            .iter()
            .filter(|r| r.payment_status == PaymentStatus::Paid)
            .count() as i32;

        self.periods.update(period).await
    }

    async fn build_record(
        &self,
        period: &PayPeriod,
        worker: &Worker,
        item: &DraftItem,
    ) -> AppResult<PayrollRecord> {
        if item.gross_salary < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Gross salary for worker {} cannot be negative",
                worker.id
            )));
        }
        for (label, value) in [
            ("Bonuses", item.bonuses),
            ("Other earnings", item.other_earnings),
            ("Other deductions", item.other_deductions),
        ] {
            if value.unwrap_or(Decimal::ZERO) < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "{label} for worker {} cannot be negative",
                    worker.id
                )));
            }
        }

        // Re-use the existing row id on re-save so the batch upsert replaces
        // the previous draft instead of duplicating the worker.
        let existing = self
            .records
            .find_by_period_and_worker(period.id, worker.id)
            .await?;

        let now = Utc::now();
        let mut record = PayrollRecord {
            id: existing.as_ref().map(|r| r.id).unwrap_or_else(Uuid::new_v4),
            pay_period_id: period.id,
            owner_id: period.owner_id,
            worker_id: worker.id,
            period_start: period.start_date,
            period_end: period.end_date,
            gross_salary: item.gross_salary,
            bonuses: item.bonuses.unwrap_or(Decimal::ZERO),
            other_earnings: item.other_earnings.unwrap_or(Decimal::ZERO),
            other_deductions: item.other_deductions.unwrap_or(Decimal::ZERO),
            overtime_pay: Decimal::ZERO,
            holiday_hours: existing
                .as_ref()
                .map(|r| r.holiday_hours)
                .unwrap_or(Decimal::ZERO),
            sunday_hours: existing
                .as_ref()
                .map(|r| r.sunday_hours)
                .unwrap_or(Decimal::ZERO),
            nssf: Decimal::ZERO,
            shif: Decimal::ZERO,
            housing_levy: Decimal::ZERO,
            paye: Decimal::ZERO,
            total_deductions: Decimal::ZERO,
            net_salary: Decimal::ZERO,
            status: PayrollStatus::Draft,
            payment_status: existing
                .as_ref()
                .map(|r| r.payment_status)
                .unwrap_or(PaymentStatus::Pending),
            finalized_at: None,
            payment_date: existing.as_ref().and_then(|r| r.payment_date),
            created_at: existing.as_ref().map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        };

        record.overtime_pay = overtime_pay(
            worker,
            record.gross_salary,
            record.holiday_hours,
            record.sunday_hours,
        );

        let breakdown = self
            .taxes
            .compute(record.total_earnings(), period.pay_date)
            .await?;
        record.apply_breakdown(&breakdown);

        Ok(record)
    }

    async fn require_period(&self, id: Uuid) -> AppResult<PayPeriod> {
        self.periods
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pay period {id}")))
    }

    async fn require_worker(&self, period: &PayPeriod, worker_id: Uuid) -> AppResult<Worker> {
        let worker = self
            .workers
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Worker {worker_id}")))?;

        if worker.owner_id != period.owner_id {
            return Err(AppError::Validation(format!(
                "Worker {worker_id} does not belong to this payroll owner"
            )));
        }
        if !worker.is_active {
            return Err(AppError::Validation(format!(
                "Worker {} is inactive and cannot be added to payroll",
                worker.name
            )));
        }
        Ok(worker)
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

/// Overtime at 1.5x for public-holiday hours and 2x for Sunday hours. Hourly
/// workers use their stored rate; fixed-salary workers derive one from the
/// 208-hour statutory month.
fn overtime_pay(
    worker: &Worker,
    gross_salary: Decimal,
    holiday_hours: Decimal,
    sunday_hours: Decimal,
) -> Decimal {
    let hourly_rate = match worker.employment_type {
        EmploymentType::Hourly => worker.hourly_rate.unwrap_or(Decimal::ZERO),
        EmploymentType::Fixed => gross_salary / MONTHLY_WORK_HOURS,
    };

    let pay =
        hourly_rate * HOLIDAY_MULTIPLIER * holiday_hours + hourly_rate * SUNDAY_MULTIPLIER * sunday_hours;
    pay.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayoutChannel;

    fn worker(employment_type: EmploymentType, hourly_rate: Option<Decimal>) -> Worker {
        Worker {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Test Worker".to_string(),
            phone_number: "254700000000".to_string(),
            payout_channel: PayoutChannel::MobileMoney,
            bank_account: None,
            bank_code: None,
            employment_type,
            hourly_rate,
            is_active: true,
        }
    }

    #[test]
    fn fixed_worker_overtime_derives_rate_from_monthly_hours() {
        let w = worker(EmploymentType::Fixed, None);
        // 41600 / 208 = 200/hr; 4 holiday hours at 1.5x + 2 Sunday at 2x.
        let pay = overtime_pay(&w, dec!(41600), dec!(4), dec!(2));
        assert_eq!(pay, dec!(2000.00));
    }

    #[test]
    fn hourly_worker_overtime_uses_stored_rate() {
        let w = worker(EmploymentType::Hourly, Some(dec!(500)));
        let pay = overtime_pay(&w, dec!(0), dec!(2), dec!(1));
        assert_eq!(pay, dec!(2500.00));
    }

    #[test]
    fn overtime_rounds_to_cents() {
        let w = worker(EmploymentType::Fixed, None);
        // 50000 / 208 = 240.384615...; 1 holiday hour -> 360.576923...
        let pay = overtime_pay(&w, dec!(50000), dec!(1), dec!(0));
        assert_eq!(pay, dec!(360.58));
    }
}
