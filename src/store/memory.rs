// src/store/memory.rs
//
// In-memory store implementations behind the same ports as Postgres.
// Used by the test suite and the local simulation mode.

use super::{
    ActivityLog, ObligationSink, PayPeriodStore, RecordStore, TaxConfigStore, TransactionStore,
    WorkerDirectory,
};
use crate::errors::{AppError, AppResult};
use crate::models::{
    PayPeriod, PayPeriodStatus, PayrollRecord, PayrollStatus, PaymentStatus, RateShape, TaxType,
    Transaction, TransactionStatus, TransactionType, Worker,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

// ─── Pay periods ──────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct MemoryPayPeriodStore {
    periods: Arc<RwLock<HashMap<Uuid, PayPeriod>>>,
}

impl MemoryPayPeriodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayPeriodStore for MemoryPayPeriodStore {
    async fn insert(&self, period: PayPeriod) -> AppResult<PayPeriod> {
        let mut periods = self.periods.write().await;
        periods.insert(period.id, period.clone());
        Ok(period)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PayPeriod>> {
        Ok(self.periods.read().await.get(&id).cloned())
    }

    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<PayPeriod>> {
        let mut out: Vec<PayPeriod> = self
            .periods
            .read()
            .await
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| std::cmp::Reverse(p.start_date));
        Ok(out)
    }

    async fn find_overlapping(
        &self,
        owner_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> AppResult<Option<PayPeriod>> {
        Ok(self
            .periods
            .read()
            .await
            .values()
            .find(|p| p.owner_id == owner_id && Some(p.id) != exclude && p.overlaps(start, end))
            .cloned())
    }

    async fn update(&self, period: PayPeriod) -> AppResult<PayPeriod> {
        let mut periods = self.periods.write().await;
        if !periods.contains_key(&period.id) {
            return Err(AppError::NotFound(format!("Pay period {}", period.id)));
        }
        let mut period = period;
        period.updated_at = Utc::now();
        periods.insert(period.id, period.clone());
        Ok(period)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        from: &[PayPeriodStatus],
        to: PayPeriodStatus,
    ) -> AppResult<bool> {
        let mut periods = self.periods.write().await;
        match periods.get_mut(&id) {
            Some(p) if from.contains(&p.status) => {
                p.status = to;
                p.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Pay period {id}"))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.periods.write().await.remove(&id);
        Ok(())
    }
}

// ─── Payroll records ──────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<Uuid, PayrollRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<PayrollRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<PayrollRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.pay_period_id == pay_period_id)
            .cloned()
            .collect())
    }

    async fn find_by_period_and_worker(
        &self,
        pay_period_id: Uuid,
        worker_id: Uuid,
    ) -> AppResult<Option<PayrollRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.pay_period_id == pay_period_id && r.worker_id == worker_id)
            .cloned())
    }

    async fn save_draft_batch(
        &self,
        batch: Vec<PayrollRecord>,
    ) -> AppResult<Vec<PayrollRecord>> {
        // Validate the whole batch under the write lock before touching
        // anything, so a mid-batch conflict leaves the store unchanged.
        let mut records = self.records.write().await;
        for record in &batch {
            if let Some(existing) = records.get(&record.id) {
                if existing.status != PayrollStatus::Draft {
                    return Err(AppError::Conflict(format!(
                        "Payroll record for worker {} is already finalized and cannot be modified",
                        record.worker_id
                    )));
                }
            }
        }
        for record in &batch {
            records.insert(record.id, record.clone());
        }
        Ok(batch)
    }

    async fn update(&self, record: PayrollRecord) -> AppResult<PayrollRecord> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(AppError::NotFound(format!("Payroll record {}", record.id)));
        }
        let mut record = record;
        record.updated_at = Utc::now();
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn finalize_period_records(
        &self,
        pay_period_id: Uuid,
        finalized_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for record in records.values_mut() {
            if record.pay_period_id == pay_period_id && record.status == PayrollStatus::Draft {
                record.status = PayrollStatus::Finalized;
                record.finalized_at = Some(finalized_at);
                record.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reset_period_records(&self, pay_period_id: Uuid) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for record in records.values_mut() {
            if record.pay_period_id == pay_period_id {
                record.status = PayrollStatus::Draft;
                record.finalized_at = None;
                record.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_payment_status_if(
        &self,
        id: Uuid,
        allowed: &[PaymentStatus],
        to: PaymentStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(r) if allowed.contains(&r.payment_status) => {
                r.payment_status = to;
                if payment_date.is_some() {
                    r.payment_date = payment_date;
                }
                r.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Payroll record {id}"))),
        }
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct MemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.transactions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, tx: Transaction) -> AppResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_by_provider_ref(&self, provider_ref: &str) -> AppResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.provider_ref.as_deref() == Some(provider_ref))
            .cloned()
            .collect())
    }

    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.pay_period_id == pay_period_id)
            .cloned()
            .collect())
    }

    async fn find_by_record(&self, payroll_record_id: Uuid) -> AppResult<Vec<Transaction>> {
        let mut out: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.payroll_record_id == payroll_record_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.chunk_index);
        Ok(out)
    }

    async fn count_pending_for_period(&self, pay_period_id: Uuid) -> AppResult<i64> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| {
                t.pay_period_id == pay_period_id
                    && t.tx_type == TransactionType::SalaryPayout
                    && t.status == TransactionStatus::Pending
            })
            .count() as i64)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
    ) -> AppResult<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(t) if from.contains(&t.status) => {
                t.status = to;
                t.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Transaction {id}"))),
        }
    }
}

// ─── Collaborator doubles ─────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct MemoryWorkerDirectory {
    workers: Arc<RwLock<HashMap<Uuid, Worker>>>,
}

impl MemoryWorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, worker: Worker) {
        self.workers.write().await.insert(worker.id, worker);
    }
}

#[async_trait]
impl WorkerDirectory for MemoryWorkerDirectory {
    async fn get_worker(&self, id: Uuid) -> AppResult<Option<Worker>> {
        Ok(self.workers.read().await.get(&id).cloned())
    }
}

#[derive(Clone)]
struct TaxConfigRow {
    tax_type: TaxType,
    shape: RateShape,
    effective_from: NaiveDate,
    active: bool,
}

#[derive(Default, Clone)]
pub struct MemoryTaxConfigStore {
    rows: Arc<RwLock<Vec<TaxConfigRow>>>,
}

impl MemoryTaxConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, tax_type: TaxType, shape: RateShape, effective_from: NaiveDate) {
        self.rows.write().await.push(TaxConfigRow {
            tax_type,
            shape,
            effective_from,
            active: true,
        });
    }
}

#[async_trait]
impl TaxConfigStore for MemoryTaxConfigStore {
    async fn get_active(&self, tax_type: TaxType, as_of: NaiveDate) -> AppResult<Option<RateShape>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.tax_type == tax_type && r.active && r.effective_from <= as_of)
            .max_by_key(|r| r.effective_from)
            .map(|r| r.shape.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedObligation {
    pub owner_id: Uuid,
    pub tax_type: TaxType,
    pub amount: Decimal,
    pub period_year: i32,
    pub period_month: u32,
}

#[derive(Default, Clone)]
pub struct MemoryObligationSink {
    entries: Arc<RwLock<Vec<RecordedObligation>>>,
}

impl MemoryObligationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<RecordedObligation> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ObligationSink for MemoryObligationSink {
    async fn record_obligation(
        &self,
        owner_id: Uuid,
        tax_type: TaxType,
        amount: Decimal,
        period_year: i32,
        period_month: u32,
    ) -> AppResult<()> {
        self.entries.write().await.push(RecordedObligation {
            owner_id,
            tax_type,
            amount,
            period_year,
            period_month,
        });
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryActivityLog {
    entries: Arc<RwLock<Vec<(Uuid, String, String)>>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(Uuid, String, String)> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn log(
        &self,
        owner_id: Uuid,
        category: &str,
        message: &str,
        _metadata: serde_json::Value,
    ) -> AppResult<()> {
        self.entries
            .write()
            .await
            .push((owner_id, category.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_period() -> PayPeriod {
        PayPeriod {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "January 2025".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            pay_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            status: PayPeriodStatus::Draft,
            total_gross: dec!(0),
            total_net: dec!(0),
            total_tax: dec!(0),
            total_workers: 0,
            processed_workers: 0,
            processed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn conditional_period_update_is_a_noop_on_mismatch() {
        let store = MemoryPayPeriodStore::new();
        let period = store.insert(sample_period()).await.unwrap();

        let moved = store
            .update_status_if(period.id, &[PayPeriodStatus::Processing], PayPeriodStatus::Completed)
            .await
            .unwrap();
        assert!(!moved);
        assert_eq!(
            store.get(period.id).await.unwrap().unwrap().status,
            PayPeriodStatus::Draft
        );
    }

    #[tokio::test]
    async fn overlap_lookup_ignores_other_owners() {
        let store = MemoryPayPeriodStore::new();
        let period = store.insert(sample_period()).await.unwrap();

        let hit = store
            .find_overlapping(period.owner_id, period.start_date, period.end_date, None)
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = store
            .find_overlapping(Uuid::new_v4(), period.start_date, period.end_date, None)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn tax_config_lookup_picks_most_recent_effective_row() {
        let store = MemoryTaxConfigStore::new();
        let old = RateShape::Percentage {
            rate: dec!(0.015),
            min_amount: None,
        };
        let new = RateShape::Percentage {
            rate: dec!(0.02),
            min_amount: None,
        };
        store
            .push(TaxType::HousingLevy, old.clone(), NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
            .await;
        store
            .push(TaxType::HousingLevy, new.clone(), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())
            .await;

        let mid_2023 = store
            .get_active(TaxType::HousingLevy, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(mid_2023, Some(old));

        let late_2024 = store
            .get_active(TaxType::HousingLevy, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(late_2024, Some(new));
    }
}
