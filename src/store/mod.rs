// src/store/mod.rs
//
// Repository and collaborator ports. Services depend on these traits only;
// `postgres` backs the running service, `memory` backs the tests. Every write
// the reconciliation paths race on is expressed as a conditional update
// ("set to X only if currently one of Y") so the losing writer is a no-op.

use crate::errors::AppResult;
use crate::models::{
    PayPeriod, PayPeriodStatus, PayoutChannel, PayrollRecord, PaymentStatus,
    ProviderPayoutStatus, RateShape, TaxType, Transaction, TransactionStatus, Worker,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait PayPeriodStore: Send + Sync {
    async fn insert(&self, period: PayPeriod) -> AppResult<PayPeriod>;
    async fn get(&self, id: Uuid) -> AppResult<Option<PayPeriod>>;
    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<PayPeriod>>;
    /// First period for the owner whose date range intersects `[start, end]`,
    /// excluding `exclude` (used when updating an existing period).
    async fn find_overlapping(
        &self,
        owner_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> AppResult<Option<PayPeriod>>;
    async fn update(&self, period: PayPeriod) -> AppResult<PayPeriod>;
    /// Conditional status transition; returns false when the period was no
    /// longer in one of `from`.
    async fn update_status_if(
        &self,
        id: Uuid,
        from: &[PayPeriodStatus],
        to: PayPeriodStatus,
    ) -> AppResult<bool>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<PayrollRecord>>;
    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<PayrollRecord>>;
    async fn find_by_period_and_worker(
        &self,
        pay_period_id: Uuid,
        worker_id: Uuid,
    ) -> AppResult<Option<PayrollRecord>>;
    /// Upsert a whole draft batch as a single atomic unit: either every row
    /// lands or none does.
    async fn save_draft_batch(&self, records: Vec<PayrollRecord>)
    -> AppResult<Vec<PayrollRecord>>;
    async fn update(&self, record: PayrollRecord) -> AppResult<PayrollRecord>;
    /// Mark every DRAFT record of the period FINALIZED with a shared stamp.
    async fn finalize_period_records(
        &self,
        pay_period_id: Uuid,
        finalized_at: DateTime<Utc>,
    ) -> AppResult<u64>;
    /// Reopen: force every record of the period back to DRAFT.
    async fn reset_period_records(&self, pay_period_id: Uuid) -> AppResult<u64>;
    /// Conditional payment-status update; the losing writer of a
    /// webhook-vs-poll race sees `false` and backs off.
    async fn set_payment_status_if(
        &self,
        id: Uuid,
        allowed: &[PaymentStatus],
        to: PaymentStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: Transaction) -> AppResult<Transaction>;
    async fn get(&self, id: Uuid) -> AppResult<Option<Transaction>>;
    async fn find_by_provider_ref(&self, provider_ref: &str) -> AppResult<Vec<Transaction>>;
    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<Transaction>>;
    /// All chunks belonging to one payroll record.
    async fn find_by_record(&self, payroll_record_id: Uuid) -> AppResult<Vec<Transaction>>;
    /// Pending SALARY_PAYOUT transactions scoped to one period; drives the
    /// period auto-complete check.
    async fn count_pending_for_period(&self, pay_period_id: Uuid) -> AppResult<i64>;
    /// Conditional status transition; returns false when the transaction was
    /// already outside `from` (idempotent no-op for duplicate callbacks).
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
    ) -> AppResult<bool>;
}

// ─── External collaborators (interfaces only, per the system boundary) ────────

#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn get_worker(&self, id: Uuid) -> AppResult<Option<Worker>>;
}

#[async_trait]
pub trait TaxConfigStore: Send + Sync {
    /// Most recent active rate shape for the tax type with
    /// `effective_from <= as_of`, independently per tax type.
    async fn get_active(&self, tax_type: TaxType, as_of: NaiveDate) -> AppResult<Option<RateShape>>;
}

#[async_trait]
pub trait ObligationSink: Send + Sync {
    async fn record_obligation(
        &self,
        owner_id: Uuid,
        tax_type: TaxType,
        amount: Decimal,
        period_year: i32,
        period_month: u32,
    ) -> AppResult<()>;
}

/// Best-effort audit trail; callers log failures and move on.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn log(
        &self,
        owner_id: Uuid,
        category: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> AppResult<()>;
}

// ─── Payment provider port ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum PayoutDestination {
    MobileMoney {
        phone_number: String,
    },
    Bank {
        account: String,
        bank_code: String,
        name: String,
    },
}

impl PayoutDestination {
    pub fn channel(&self) -> PayoutChannel {
        match self {
            PayoutDestination::MobileMoney { .. } => PayoutChannel::MobileMoney,
            PayoutDestination::Bank { .. } => PayoutChannel::Bank,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutAck {
    /// Opaque reference assigned by the provider; reconciliation join key.
    pub tracking_id: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initiate_payout(
        &self,
        destination: &PayoutDestination,
        amount: Decimal,
        currency: &str,
        memo: &str,
    ) -> AppResult<PayoutAck>;

    async fn check_status(&self, tracking_id: &str) -> AppResult<ProviderPayoutStatus>;
}
