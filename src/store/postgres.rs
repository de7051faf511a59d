// src/store/postgres.rs
//
// sqlx-backed implementations of the store ports. Queries use the runtime
// API (`query_as` + `FromRow`) so the crate builds without a live database.

use super::{
    ActivityLog, ObligationSink, PayPeriodStore, RecordStore, TaxConfigStore, TransactionStore,
    WorkerDirectory,
};
use crate::errors::{AppError, AppResult};
use crate::models::{
    PayPeriod, PayPeriodStatus, PayrollRecord, PayrollStatus, PaymentStatus, RateShape, TaxType,
    Transaction, TransactionStatus, Worker,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgPayPeriodStore {
    pool: PgPool,
}

impl PgPayPeriodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayPeriodStore for PgPayPeriodStore {
    async fn insert(&self, period: PayPeriod) -> AppResult<PayPeriod> {
        let row = sqlx::query_as::<_, PayPeriod>(
            r#"
            INSERT INTO pay_periods
                (id, owner_id, name, start_date, end_date, pay_date, status,
                 total_gross, total_net, total_tax, total_workers,
                 processed_workers, processed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(period.id)
        .bind(period.owner_id)
        .bind(&period.name)
        .bind(period.start_date)
        .bind(period.end_date)
        .bind(period.pay_date)
        .bind(period.status)
        .bind(period.total_gross)
        .bind(period.total_net)
        .bind(period.total_tax)
        .bind(period.total_workers)
        .bind(period.processed_workers)
        .bind(period.processed_at)
        .bind(period.created_at)
        .bind(period.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PayPeriod>> {
        let row = sqlx::query_as::<_, PayPeriod>("SELECT * FROM pay_periods WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self, owner_id: Uuid) -> AppResult<Vec<PayPeriod>> {
        let rows = sqlx::query_as::<_, PayPeriod>(
            "SELECT * FROM pay_periods WHERE owner_id = $1 ORDER BY start_date DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_overlapping(
        &self,
        owner_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> AppResult<Option<PayPeriod>> {
        let row = sqlx::query_as::<_, PayPeriod>(
            r#"
            SELECT * FROM pay_periods
            WHERE owner_id = $1
              AND start_date <= $3
              AND end_date >= $2
              AND ($4::uuid IS NULL OR id <> $4)
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update(&self, period: PayPeriod) -> AppResult<PayPeriod> {
        let row = sqlx::query_as::<_, PayPeriod>(
            r#"
            UPDATE pay_periods
            SET name = $2, start_date = $3, end_date = $4, pay_date = $5,
                status = $6, total_gross = $7, total_net = $8, total_tax = $9,
                total_workers = $10, processed_workers = $11, processed_at = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(period.id)
        .bind(&period.name)
        .bind(period.start_date)
        .bind(period.end_date)
        .bind(period.pay_date)
        .bind(period.status)
        .bind(period.total_gross)
        .bind(period.total_net)
        .bind(period.total_tax)
        .bind(period.total_workers)
        .bind(period.processed_workers)
        .bind(period.processed_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pay period {}", period.id)))?;
        Ok(row)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        from: &[PayPeriodStatus],
        to: PayPeriodStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pay_periods
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(from.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM pay_periods WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<PayrollRecord>> {
        let row =
            sqlx::query_as::<_, PayrollRecord>("SELECT * FROM payroll_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<PayrollRecord>> {
        let rows = sqlx::query_as::<_, PayrollRecord>(
            "SELECT * FROM payroll_records WHERE pay_period_id = $1 ORDER BY created_at",
        )
        .bind(pay_period_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_period_and_worker(
        &self,
        pay_period_id: Uuid,
        worker_id: Uuid,
    ) -> AppResult<Option<PayrollRecord>> {
        let row = sqlx::query_as::<_, PayrollRecord>(
            "SELECT * FROM payroll_records WHERE pay_period_id = $1 AND worker_id = $2",
        )
        .bind(pay_period_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_draft_batch(
        &self,
        records: Vec<PayrollRecord>,
    ) -> AppResult<Vec<PayrollRecord>> {
        // One transaction for the whole batch. Overwriting a finalized record
        // aborts everything, so a partial draft never lands.
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(records.len());

        for record in records {
            let existing = sqlx::query_as::<_, PayrollRecord>(
                "SELECT * FROM payroll_records WHERE id = $1 FOR UPDATE",
            )
            .bind(record.id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                if existing.status != PayrollStatus::Draft {
                    return Err(AppError::Conflict(format!(
                        "Payroll record for worker {} is already finalized and cannot be modified",
                        record.worker_id
                    )));
                }
            }

            let row = sqlx::query_as::<_, PayrollRecord>(
                r#"
                INSERT INTO payroll_records
                    (id, pay_period_id, owner_id, worker_id, period_start, period_end,
                     gross_salary, bonuses, other_earnings, other_deductions,
                     overtime_pay, holiday_hours, sunday_hours,
                     nssf, shif, housing_levy, paye, total_deductions, net_salary,
                     status, payment_status, finalized_at, payment_date,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                        $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
                ON CONFLICT (id) DO UPDATE SET
                    gross_salary = EXCLUDED.gross_salary,
                    bonuses = EXCLUDED.bonuses,
                    other_earnings = EXCLUDED.other_earnings,
                    other_deductions = EXCLUDED.other_deductions,
                    overtime_pay = EXCLUDED.overtime_pay,
                    holiday_hours = EXCLUDED.holiday_hours,
                    sunday_hours = EXCLUDED.sunday_hours,
                    nssf = EXCLUDED.nssf,
                    shif = EXCLUDED.shif,
                    housing_levy = EXCLUDED.housing_levy,
                    paye = EXCLUDED.paye,
                    total_deductions = EXCLUDED.total_deductions,
                    net_salary = EXCLUDED.net_salary,
                    updated_at = NOW()
                RETURNING *
                "#,
            )
            .bind(record.id)
            .bind(record.pay_period_id)
            .bind(record.owner_id)
            .bind(record.worker_id)
            .bind(record.period_start)
            .bind(record.period_end)
            .bind(record.gross_salary)
            .bind(record.bonuses)
            .bind(record.other_earnings)
            .bind(record.other_deductions)
            .bind(record.overtime_pay)
            .bind(record.holiday_hours)
            .bind(record.sunday_hours)
            .bind(record.nssf)
            .bind(record.shif)
            .bind(record.housing_levy)
            .bind(record.paye)
            .bind(record.total_deductions)
            .bind(record.net_salary)
            .bind(record.status)
            .bind(record.payment_status)
            .bind(record.finalized_at)
            .bind(record.payment_date)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(row);
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn update(&self, record: PayrollRecord) -> AppResult<PayrollRecord> {
        let row = sqlx::query_as::<_, PayrollRecord>(
            r#"
            UPDATE payroll_records
            SET gross_salary = $2, bonuses = $3, other_earnings = $4,
                other_deductions = $5, overtime_pay = $6, holiday_hours = $7,
                sunday_hours = $8, nssf = $9, shif = $10, housing_levy = $11,
                paye = $12, total_deductions = $13, net_salary = $14,
                status = $15, payment_status = $16, finalized_at = $17,
                payment_date = $18, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(record.gross_salary)
        .bind(record.bonuses)
        .bind(record.other_earnings)
        .bind(record.other_deductions)
        .bind(record.overtime_pay)
        .bind(record.holiday_hours)
        .bind(record.sunday_hours)
        .bind(record.nssf)
        .bind(record.shif)
        .bind(record.housing_levy)
        .bind(record.paye)
        .bind(record.total_deductions)
        .bind(record.net_salary)
        .bind(record.status)
        .bind(record.payment_status)
        .bind(record.finalized_at)
        .bind(record.payment_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Payroll record {}", record.id)))?;
        Ok(row)
    }

    async fn finalize_period_records(
        &self,
        pay_period_id: Uuid,
        finalized_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_records
            SET status = 'finalized', finalized_at = $2, updated_at = NOW()
            WHERE pay_period_id = $1 AND status = 'draft'
            "#,
        )
        .bind(pay_period_id)
        .bind(finalized_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reset_period_records(&self, pay_period_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_records
            SET status = 'draft', finalized_at = NULL, updated_at = NOW()
            WHERE pay_period_id = $1
            "#,
        )
        .bind(pay_period_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_payment_status_if(
        &self,
        id: Uuid,
        allowed: &[PaymentStatus],
        to: PaymentStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payroll_records
            SET payment_status = $2,
                payment_date = COALESCE($4, payment_date),
                updated_at = NOW()
            WHERE id = $1 AND payment_status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(allowed.to_vec())
        .bind(payment_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, tx: Transaction) -> AppResult<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions
                (id, owner_id, worker_id, pay_period_id, payroll_record_id,
                 amount, currency, tx_type, status, provider_ref, is_split,
                 chunk_index, snapshot_gross, snapshot_net, snapshot_tax,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.owner_id)
        .bind(tx.worker_id)
        .bind(tx.pay_period_id)
        .bind(tx.payroll_record_id)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.tx_type)
        .bind(tx.status)
        .bind(&tx.provider_ref)
        .bind(tx.is_split)
        .bind(tx.chunk_index)
        .bind(tx.snapshot_gross)
        .bind(tx.snapshot_net)
        .bind(tx.snapshot_tax)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_provider_ref(&self, provider_ref: &str) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE provider_ref = $1 ORDER BY chunk_index",
        )
        .bind(provider_ref)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_period(&self, pay_period_id: Uuid) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE pay_period_id = $1 ORDER BY created_at",
        )
        .bind(pay_period_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_record(&self, payroll_record_id: Uuid) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE payroll_record_id = $1 ORDER BY chunk_index",
        )
        .bind(payroll_record_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_pending_for_period(&self, pay_period_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE pay_period_id = $1 AND tx_type = 'salary_payout' AND status = 'pending'
            "#,
        )
        .bind(pay_period_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(from.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgWorkerDirectory {
    pool: PgPool,
}

impl PgWorkerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerDirectory for PgWorkerDirectory {
    async fn get_worker(&self, id: Uuid) -> AppResult<Option<Worker>> {
        let row = sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[derive(Clone)]
pub struct PgTaxConfigStore {
    pool: PgPool,
}

impl PgTaxConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaxConfigStore for PgTaxConfigStore {
    async fn get_active(&self, tax_type: TaxType, as_of: NaiveDate) -> AppResult<Option<RateShape>> {
        // The shape lives in a jsonb column; one row per (tax type,
        // effective_from), newest effective row wins.
        let raw: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT shape FROM tax_configs
            WHERE tax_type = $1 AND is_active = TRUE AND effective_from <= $2
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(tax_type)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;

        match raw {
            Some(value) => {
                let shape = serde_json::from_value(value).map_err(|e| {
                    AppError::Internal(format!(
                        "Malformed tax config for {}: {e}",
                        tax_type.as_str()
                    ))
                })?;
                Ok(Some(shape))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone)]
pub struct PgObligationSink {
    pool: PgPool,
}

impl PgObligationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObligationSink for PgObligationSink {
    async fn record_obligation(
        &self,
        owner_id: Uuid,
        tax_type: TaxType,
        amount: Decimal,
        period_year: i32,
        period_month: u32,
    ) -> AppResult<()> {
        // Re-finalizing a reopened period replaces the month's obligation
        // rather than stacking a second row.
        sqlx::query(
            r#"
            INSERT INTO tax_obligations
                (id, owner_id, tax_type, amount, period_year, period_month, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (owner_id, tax_type, period_year, period_month)
            DO UPDATE SET amount = EXCLUDED.amount, created_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(tax_type)
        .bind(amount)
        .bind(period_year)
        .bind(period_month as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgActivityLog {
    pool: PgPool,
}

impl PgActivityLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn log(
        &self,
        owner_id: Uuid,
        category: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, owner_id, category, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(category)
        .bind(message)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
