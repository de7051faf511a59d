// src/models/mod.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ─── Pay Period ───────────────────────────────────────────────────────────────

// sqlx 0.8: custom Postgres enums need #[sqlx(type_name = "...")] on the enum
// AND must be cast explicitly in queries with `field as "field: _"`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "pay_period_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayPeriodStatus {
    Draft,
    Active,
    Processing,
    Completed,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayPeriod {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pay_date: NaiveDate,
    pub status: PayPeriodStatus,
    pub total_gross: Decimal,
    pub total_net: Decimal,
    pub total_tax: Decimal,
    pub total_workers: i32,
    pub processed_workers: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayPeriod {
    /// Date-range intersection test used by the overlap guard.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }
}

// ─── Payroll Record ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payroll_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Draft,
    Finalized,
}

/// Payment lifecycle of a single record, independent of DRAFT/FINALIZED.
/// `ManualReview` is terminal for automation: the reconciler gave up and a
/// human has to resolve the payout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    ManualReview,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayrollRecord {
    pub id: Uuid,
    pub pay_period_id: Uuid,
    pub owner_id: Uuid,
    pub worker_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub gross_salary: Decimal,
    pub bonuses: Decimal,
    pub other_earnings: Decimal,
    pub other_deductions: Decimal,
    pub overtime_pay: Decimal,
    pub holiday_hours: Decimal,
    pub sunday_hours: Decimal,
    pub nssf: Decimal,
    pub shif: Decimal,
    pub housing_levy: Decimal,
    pub paye: Decimal,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
    pub status: PayrollStatus,
    pub payment_status: PaymentStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    pub fn total_earnings(&self) -> Decimal {
        self.gross_salary + self.bonuses + self.other_earnings + self.overtime_pay
    }

    pub fn tax_breakdown(&self) -> TaxBreakdown {
        TaxBreakdown {
            nssf: self.nssf,
            shif: self.shif,
            housing_levy: self.housing_levy,
            paye: self.paye,
            total_deductions: self.total_deductions,
        }
    }

    /// Overwrite the statutory breakdown and recompute net pay:
    /// `total earnings − (statutory deductions + other deductions)`.
    pub fn apply_breakdown(&mut self, breakdown: &TaxBreakdown) {
        self.nssf = breakdown.nssf;
        self.shif = breakdown.shif;
        self.housing_levy = breakdown.housing_levy;
        self.paye = breakdown.paye;
        self.total_deductions = breakdown.total_deductions;
        self.net_salary =
            self.total_earnings() - (breakdown.total_deductions + self.other_deductions);
    }
}

// ─── Tax Breakdown & Config ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxBreakdown {
    pub nssf: Decimal,
    pub shif: Decimal,
    pub housing_levy: Decimal,
    pub paye: Decimal,
    pub total_deductions: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "tax_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    Nssf,
    Shif,
    HousingLevy,
    Paye,
}

impl TaxType {
    pub const ALL: [TaxType; 4] = [
        TaxType::Nssf,
        TaxType::Shif,
        TaxType::HousingLevy,
        TaxType::Paye,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Nssf => "nssf",
            TaxType::Shif => "shif",
            TaxType::HousingLevy => "housing_levy",
            TaxType::Paye => "paye",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeBand {
    /// Upper bound of the band; `None` means the band is open-ended.
    pub limit: Option<Decimal>,
    pub rate: Decimal,
}

/// Rate shape held by the tax configuration store, one row per tax type.
/// Lookup is "most recent active config with effective_from <= as-of date".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateShape {
    Tiered {
        tier1_limit: Decimal,
        tier2_limit: Decimal,
        rate: Decimal,
    },
    Percentage {
        rate: Decimal,
        min_amount: Option<Decimal>,
    },
    Brackets {
        bands: Vec<PayeBand>,
        personal_relief: Decimal,
    },
}

// ─── Transactions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    SalaryPayout,
}

/// One payout, or one payout chunk when a net salary exceeds the provider
/// ceiling. `provider_ref` is the opaque join key the reconciler matches
/// webhooks and poll results against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub pay_period_id: Uuid,
    pub payroll_record_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub provider_ref: Option<String>,
    pub is_split: bool,
    pub chunk_index: i32,
    pub snapshot_gross: Decimal,
    pub snapshot_net: Decimal,
    pub snapshot_tax: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Workers (external directory view) ────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payout_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutChannel {
    MobileMoney,
    Bank,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "employment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    Fixed,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Worker {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub payout_channel: PayoutChannel,
    pub bank_account: Option<String>,
    pub bank_code: Option<String>,
    pub employment_type: EmploymentType,
    pub hourly_rate: Option<Decimal>,
    pub is_active: bool,
}

// ─── Request / Response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayPeriodRequest {
    pub owner_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pay_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePayPeriodRequest {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pay_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftItem {
    pub worker_id: Uuid,
    pub gross_salary: Decimal,
    #[serde(default)]
    pub bonuses: Option<Decimal>,
    #[serde(default)]
    pub other_earnings: Option<Decimal>,
    #[serde(default)]
    pub other_deductions: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveDraftRequest {
    pub items: Vec<DraftItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftItemUpdate {
    pub gross_salary: Option<Decimal>,
    pub bonuses: Option<Decimal>,
    pub other_earnings: Option<Decimal>,
    pub other_deductions: Option<Decimal>,
    pub holiday_hours: Option<Decimal>,
    pub sunday_hours: Option<Decimal>,
}

/// Per-record outcome of a dispatch run. Partial failure is reported in the
/// summary, never escalated to fail the whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct PayoutResult {
    pub payroll_record_id: Uuid,
    pub worker_id: Uuid,
    pub success: bool,
    pub tracking_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PayoutSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<PayoutResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResponse {
    pub pay_period_id: Uuid,
    pub job_id: Uuid,
    pub finalized_records: usize,
    pub total_net: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodStatistics {
    pub pay_period: PayPeriod,
    pub total_workers: usize,
    pub pending_payments: usize,
    pub processed_payments: usize,
    pub total_gross: Decimal,
    pub total_net: Decimal,
    pub total_tax: Decimal,
}

// ─── Provider wire types ──────────────────────────────────────────────────────

/// Inbound delivery notification. The provider reports state per tracking
/// reference; duplicates and unknown references are expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderWebhook {
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub challenge: Option<String>,
}

impl ProviderWebhook {
    /// The reconciliation join key: tracking id when present, invoice id
    /// otherwise.
    pub fn reference(&self) -> Option<&str> {
        self.tracking_id.as_deref().or(self.invoice_id.as_deref())
    }
}

/// Normalized provider-side status of a payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPayoutStatus {
    Completed,
    Failed,
    InFlight,
}

impl ProviderPayoutStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "completed" | "successful" => ProviderPayoutStatus::Completed,
            "failed" | "cancelled" => ProviderPayoutStatus::Failed,
            _ => ProviderPayoutStatus::InFlight,
        }
    }
}
