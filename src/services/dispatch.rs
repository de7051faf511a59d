// src/services/dispatch.rs
//
// Payout dispatcher. Runs off the job queue after a period is finalized:
// claims each eligible record, splits the net amount against the provider
// ceiling, initiates the transfers and records one transaction per chunk.
// Bank transfers settle synchronously; mobile-money transfers stay in flight
// until the reconciler hears back from the provider.

use crate::config::SettlementConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    PayPeriod, PayoutChannel, PayoutResult, PayoutSummary, PayrollRecord, PayrollStatus,
    PaymentStatus, Transaction, TransactionStatus, TransactionType, Worker,
};
use crate::services::queue::{Job, JobQueue};
use crate::store::{
    ActivityLog, PayPeriodStore, PaymentProvider, PayoutDestination, RecordStore, TransactionStore,
    WorkerDirectory,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct DispatchService {
    inner: Arc<DispatchInner>,
}

struct DispatchInner {
    periods: Arc<dyn PayPeriodStore>,
    records: Arc<dyn RecordStore>,
    transactions: Arc<dyn TransactionStore>,
    workers: Arc<dyn WorkerDirectory>,
    provider: Arc<dyn PaymentProvider>,
    activity: Arc<dyn ActivityLog>,
    queue: JobQueue,
    settlement: SettlementConfig,
}

impl DispatchService {
    pub fn new(
        periods: Arc<dyn PayPeriodStore>,
        records: Arc<dyn RecordStore>,
        transactions: Arc<dyn TransactionStore>,
        workers: Arc<dyn WorkerDirectory>,
        provider: Arc<dyn PaymentProvider>,
        activity: Arc<dyn ActivityLog>,
        queue: JobQueue,
        settlement: SettlementConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                periods,
                records,
                transactions,
                workers,
                provider,
                activity,
                queue,
                settlement,
            }),
        }
    }

    /// Dispatch payouts for every finalized record of the period that has
    /// not been paid yet. Records are processed in bounded-width batches;
    /// per-record failures land in the summary, never abort the run.
    pub async fn dispatch_period(&self, pay_period_id: Uuid) -> AppResult<PayoutSummary> {
        let period = self
            .inner
            .periods
            .get(pay_period_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pay period {pay_period_id}")))?;

        let mut summary = PayoutSummary::default();
        let mut eligible: Vec<PayrollRecord> = Vec::new();
        for record in self.inner.records.find_by_period(pay_period_id).await? {
            if record.status != PayrollStatus::Finalized {
                summary.failure_count += 1;
                summary
                    .results
                    .push(failure(&record, "Record is not finalized".to_string()));
                continue;
            }
            match record.payment_status {
                // Settled or in-flight records are successes, not re-sent.
                PaymentStatus::Paid | PaymentStatus::Processing => {
                    summary.success_count += 1;
                    summary.results.push(PayoutResult {
                        payroll_record_id: record.id,
                        worker_id: record.worker_id,
                        success: true,
                        tracking_id: None,
                        message: match record.payment_status {
                            PaymentStatus::Paid => "Already paid".to_string(),
                            _ => "Payment already in progress".to_string(),
                        },
                    });
                }
                PaymentStatus::ManualReview => {
                    summary.failure_count += 1;
                    summary
                        .results
                        .push(failure(&record, "Awaiting manual review".to_string()));
                }
                PaymentStatus::Pending | PaymentStatus::Failed => eligible.push(record),
            }
        }

        if eligible.is_empty() {
            warn!(pay_period_id = %pay_period_id, "No eligible records to dispatch");
            return Ok(summary);
        }

        info!(
            pay_period_id = %pay_period_id,
            records = eligible.len(),
            "Dispatching payouts"
        );

        for batch in eligible.chunks(self.inner.settlement.dispatch_batch_size) {
            let mut set = JoinSet::new();
            for record in batch.iter().cloned() {
                let inner = Arc::clone(&self.inner);
                let period = period.clone();
                set.spawn(async move { inner.dispatch_record(&period, record).await });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Some(result)) => {
                        if result.success {
                            summary.success_count += 1;
                        } else {
                            summary.failure_count += 1;
                        }
                        summary.results.push(result);
                    }
                    Ok(None) => {} // claimed by a concurrent dispatch
                    Err(e) => error!("Dispatch task panicked: {}", e),
                }
            }
        }

        if let Err(e) = self
            .inner
            .activity
            .log(
                period.owner_id,
                "payout_dispatch",
                &format!(
                    "Dispatched payouts for '{}': {} ok, {} failed",
                    period.name, summary.success_count, summary.failure_count
                ),
                json!({ "pay_period_id": pay_period_id }),
            )
            .await
        {
            warn!("Failed to write activity log: {}", e);
        }

        Ok(summary)
    }
}

impl DispatchInner {
    /// One record end to end. Returns `None` when another dispatcher already
    /// claimed the record.
    async fn dispatch_record(
        &self,
        period: &PayPeriod,
        record: PayrollRecord,
    ) -> Option<PayoutResult> {
        let claimed = match self
            .records
            .set_payment_status_if(
                record.id,
                &[PaymentStatus::Pending, PaymentStatus::Failed],
                PaymentStatus::Processing,
                None,
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(record_id = %record.id, "Failed to claim record: {}", e);
                return Some(failure(&record, format!("Claim failed: {e}")));
            }
        };
        if !claimed {
            return None;
        }

        match self.pay_record(period, &record).await {
            Ok(result) => Some(result),
            Err(e) => {
                // Chunks initiated before the error stay on the books as
                // pending transactions; the reconciler settles them.
                if let Err(mark) = self
                    .records
                    .set_payment_status_if(
                        record.id,
                        &[PaymentStatus::Processing],
                        PaymentStatus::Failed,
                        None,
                    )
                    .await
                {
                    error!(record_id = %record.id, "Failed to mark record failed: {}", mark);
                }
                warn!(record_id = %record.id, worker_id = %record.worker_id, "Payout failed: {}", e);
                Some(failure(&record, e.to_string()))
            }
        }
    }

    async fn pay_record(
        &self,
        period: &PayPeriod,
        record: &PayrollRecord,
    ) -> AppResult<PayoutResult> {
        if record.net_salary <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Net salary is not positive, nothing to pay out".to_string(),
            ));
        }

        let worker = self
            .workers
            .get_worker(record.worker_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Worker {}", record.worker_id)))?;
        let destination = destination_for(&worker)?;

        // Chunks initiated by earlier attempts stay initiated; only failed
        // transactions never moved money. Plan against the remainder so a
        // retry never re-sends a chunk that already left.
        let prior = self.transactions.find_by_record(record.id).await?;
        let live: Vec<&Transaction> = prior
            .iter()
            .filter(|t| t.status != TransactionStatus::Failed)
            .collect();
        let covered: Decimal = live.iter().map(|t| t.amount).sum();
        let outstanding = record.net_salary - covered;

        if outstanding <= Decimal::ZERO {
            if live.iter().all(|t| t.status == TransactionStatus::Success) {
                self.records
                    .set_payment_status_if(
                        record.id,
                        &[PaymentStatus::Processing],
                        PaymentStatus::Paid,
                        Some(Utc::now()),
                    )
                    .await?;
                return Ok(PayoutResult {
                    payroll_record_id: record.id,
                    worker_id: record.worker_id,
                    success: true,
                    tracking_id: None,
                    message: "Settled from an earlier attempt".to_string(),
                });
            }
            return Ok(PayoutResult {
                payroll_record_id: record.id,
                worker_id: record.worker_id,
                success: true,
                tracking_id: None,
                message: "Earlier payout still awaiting settlement".to_string(),
            });
        }

        let chunks = plan_chunks(outstanding, self.settlement.payout_limit);
        let is_split = chunks.len() > 1 || covered > Decimal::ZERO;
        let index_base = prior.len();
        let memo = format!("Salary payout - {}", period.name);

        let mut last_tracking_id = None;
        for (chunk_index, amount) in chunks.iter().enumerate() {
            // Chunks go out sequentially; the first provider rejection stops
            // the rest of the record's chunks.
            let ack = self
                .provider
                .initiate_payout(&destination, *amount, &self.settlement.currency, &memo)
                .await?;

            let status = match worker.payout_channel {
                PayoutChannel::Bank => TransactionStatus::Success,
                PayoutChannel::MobileMoney => TransactionStatus::Pending,
            };

            let now = Utc::now();
            let tx = self
                .transactions
                .insert(Transaction {
                    id: Uuid::new_v4(),
                    owner_id: record.owner_id,
                    worker_id: Some(record.worker_id),
                    pay_period_id: record.pay_period_id,
                    payroll_record_id: record.id,
                    amount: *amount,
                    currency: self.settlement.currency.clone(),
                    tx_type: TransactionType::SalaryPayout,
                    status,
                    provider_ref: Some(ack.tracking_id.clone()),
                    is_split,
                    chunk_index: (index_base + chunk_index) as i32,
                    snapshot_gross: record.total_earnings(),
                    snapshot_net: record.net_salary,
                    snapshot_tax: record.total_deductions,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            if worker.payout_channel == PayoutChannel::MobileMoney {
                self.queue.enqueue_delayed(
                    Job::CheckPayoutStatus {
                        pay_period_id: record.pay_period_id,
                        transaction_ids: vec![tx.id],
                        tracking_id: ack.tracking_id.clone(),
                        attempt: 1,
                    },
                    self.settlement.status_check_delay,
                );
            }

            last_tracking_id = Some(ack.tracking_id);
        }

        if worker.payout_channel == PayoutChannel::Bank {
            self.records
                .set_payment_status_if(
                    record.id,
                    &[PaymentStatus::Processing],
                    PaymentStatus::Paid,
                    Some(Utc::now()),
                )
                .await?;
        }

        Ok(PayoutResult {
            payroll_record_id: record.id,
            worker_id: record.worker_id,
            success: true,
            tracking_id: last_tracking_id,
            message: if is_split {
                format!("Initiated in {} chunks", chunks.len())
            } else {
                "Initiated".to_string()
            },
        })
    }
}

fn failure(record: &PayrollRecord, message: String) -> PayoutResult {
    PayoutResult {
        payroll_record_id: record.id,
        worker_id: record.worker_id,
        success: false,
        tracking_id: None,
        message,
    }
}

fn destination_for(worker: &Worker) -> AppResult<PayoutDestination> {
    match worker.payout_channel {
        PayoutChannel::MobileMoney => Ok(PayoutDestination::MobileMoney {
            phone_number: worker.phone_number.clone(),
        }),
        PayoutChannel::Bank => {
            let account = worker.bank_account.clone().ok_or_else(|| {
                AppError::Validation(format!("Worker {} has no bank account on file", worker.name))
            })?;
            let bank_code = worker.bank_code.clone().ok_or_else(|| {
                AppError::Validation(format!("Worker {} has no bank code on file", worker.name))
            })?;
            Ok(PayoutDestination::Bank {
                account,
                bank_code,
                name: worker.name.clone(),
            })
        }
    }
}

/// Split an amount into ceiling-sized chunks: every chunk is the provider
/// limit except the final remainder.
pub fn plan_chunks(total: Decimal, limit: Decimal) -> Vec<Decimal> {
    if limit <= Decimal::ZERO || total <= Decimal::ZERO {
        return vec![total];
    }
    let mut chunks = Vec::new();
    let mut remaining = total;
    while remaining > Decimal::ZERO {
        let chunk = remaining.min(limit);
        chunks.push(chunk);
        remaining -= chunk;
    }
    chunks
}
