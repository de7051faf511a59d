// src/services/reconcile.rs
//
// Settlement reconciler. Two independent sources report payout outcomes:
// provider webhooks and the delayed status poll. Both funnel into the same
// conditional transaction transition, so whichever arrives first wins and
// the other is a no-op. A record is paid only when every one of its chunks
// has succeeded; the period completes when no pending payout transaction of
// that period remains.

use crate::config::SettlementConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    PayPeriodStatus, PaymentStatus, ProviderPayoutStatus, ProviderWebhook, Transaction,
    TransactionStatus,
};
use crate::services::queue::{Job, JobQueue};
use crate::store::{
    ActivityLog, PayPeriodStore, PaymentProvider, RecordStore, TransactionStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct ReconcileService {
    periods: Arc<dyn PayPeriodStore>,
    records: Arc<dyn RecordStore>,
    transactions: Arc<dyn TransactionStore>,
    provider: Arc<dyn PaymentProvider>,
    activity: Arc<dyn ActivityLog>,
    queue: JobQueue,
    settlement: SettlementConfig,
}

impl ReconcileService {
    pub fn new(
        periods: Arc<dyn PayPeriodStore>,
        records: Arc<dyn RecordStore>,
        transactions: Arc<dyn TransactionStore>,
        provider: Arc<dyn PaymentProvider>,
        activity: Arc<dyn ActivityLog>,
        queue: JobQueue,
        settlement: SettlementConfig,
    ) -> Self {
        Self {
            periods,
            records,
            transactions,
            provider,
            activity,
            queue,
            settlement,
        }
    }

    /// Apply a provider delivery notification. Unknown references and
    /// duplicate deliveries are expected and absorbed silently.
    pub async fn handle_webhook(&self, payload: ProviderWebhook) -> AppResult<()> {
        let Some(reference) = payload.reference() else {
            warn!("Webhook carried no tracking or invoice reference, ignoring");
            return Ok(());
        };

        let outcome = match ProviderPayoutStatus::from_provider(&payload.state) {
            ProviderPayoutStatus::Completed => TransactionStatus::Success,
            ProviderPayoutStatus::Failed => TransactionStatus::Failed,
            ProviderPayoutStatus::InFlight => {
                info!(reference, state = %payload.state, "Webhook reports in-flight state, waiting");
                return Ok(());
            }
        };

        let matched = self.transactions.find_by_provider_ref(reference).await?;
        if matched.is_empty() {
            warn!(reference, "Webhook references no known transaction");
            return Ok(());
        }

        let mut touched_periods = Vec::new();
        for tx in &matched {
            self.settle_transaction(tx, outcome).await?;
            if !touched_periods.contains(&tx.pay_period_id) {
                touched_periods.push(tx.pay_period_id);
            }
        }
        for pay_period_id in touched_periods {
            self.try_complete_period(pay_period_id).await?;
        }
        Ok(())
    }

    /// Manual poll trigger: look up every transaction carrying the tracking
    /// reference and run one status check immediately. An in-flight answer
    /// restarts the retry ladder from the first attempt.
    pub async fn reconcile_poll(&self, tracking_id: &str) -> AppResult<()> {
        let matched = self.transactions.find_by_provider_ref(tracking_id).await?;
        let Some(first) = matched.first() else {
            return Err(AppError::NotFound(format!(
                "No transaction with reference {tracking_id}"
            )));
        };
        let pay_period_id = first.pay_period_id;
        let transaction_ids: Vec<Uuid> = matched.iter().map(|t| t.id).collect();
        self.check_payout_status(pay_period_id, &transaction_ids, tracking_id, 1)
            .await
    }

    /// Safety-net poll for payouts the webhook has not settled. In-flight
    /// answers (and provider errors) re-enqueue the job until the attempt
    /// ceiling, after which the affected records are parked for manual
    /// review.
    pub async fn check_payout_status(
        &self,
        pay_period_id: Uuid,
        transaction_ids: &[Uuid],
        tracking_id: &str,
        attempt: u32,
    ) -> AppResult<()> {
        let mut unsettled = Vec::new();
        for id in transaction_ids {
            if let Some(tx) = self.transactions.get(*id).await? {
                if tx.status == TransactionStatus::Pending {
                    unsettled.push(tx);
                }
            }
        }
        if unsettled.is_empty() {
            // Webhook got here first.
            return Ok(());
        }

        let status = match self.provider.check_status(tracking_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(tracking_id, attempt, "Status lookup failed: {}", e);
                ProviderPayoutStatus::InFlight
            }
        };

        match status {
            ProviderPayoutStatus::Completed => {
                for tx in &unsettled {
                    self.settle_transaction(tx, TransactionStatus::Success).await?;
                }
                self.try_complete_period(pay_period_id).await?;
            }
            ProviderPayoutStatus::Failed => {
                for tx in &unsettled {
                    self.settle_transaction(tx, TransactionStatus::Failed).await?;
                }
                self.try_complete_period(pay_period_id).await?;
            }
            ProviderPayoutStatus::InFlight => {
                if attempt >= self.settlement.status_check_max_attempts {
                    self.park_for_manual_review(&unsettled, tracking_id).await?;
                    self.try_complete_period(pay_period_id).await?;
                } else {
                    self.queue.enqueue_delayed(
                        Job::CheckPayoutStatus {
                            pay_period_id,
                            transaction_ids: unsettled.iter().map(|t| t.id).collect(),
                            tracking_id: tracking_id.to_string(),
                            attempt: attempt + 1,
                        },
                        self.settlement.status_check_delay,
                    );
                }
            }
        }
        Ok(())
    }

    /// Flip one transaction to its terminal status and propagate to the
    /// owning record. Losing the conditional transition means someone else
    /// already settled this chunk; nothing further to do.
    async fn settle_transaction(
        &self,
        tx: &Transaction,
        outcome: TransactionStatus,
    ) -> AppResult<()> {
        let won = self
            .transactions
            .transition_status(tx.id, &[TransactionStatus::Pending], outcome)
            .await?;
        if !won {
            return Ok(());
        }

        match outcome {
            TransactionStatus::Failed => {
                self.records
                    .set_payment_status_if(
                        tx.payroll_record_id,
                        &[PaymentStatus::Processing],
                        PaymentStatus::Failed,
                        None,
                    )
                    .await?;
                warn!(
                    transaction_id = %tx.id,
                    payroll_record_id = %tx.payroll_record_id,
                    "Payout chunk failed at the provider"
                );
            }
            TransactionStatus::Success => {
                // Failed siblings are superseded attempts that never moved
                // money; the record is paid once the remaining chunks have
                // all succeeded and together cover the net.
                let siblings = self.transactions.find_by_record(tx.payroll_record_id).await?;
                let live: Vec<&Transaction> = siblings
                    .iter()
                    .filter(|s| s.status != TransactionStatus::Failed)
                    .collect();
                let covered: Decimal = live.iter().map(|s| s.amount).sum();
                let all_succeeded = live
                    .iter()
                    .all(|s| s.status == TransactionStatus::Success);
                if all_succeeded && covered >= tx.snapshot_net {
                    let paid = self
                        .records
                        .set_payment_status_if(
                            tx.payroll_record_id,
                            &[PaymentStatus::Processing],
                            PaymentStatus::Paid,
                            Some(Utc::now()),
                        )
                        .await?;
                    if paid {
                        info!(payroll_record_id = %tx.payroll_record_id, "Record fully paid");
                    }
                }
            }
            TransactionStatus::Pending => unreachable!("settle never targets pending"),
        }
        Ok(())
    }

    async fn park_for_manual_review(
        &self,
        transactions: &[Transaction],
        tracking_id: &str,
    ) -> AppResult<()> {
        for tx in transactions {
            // The transaction stays terminal-failed on our books; the real
            // outcome at the provider is unknown until a human checks.
            self.transactions
                .transition_status(tx.id, &[TransactionStatus::Pending], TransactionStatus::Failed)
                .await?;
            self.records
                .set_payment_status_if(
                    tx.payroll_record_id,
                    &[PaymentStatus::Processing, PaymentStatus::Failed],
                    PaymentStatus::ManualReview,
                    None,
                )
                .await?;
            error!(
                transaction_id = %tx.id,
                tracking_id,
                "Payout unresolved after {} status checks, parked for manual review",
                self.settlement.status_check_max_attempts
            );
            if let Err(e) = self
                .activity
                .log(
                    tx.owner_id,
                    "payout_manual_review",
                    "Payout unresolved after repeated status checks",
                    json!({ "transaction_id": tx.id, "tracking_id": tracking_id }),
                )
                .await
            {
                warn!("Failed to write activity log: {}", e);
            }
        }
        Ok(())
    }

    /// Run the period-completion check once no pending payout transaction
    /// of this period remains: a reopened (PROCESSING) period moves back to
    /// COMPLETED, and the paid-worker count is refreshed either way. The
    /// conditional transition keeps webhook/poll races idempotent.
    async fn try_complete_period(&self, pay_period_id: Uuid) -> AppResult<()> {
        let pending = self
            .transactions
            .count_pending_for_period(pay_period_id)
            .await?;
        if pending > 0 {
            return Ok(());
        }

        let moved = self
            .periods
            .update_status_if(
                pay_period_id,
                &[PayPeriodStatus::Processing],
                PayPeriodStatus::Completed,
            )
            .await?;

        if let Some(mut period) = self.periods.get(pay_period_id).await? {
            if period.status != PayPeriodStatus::Completed {
                return Ok(());
            }
            let records = self.records.find_by_period(pay_period_id).await?;
            period.processed_workers = records
                .iter()
                .filter(|r| r.payment_status == PaymentStatus::Paid)
                .count() as i32;
            let name = period.name.clone();
            let owner_id = period.owner_id;
            self.periods.update(period).await?;

            if moved {
                info!(pay_period_id = %pay_period_id, "Reopened pay period settled");
                if let Err(e) = self
                    .activity
                    .log(
                        owner_id,
                        "pay_period_completed",
                        &format!("All payouts settled for '{name}'"),
                        json!({ "pay_period_id": pay_period_id }),
                    )
                    .await
                {
                    warn!("Failed to write activity log: {}", e);
                }
            }
        }
        Ok(())
    }
}
