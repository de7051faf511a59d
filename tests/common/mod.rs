// tests/common/mod.rs

// Not every test file exercises every harness helper.
#![allow(dead_code)]

// Shared harness: the full service graph wired over the in-memory stores,
// with a scripted payment provider standing in for IntaSend. Jobs are not
// run by a worker pool here; tests pull them off the queue and drive the
// services by hand so every interleaving is explicit.

use async_trait::async_trait;
use chrono::NaiveDate;
use paydome::config::SettlementConfig;
use paydome::errors::{AppError, AppResult};
use paydome::models::{
    CreatePayPeriodRequest, DraftItem, EmploymentType, PayPeriod, PayoutChannel, PayrollRecord,
    ProviderPayoutStatus, SaveDraftRequest, Worker,
};
use paydome::services::dispatch::DispatchService;
use paydome::services::ledger::LedgerService;
use paydome::services::periods::PeriodService;
use paydome::services::queue::{Job, JobQueue};
use paydome::services::reconcile::ReconcileService;
use paydome::services::taxes::TaxEngine;
use paydome::store::memory::{
    MemoryActivityLog, MemoryObligationSink, MemoryPayPeriodStore, MemoryRecordStore,
    MemoryTaxConfigStore, MemoryTransactionStore, MemoryWorkerDirectory,
};
use paydome::store::{PaymentProvider, PayoutAck, PayoutDestination};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

// ─── Scripted provider ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InitiatedPayout {
    pub account: String,
    pub amount: Decimal,
    pub tracking_id: String,
}

#[derive(Default)]
pub struct FakeProvider {
    counter: AtomicUsize,
    rejected_accounts: Mutex<HashSet<String>>,
    statuses: Mutex<HashMap<String, ProviderPayoutStatus>>,
    initiated: Mutex<Vec<InitiatedPayout>>,
    budget: Mutex<Option<usize>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every initiation for this account will be rejected.
    pub async fn reject_account(&self, account: &str) {
        self.rejected_accounts.lock().await.insert(account.to_string());
    }

    pub async fn allow_account(&self, account: &str) {
        self.rejected_accounts.lock().await.remove(account);
    }

    /// Script what a status lookup for the tracking id returns.
    pub async fn set_status(&self, tracking_id: &str, status: ProviderPayoutStatus) {
        self.statuses
            .lock()
            .await
            .insert(tracking_id.to_string(), status);
    }

    pub async fn initiated(&self) -> Vec<InitiatedPayout> {
        self.initiated.lock().await.clone()
    }

    /// Allow only the next `n` initiations to succeed; further ones fail
    /// with a provider error until the limit is cleared.
    pub async fn limit_initiations(&self, n: usize) {
        *self.budget.lock().await = Some(n);
    }

    pub async fn clear_initiation_limit(&self) {
        *self.budget.lock().await = None;
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn initiate_payout(
        &self,
        destination: &PayoutDestination,
        amount: Decimal,
        _currency: &str,
        _memo: &str,
    ) -> AppResult<PayoutAck> {
        let account = match destination {
            PayoutDestination::MobileMoney { phone_number } => phone_number.clone(),
            PayoutDestination::Bank { account, .. } => account.clone(),
        };
        if self.rejected_accounts.lock().await.contains(&account) {
            return Err(AppError::Provider(format!(
                "Destination {account} rejected"
            )));
        }
        {
            let mut budget = self.budget.lock().await;
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(AppError::Provider("Transfer declined".to_string()));
                }
                *remaining -= 1;
            }
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let tracking_id = format!("TRK-{n:04}");
        self.initiated.lock().await.push(InitiatedPayout {
            account,
            amount,
            tracking_id: tracking_id.clone(),
        });
        Ok(PayoutAck { tracking_id })
    }

    async fn check_status(&self, tracking_id: &str) -> AppResult<ProviderPayoutStatus> {
        Ok(self
            .statuses
            .lock()
            .await
            .get(tracking_id)
            .cloned()
            .unwrap_or(ProviderPayoutStatus::InFlight))
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

pub struct Harness {
    pub owner_id: Uuid,
    pub periods: PeriodService,
    pub ledger: LedgerService,
    pub dispatch: DispatchService,
    pub reconcile: ReconcileService,
    pub queue: JobQueue,
    pub job_rx: mpsc::UnboundedReceiver<Job>,
    pub provider: Arc<FakeProvider>,
    pub period_store: MemoryPayPeriodStore,
    pub record_store: MemoryRecordStore,
    pub tx_store: MemoryTransactionStore,
    pub worker_dir: MemoryWorkerDirectory,
    pub obligations: MemoryObligationSink,
    pub settlement: SettlementConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settlement(SettlementConfig::default())
    }

    pub fn with_settlement(settlement: SettlementConfig) -> Self {
        let period_store = MemoryPayPeriodStore::new();
        let record_store = MemoryRecordStore::new();
        let tx_store = MemoryTransactionStore::new();
        let worker_dir = MemoryWorkerDirectory::new();
        let obligations = MemoryObligationSink::new();
        let activity = Arc::new(MemoryActivityLog::new());
        let provider = Arc::new(FakeProvider::new());
        let (queue, job_rx) = JobQueue::new();

        let periods_arc: Arc<dyn paydome::store::PayPeriodStore> = Arc::new(period_store.clone());
        let records_arc: Arc<dyn paydome::store::RecordStore> = Arc::new(record_store.clone());
        let txs_arc: Arc<dyn paydome::store::TransactionStore> = Arc::new(tx_store.clone());
        let workers_arc: Arc<dyn paydome::store::WorkerDirectory> = Arc::new(worker_dir.clone());
        let provider_arc: Arc<dyn PaymentProvider> = provider.clone();

        let taxes = Arc::new(TaxEngine::new(Arc::new(MemoryTaxConfigStore::new())));

        let ledger = LedgerService::new(
            periods_arc.clone(),
            records_arc.clone(),
            workers_arc.clone(),
            taxes,
            activity.clone(),
        );
        let periods = PeriodService::new(
            periods_arc.clone(),
            records_arc.clone(),
            Arc::new(obligations.clone()),
            activity.clone(),
            queue.clone(),
        );
        let dispatch = DispatchService::new(
            periods_arc.clone(),
            records_arc.clone(),
            txs_arc.clone(),
            workers_arc,
            provider_arc.clone(),
            activity.clone(),
            queue.clone(),
            settlement.clone(),
        );
        let reconcile = ReconcileService::new(
            periods_arc,
            records_arc,
            txs_arc,
            provider_arc,
            activity,
            queue.clone(),
            settlement.clone(),
        );

        Self {
            owner_id: Uuid::new_v4(),
            periods,
            ledger,
            dispatch,
            reconcile,
            queue,
            job_rx,
            provider,
            period_store,
            record_store,
            tx_store,
            worker_dir,
            obligations,
            settlement,
        }
    }

    pub async fn add_mobile_worker(&self, name: &str, phone: &str) -> Worker {
        let worker = Worker {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name: name.to_string(),
            phone_number: phone.to_string(),
            payout_channel: PayoutChannel::MobileMoney,
            bank_account: None,
            bank_code: None,
            employment_type: EmploymentType::Fixed,
            hourly_rate: None,
            is_active: true,
        };
        self.worker_dir.insert(worker.clone()).await;
        worker
    }

    pub async fn add_bank_worker(&self, name: &str, account: &str) -> Worker {
        let worker = Worker {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name: name.to_string(),
            phone_number: "254700000000".to_string(),
            payout_channel: PayoutChannel::Bank,
            bank_account: Some(account.to_string()),
            bank_code: Some("01".to_string()),
            employment_type: EmploymentType::Fixed,
            hourly_rate: None,
            is_active: true,
        };
        self.worker_dir.insert(worker.clone()).await;
        worker
    }

    pub async fn create_january_period(&self) -> PayPeriod {
        self.periods
            .create(CreatePayPeriodRequest {
                owner_id: self.owner_id,
                name: "January 2025".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
                pay_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            })
            .await
            .unwrap()
    }

    pub async fn save_draft_for(
        &self,
        pay_period_id: Uuid,
        workers: &[(&Worker, Decimal)],
    ) -> Vec<PayrollRecord> {
        let items = workers
            .iter()
            .map(|(worker, gross)| DraftItem {
                worker_id: worker.id,
                gross_salary: *gross,
                bonuses: None,
                other_earnings: None,
                other_deductions: None,
            })
            .collect();
        self.ledger
            .save_draft(pay_period_id, SaveDraftRequest { items })
            .await
            .unwrap()
    }

    /// Pop the next queued job, panicking if the queue is empty.
    pub fn next_job(&mut self) -> Job {
        self.job_rx
            .try_recv()
            .expect("expected a queued job")
    }

    /// Process and complete the period, then run the dispatch job the
    /// completion queues.
    pub async fn finalize_and_dispatch(&mut self, pay_period_id: Uuid) {
        self.periods.process(pay_period_id).await.unwrap();
        self.periods.complete(pay_period_id).await.unwrap();
        self.run_dispatch_job(pay_period_id).await;
    }

    pub async fn run_dispatch_job(&mut self, pay_period_id: Uuid) {
        match self.next_job() {
            Job::DispatchPayouts {
                pay_period_id: id, ..
            } => {
                assert_eq!(id, pay_period_id);
                self.dispatch.dispatch_period(id).await.unwrap();
            }
            other => panic!("expected dispatch job, got {other:?}"),
        }
    }
}
