// src/state.rs

use crate::config::Config;
use crate::errors::AppResult;
use crate::services::dispatch::DispatchService;
use crate::services::intasend::IntaSendService;
use crate::services::ledger::LedgerService;
use crate::services::periods::PeriodService;
use crate::services::queue::{Job, JobHandler, JobQueue};
use crate::services::reconcile::ReconcileService;
use crate::services::taxes::TaxEngine;
use crate::store::postgres::{
    PgActivityLog, PgObligationSink, PgPayPeriodStore, PgRecordStore, PgTaxConfigStore,
    PgTransactionStore, PgWorkerDirectory,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub intasend: Arc<IntaSendService>,
    pub ledger: Arc<LedgerService>,
    pub periods: Arc<PeriodService>,
    pub dispatch: DispatchService,
    pub reconcile: Arc<ReconcileService>,
    pub queue: JobQueue,
}

impl AppState {
    /// Wire the Postgres-backed service graph. Returns the state plus the
    /// job receiver for `spawn_workers`.
    pub fn new(db: PgPool, config: Config) -> (Self, mpsc::UnboundedReceiver<Job>) {
        let config = Arc::new(config);
        let (queue, job_rx) = JobQueue::new();

        let period_store = Arc::new(PgPayPeriodStore::new(db.clone()));
        let record_store = Arc::new(PgRecordStore::new(db.clone()));
        let tx_store = Arc::new(PgTransactionStore::new(db.clone()));
        let workers = Arc::new(PgWorkerDirectory::new(db.clone()));
        let tax_configs = Arc::new(PgTaxConfigStore::new(db.clone()));
        let obligations = Arc::new(PgObligationSink::new(db.clone()));
        let activity = Arc::new(PgActivityLog::new(db.clone()));

        let intasend = Arc::new(IntaSendService::new(Arc::clone(&config)));
        let taxes = Arc::new(TaxEngine::new(tax_configs));

        let ledger = Arc::new(LedgerService::new(
            period_store.clone(),
            record_store.clone(),
            workers.clone(),
            taxes,
            activity.clone(),
        ));
        let periods = Arc::new(PeriodService::new(
            period_store.clone(),
            record_store.clone(),
            obligations,
            activity.clone(),
            queue.clone(),
        ));
        let dispatch = DispatchService::new(
            period_store.clone(),
            record_store.clone(),
            tx_store.clone(),
            workers,
            intasend.clone(),
            activity.clone(),
            queue.clone(),
            config.settlement.clone(),
        );
        let reconcile = Arc::new(ReconcileService::new(
            period_store,
            record_store,
            tx_store,
            intasend.clone(),
            activity,
            queue.clone(),
            config.settlement.clone(),
        ));

        let state = Self {
            db,
            config,
            intasend,
            ledger,
            periods,
            dispatch,
            reconcile,
            queue,
        };
        (state, job_rx)
    }

    pub fn job_handler(&self) -> Arc<dyn JobHandler> {
        Arc::new(JobRouter {
            dispatch: self.dispatch.clone(),
            reconcile: Arc::clone(&self.reconcile),
        })
    }
}

/// Routes queue jobs to the service that owns them.
pub struct JobRouter {
    pub dispatch: DispatchService,
    pub reconcile: Arc<ReconcileService>,
}

#[async_trait]
impl JobHandler for JobRouter {
    async fn handle(&self, job: Job) -> AppResult<()> {
        match job {
            Job::DispatchPayouts {
                job_id,
                pay_period_id,
            } => {
                debug!(%job_id, %pay_period_id, "Running payout dispatch job");
                self.dispatch.dispatch_period(pay_period_id).await?;
                Ok(())
            }
            Job::CheckPayoutStatus {
                pay_period_id,
                transaction_ids,
                tracking_id,
                attempt,
            } => {
                self.reconcile
                    .check_payout_status(pay_period_id, &transaction_ids, &tracking_id, attempt)
                    .await
            }
        }
    }
}
