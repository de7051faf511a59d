// src/services/mod.rs

pub mod dispatch;
pub mod intasend;
pub mod ledger;
pub mod periods;
pub mod queue;
pub mod reconcile;
pub mod taxes;
