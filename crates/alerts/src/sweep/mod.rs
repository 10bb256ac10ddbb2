//! Periodic sweeps over the persisted schedules
//!
//! - [`MissedAlertReconciler`] delivers triggers whose time passed unfired
//! - [`StaleScheduleCollector`] deletes schedules past the retention window

mod collector;
mod reconciler;

pub use collector::{CollectReport, StaleScheduleCollector};
pub use reconciler::{MissedAlertReconciler, ReconcileReport};
