//! # Dialcast Engine
//!
//! The campaign scheduler and reconciliation engine. Everything with real
//! coordination lives here; the HTTP surfaces are thin shells around it.
//!
//! ## Architecture
//! ```text
//! DialScheduler (tokio interval, 1s tick)
//!   ├── WatchdogMonitor: waiting > 90s → forced no-answer write, reset
//!   ├── per campaign, 0-100ms jitter:
//!   │     OutboundSelector: next contact → agent check → makecall
//!   ├── shared token (lazy, refreshed on 401)
//!   ├── ActiveCallTracker: correlation queue vs. one snapshot per tick
//!   ├── ReconciliationEngine: match → calling; gone → ordered CRM writes
//!   └── broadcast: Vec<CampaignView> to every observer
//!
//! Background tasks (failure-isolated):
//!   ├── AlertNotifier: error-change diff → webhook
//!   └── PersistenceBridge: registry ⇄ CRM config store
//! ```

pub mod alert;
pub mod persistence;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod tracker;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use alert::AlertNotifier;
pub use persistence::PersistenceBridge;
pub use reconcile::ReconciliationEngine;
pub use registry::{CampaignRegistry, StatePatch};
pub use scheduler::{DialScheduler, SchedulerGuards};
pub use selector::OutboundSelector;
pub use tracker::ActiveCallTracker;
pub use watchdog::WatchdogMonitor;
