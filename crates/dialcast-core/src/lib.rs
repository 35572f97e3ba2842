//! # Dialcast Core
//!
//! Shared foundation for the Dialcast workspace: configuration, the error
//! taxonomy, the campaign domain model, and the adapter traits that the
//! engine talks to the outside world through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DialcastConfig;
pub use error::{DialError, Result};
pub use types::{
    ActiveCallHandle, ActiveCallRecord, AuthDescriptor, Campaign, CampaignState, CampaignView,
    Contact, CorrelationEntry, DeviceRef, MatchResult, PendingCall, PlacedCall,
};
