//! # Dialcast Telephony
//!
//! Reqwest client for the PBX platform: token issuance, call control
//! (makecall/drop), agent availability, and the per-tick active-call
//! snapshot. Implements [`dialcast_core::traits::TelephonyAdapter`].

pub mod client;

pub use client::PbxClient;
