//! # Dialcast CRM
//!
//! Reqwest client for the CRM: candidate contact lists, call-outcome
//! writes, visit records, and the config store the registry is backed up
//! into. Implements [`dialcast_core::traits::CrmAdapter`].

pub mod client;

pub use client::CrmClient;
