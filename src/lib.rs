//! Clinic Billing - Tiered feature entitlement and subscription lifecycle
//!
//! This crate answers which features a clinic may use, and keeps each
//! clinic's subscription moving through trial, renewal, grace, suspension
//! and cancellation as payments arrive and periods end.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
