//! HTTP adapter for billing endpoints.
//!
//! Exposes subscription lifecycle, entitlement checks and the gateway
//! webhook over a REST API.

mod dto;
mod handlers;
mod routes;

pub use dto::*;
pub use handlers::{ApiError, BillingAppState};
pub use routes::{billing_router, clinic_routes, webhook_routes};
