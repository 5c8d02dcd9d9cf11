//! Mock payment gateway for testing.
//!
//! Supports:
//! - Scripted outcomes, consumed one per charge
//! - Idempotency-key collapsing like the real gateway
//! - Call tracking
//! - Artificial latency for timeout tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::subscription::GatewayPaymentId;
use crate::ports::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway};

/// Mock payment gateway.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.push_outcome(Err(GatewayError::transport("timeout")));
///
/// let result = gateway.charge(request).await; // Err(Transport)
/// let result = gateway.charge(request).await; // Ok, scripted queue empty
/// assert_eq!(gateway.charge_count(), 2);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    outcomes: VecDeque<Result<(), GatewayError>>,
    settled: HashMap<String, GatewayPaymentId>,
    calls: Vec<ChargeRequest>,
    next_id: u32,
    latency: Option<Duration>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the outcome of the next uncollapsed charge.
    pub fn push_outcome(&self, outcome: Result<(), GatewayError>) {
        self.state().outcomes.push_back(outcome);
    }

    /// Every charge fails with this error until the queue is refilled.
    pub fn fail_times(&self, count: usize, error: GatewayError) {
        let mut state = self.state();
        for _ in 0..count {
            state.outcomes.push_back(Err(error.clone()));
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    pub fn calls(&self) -> Vec<ChargeRequest> {
        self.state().calls.clone()
    }

    pub fn charge_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Number of distinct charges that settled.
    pub fn settled_count(&self) -> usize {
        self.state().settled.len()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let latency = {
            let mut state = self.state();
            state.calls.push(request.clone());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(existing) = state.settled.get(&request.idempotency_key) {
            return Ok(ChargeReceipt {
                gateway_payment_id: existing.clone(),
            });
        }

        state.outcomes.pop_front().unwrap_or(Ok(()))?;

        state.next_id += 1;
        let gateway_payment_id = GatewayPaymentId::new(format!("pay_mock_{}", state.next_id))
            .map_err(|e| GatewayError::misconfigured(e.to_string()))?;
        state
            .settled
            .insert(request.idempotency_key, gateway_payment_id.clone());
        Ok(ChargeReceipt { gateway_payment_id })
    }
}
