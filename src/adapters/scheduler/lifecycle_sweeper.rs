//! LifecycleSweeper - Background service that advances due subscriptions.
//!
//! Each pass loads the records whose period end or grace deadline has
//! passed and runs [`AdvanceLifecycleHandler`] on each, a few at a time.
//! Several sweepers may run against the same store; a record lost to
//! another worker is counted as a conflict and left alone.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 300s | Time between passes |
//! | `batch_size` | 100 | Max records loaded per pass |
//! | `concurrency` | 4 | Records processed at once |
//!
//! ## Graceful Shutdown
//!
//! The service watches a shutdown channel and finishes the pass in flight
//! before stopping.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::application::handlers::subscription::{
    AdvanceLifecycleCommand, AdvanceLifecycleHandler, LifecycleOutcome,
};
use crate::domain::foundation::DomainError;
use crate::ports::{Clock, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: u32,
    pub concurrency: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 100,
            concurrency: 4,
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub renewed: usize,
    pub activated: usize,
    pub entered_grace: usize,
    pub suspended: usize,
    pub cancelled: usize,
    pub deferred: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: LifecycleOutcome) {
        match outcome {
            LifecycleOutcome::NotDue => {}
            LifecycleOutcome::Renewed => self.renewed += 1,
            LifecycleOutcome::Activated => self.activated += 1,
            LifecycleOutcome::EnteredGrace => self.entered_grace += 1,
            LifecycleOutcome::Suspended => self.suspended += 1,
            LifecycleOutcome::Cancelled => self.cancelled += 1,
            LifecycleOutcome::Deferred { .. } => self.deferred += 1,
            LifecycleOutcome::Conflict => self.conflicts += 1,
        }
    }

    /// Records that changed state this pass.
    pub fn transitions(&self) -> usize {
        self.renewed + self.activated + self.entered_grace + self.suspended + self.cancelled
    }
}

pub struct LifecycleSweeper {
    subscriptions: Arc<dyn SubscriptionRepository>,
    advance: Arc<AdvanceLifecycleHandler>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl LifecycleSweeper {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        advance: Arc<AdvanceLifecycleHandler>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            subscriptions,
            advance,
            clock,
            config,
        }
    }

    /// Run passes until the shutdown signal flips to `true`.
    ///
    /// A failed pass is logged and the loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("lifecycle sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::error!(error = %err, "lifecycle sweep failed");
                    }
                }
            }
        }
    }

    /// One pass over the due records.
    pub async fn sweep_once(&self) -> Result<SweepReport, DomainError> {
        let now = self.clock.now();
        let due = self.subscriptions.find_due(now, self.config.batch_size).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }

        let concurrency = self.config.concurrency.max(1);
        let results: Vec<_> = stream::iter(due)
            .map(|subscription| {
                let advance = self.advance.clone();
                async move {
                    let result = advance
                        .handle(AdvanceLifecycleCommand {
                            subscription_id: subscription.id,
                        })
                        .await;
                    (subscription, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (subscription, result) in results {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        subscription_id = %subscription.id,
                        clinic_id = %subscription.clinic_id,
                        error = %err,
                        "failed to advance subscription"
                    );
                }
            }
        }

        tracing::info!(
            transitions = report.transitions(),
            deferred = report.deferred,
            conflicts = report.conflicts,
            failed = report.failed,
            "lifecycle sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::subscription::test_support::Fixture;
    use crate::application::handlers::subscription::RenewalSettings;
    use crate::application::RetryPolicy;
    use crate::domain::catalog::Tier;
    use crate::domain::subscription::{
        LifecycleState, PaymentMethodRef, Subscription, SubscriptionStatus,
    };
    use crate::ports::{GatewayError, PaymentLedger};

    fn sweeper(fx: &Fixture) -> LifecycleSweeper {
        let advance = AdvanceLifecycleHandler::new(
            fx.store.clone(),
            fx.gateway.clone(),
            fx.bus.clone(),
            fx.clock.clone(),
            fx.catalog.clone(),
            RenewalSettings {
                retry: RetryPolicy::immediate(1),
                charge_timeout: Duration::from_millis(50),
                max_renewal_attempts: 3,
            },
        );
        LifecycleSweeper::new(
            fx.store.clone(),
            Arc::new(advance),
            fx.clock.clone(),
            SweeperConfig {
                interval: Duration::from_millis(10),
                batch_size: 50,
                concurrency: 2,
            },
        )
    }

    fn active(sub: &mut Subscription, auto_pay: bool) {
        sub.tier = Tier::Core;
        sub.state = LifecycleState::Active;
        if auto_pay {
            sub.payment_method = Some(PaymentMethodRef::new("token_1").unwrap());
            sub.auto_pay_enabled = true;
        }
    }

    #[tokio::test]
    async fn empty_store_reports_nothing() {
        let fx = Fixture::new();
        assert_eq!(sweeper(&fx).sweep_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn mixed_batch_is_counted_per_outcome() {
        let fx = Fixture::new();
        let renewing = fx.seed(|s| active(s, true)).await;
        let lapsing = fx.seed(|s| active(s, false)).await;
        let cancelling = fx
            .seed(|s| {
                active(s, false);
                s.cancel_at_period_end = true;
            })
            .await;
        fx.clock.set(renewing.current_period_end);

        let report = sweeper(&fx).sweep_once().await.unwrap();

        assert_eq!(report.renewed, 1);
        assert_eq!(report.entered_grace, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.reload(&lapsing).await.status(), SubscriptionStatus::Grace);
        assert_eq!(fx.reload(&cancelling).await.status(), SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn second_pass_finds_nothing_due() {
        let fx = Fixture::new();
        let sub = fx.seed(|s| active(s, true)).await;
        fx.clock.set(sub.current_period_end);
        let sweeper = sweeper(&fx);

        assert_eq!(sweeper.sweep_once().await.unwrap().renewed, 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(fx.gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_gateway_defers_renewal() {
        let fx = Fixture::new();
        let sub = fx.seed(|s| active(s, true)).await;
        fx.clock.set(sub.current_period_end);
        fx.gateway.fail_times(
            1,
            GatewayError::Transport {
                reason: "connection reset".to_string(),
            },
        );

        let report = sweeper(&fx).sweep_once().await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(fx.reload(&sub).await.status(), SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn concurrent_sweepers_renew_once() {
        let fx = Fixture::new();
        let sub = fx.seed(|s| active(s, true)).await;
        fx.clock.set(sub.current_period_end);
        let first = sweeper(&fx);
        let second = sweeper(&fx);

        let (a, b) = tokio::join!(first.sweep_once(), second.sweep_once());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.renewed + b.renewed, 1);
        let payments = fx.store.list_for_subscription(&sub.id).await.unwrap();
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fx = Fixture::new();
        let sweeper = sweeper(&fx);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sweeper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
