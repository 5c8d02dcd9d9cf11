//! clinic-billing server binary.
//!
//! Loads configuration, wires adapters to the application handlers, starts
//! the lifecycle sweeper and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use clinic_billing::adapters::clock::SystemClock;
use clinic_billing::adapters::events::TracingEventPublisher;
use clinic_billing::adapters::http::{app_router, cors_layer, BillingAppState};
use clinic_billing::adapters::memory::{
    InMemoryOverrideStore, InMemorySubscriptionStore, InMemoryUsageReader,
};
use clinic_billing::adapters::postgres::{
    self, PostgresOverrideStore, PostgresSubscriptionStore, PostgresUsageReader,
};
use clinic_billing::adapters::razorpay::{
    MockPaymentGateway, RazorpayConfig, RazorpayGateway, RazorpayWebhookVerifier,
};
use clinic_billing::adapters::scheduler::LifecycleSweeper;
use clinic_billing::application::handlers::subscription::AdvanceLifecycleHandler;
use clinic_billing::config::{AppConfig, ServerConfig};
use clinic_billing::ports::{
    Clock, EventPublisher, OverrideRepository, PaymentGateway, PaymentLedger,
    SubscriptionRepository, UsageReader,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Stores {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn PaymentLedger>,
    overrides: Arc<dyn OverrideRepository>,
    usage: Arc<dyn UsageReader>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let catalog = Arc::new(config.load_catalog()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_publisher: Arc<dyn EventPublisher> = Arc::new(TracingEventPublisher::new());
    let stores = open_stores(&config).await?;
    let gateway = payment_gateway(&config)?;

    let advance = Arc::new(AdvanceLifecycleHandler::new(
        stores.subscriptions.clone(),
        gateway,
        event_publisher.clone(),
        clock.clone(),
        catalog.clone(),
        config.billing.renewal_settings(),
    ));
    let sweeper = LifecycleSweeper::new(
        stores.subscriptions.clone(),
        advance,
        clock.clone(),
        config.billing.sweeper_config(),
    );

    let state = BillingAppState {
        subscriptions: stores.subscriptions,
        ledger: stores.ledger,
        overrides: stores.overrides,
        usage: stores.usage,
        event_publisher,
        clock,
        catalog,
        policy: config.billing.policy(),
        webhook_verifier: config
            .gateway
            .webhook_secret()
            .cloned()
            .map(RazorpayWebhookVerifier::new),
    };
    if state.webhook_verifier.is_none() {
        tracing::warn!("no webhook secret configured; gateway webhooks will be refused");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let app = app_router(
        state,
        config.server.request_timeout(),
        cors_layer(&config.server.cors_origins_list()),
    );
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = %config.server.environment, "clinic-billing listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    shutdown_tx.send(true).ok();
    if let Err(err) = sweeper_task.await {
        tracing::error!(error = %err, "lifecycle sweeper task panicked");
    }
    Ok(())
}

/// JSON lines outside development. `RUST_LOG` wins over `server.log_level`.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));

    if server.is_development() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}

async fn open_stores(config: &AppConfig) -> Result<Stores, BoxError> {
    match config.database.url() {
        Some(url) => {
            let pool = postgres::connect(
                url,
                config.database.max_connections,
                config.database.acquire_timeout(),
            )
            .await?;
            tracing::info!("using postgres stores");
            let subscriptions = Arc::new(PostgresSubscriptionStore::new(pool.clone()));
            Ok(Stores {
                subscriptions: subscriptions.clone(),
                ledger: subscriptions,
                overrides: Arc::new(PostgresOverrideStore::new(pool.clone())),
                usage: Arc::new(PostgresUsageReader::new(pool)),
            })
        }
        None => {
            tracing::warn!("no database url configured; state is kept in memory");
            let subscriptions = Arc::new(InMemorySubscriptionStore::new());
            Ok(Stores {
                subscriptions: subscriptions.clone(),
                ledger: subscriptions,
                overrides: Arc::new(InMemoryOverrideStore::new()),
                usage: Arc::new(InMemoryUsageReader::new()),
            })
        }
    }
}

fn payment_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>, BoxError> {
    match config.gateway.credentials() {
        Some((key_id, key_secret)) => {
            tracing::info!(test_mode = config.gateway.is_test_mode(), "charging through razorpay");
            let razorpay = RazorpayConfig::new(key_id, key_secret.clone())
                .with_base_url(config.gateway.api_base_url.clone());
            Ok(Arc::new(RazorpayGateway::new(razorpay)))
        }
        None if config.server.environment.allows_mock_gateway() => {
            tracing::warn!("no gateway credentials configured; renewals use the mock gateway");
            Ok(Arc::new(MockPaymentGateway::new()))
        }
        None => Err(format!(
            "gateway credentials are required in {}",
            config.server.environment
        )
        .into()),
    }
}
