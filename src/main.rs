//! Application entry point.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use escrow_disbursement_engine::api::{RouterConfig, create_router_with_config};
use escrow_disbursement_engine::app::{
    AppService, AppState, Collaborators, EngineConfig, Scheduler, SchedulerConfig,
};
use escrow_disbursement_engine::domain::Notifier;
use escrow_disbursement_engine::infra::{
    GatewayRegistry, HttpIdentityClient, HttpTransactionClient, HttpWebhookSender, LogNotifier,
    MonnifyConfig, MonnifyGateway, PostgresClient, PostgresConfig, RaveConfig, RaveGateway,
    ServiceClientConfig, SlackNotifier, WalletGateway,
};

/// Application configuration
struct Config {
    database_url: String,
    host: String,
    port: u16,
    json_logs: bool,
    http_timeout: Duration,
    rave: Option<RaveConfig>,
    monnify: Option<MonnifyConfig>,
    identity_service: ServiceClientConfig,
    transaction_service: ServiceClientConfig,
    /// HMAC key for generic gateway webhooks
    gateway_webhook_secret: Option<SecretString>,
    /// HMAC key for Monnify callbacks; falls back to the Monnify secret key
    monnify_webhook_secret: Option<SecretString>,
    /// Signs outbound merchant webhooks when set
    merchant_webhook_secret: Option<SecretString>,
    slack_webhook_url: Option<SecretString>,
    engine: EngineConfig,
    scheduler: SchedulerConfig,
    router: RouterConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let http_timeout = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let identity_service = ServiceClientConfig::from_env("IDENTITY_SERVICE_URL")
            .context("IDENTITY_SERVICE_URL not set")?;
        let transaction_service = ServiceClientConfig::from_env("TRANSACTION_SERVICE_URL")
            .context("TRANSACTION_SERVICE_URL not set")?;

        let monnify_webhook_secret = secret_var("MONNIFY_WEBHOOK_SECRET")
            .or_else(|| secret_var("MONNIFY_SECRET_KEY"));

        Ok(Self {
            database_url,
            host,
            port,
            json_logs: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            http_timeout,
            rave: RaveConfig::from_env(),
            monnify: MonnifyConfig::from_env(),
            identity_service,
            transaction_service,
            gateway_webhook_secret: secret_var("GATEWAY_WEBHOOK_SECRET"),
            monnify_webhook_secret,
            merchant_webhook_secret: secret_var("WEBHOOK_SIGNING_SECRET"),
            slack_webhook_url: secret_var("SLACK_WEBHOOK_URL"),
            engine: EngineConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            router: RouterConfig::from_env(),
        })
    }
}

fn secret_var(name: &str) -> Option<SecretString> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(config.json_logs);

    info!(
        "🏗️  Escrow Disbursement Engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    info!("📦 Initializing infrastructure...");

    let postgres_client = PostgresClient::new(&config.database_url, PostgresConfig::default()).await?;
    postgres_client.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");

    let mut gateways = GatewayRegistry::new().with(Arc::new(WalletGateway::new()));
    if let Some(rave) = config.rave.clone() {
        gateways = gateways.with(Arc::new(RaveGateway::new(rave)?));
        info!("   ✓ Rave gateway configured");
    } else {
        warn!("   ○ Rave gateway disabled (RAVE_SECRET_KEY not set)");
    }
    if let Some(monnify) = config.monnify.clone() {
        gateways = gateways.with(Arc::new(MonnifyGateway::new(monnify)?));
        info!("   ✓ Monnify gateway configured");
    } else {
        info!("   ○ Monnify gateway disabled");
    }

    let notifier: Arc<dyn Notifier> = match config.slack_webhook_url.clone() {
        Some(url) => {
            info!("   ✓ Slack alerts enabled");
            Arc::new(SlackNotifier::new(url, config.http_timeout)?)
        }
        None => {
            info!("   ○ Slack alerts disabled, alerts go to the log");
            Arc::new(LogNotifier)
        }
    };

    if config.gateway_webhook_secret.is_none() {
        warn!("   ○ GATEWAY_WEBHOOK_SECRET not set, gateway webhooks will be rejected");
    }
    if config.monnify_webhook_secret.is_none() {
        warn!("   ○ Monnify webhook secret not set, Monnify callbacks will be rejected");
    }

    let service = Arc::new(AppService::new(
        Collaborators {
            db_client: Arc::new(postgres_client),
            gateways,
            identity_client: Arc::new(HttpIdentityClient::new(config.identity_service.clone())?),
            transaction_client: Arc::new(HttpTransactionClient::new(
                config.transaction_service.clone(),
            )?),
            notifier,
            webhook_sender: Arc::new(HttpWebhookSender::new(
                config.http_timeout,
                config.merchant_webhook_secret.clone(),
            )?),
        },
        config.engine.clone(),
    ));
    info!("   ✓ Engine services initialized");

    let scheduler = if config.scheduler.enabled {
        let scheduler = Scheduler::start(
            &config.scheduler,
            Arc::clone(&service.disbursements),
            Arc::clone(&service.webhooks),
        );
        info!("   ✓ Scheduler started ({} jobs)", scheduler.job_count());
        Some(scheduler)
    } else {
        info!("   ○ Scheduler disabled");
        None
    };

    let app_state = Arc::new(AppState::with_webhook_secrets(
        service,
        config.gateway_webhook_secret.clone(),
        config.monnify_webhook_secret.clone(),
    ));
    if config.router.rate_limit.is_some() {
        info!("   ✓ Rate limiting enabled");
    } else {
        info!("   ○ Rate limiting disabled");
    }
    let router = create_router_with_config(app_state, config.router.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    info!("Server shutdown complete");
    Ok(())
}
