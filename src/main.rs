use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use movigoo_bookings_rs::auth::IdentityVerifier;
use movigoo_bookings_rs::cashfree::CashfreeClient;
use movigoo_bookings_rs::config::{Config, StoreBackend};
use movigoo_bookings_rs::email::Mailer;
use movigoo_bookings_rs::metrics::Metrics;
use movigoo_bookings_rs::store::{BookingStore, MemoryStore, PgStore};
use movigoo_bookings_rs::{db, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,movigoo_bookings_rs=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow!(e))?;
    tracing::info!("config loaded");

    let store: Arc<dyn BookingStore> = match cfg.store_backend {
        StoreBackend::Postgres => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("DATABASE_URL required for the postgres backend"))?;
            let pool = db::create_pool(database_url)
                .await
                .context("connecting to postgres")?;
            db::run_migrations(&pool).await.context("running migrations")?;
            tracing::info!("db connected + migrations applied");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway = CashfreeClient::from_env()?;
    tracing::info!(sandbox = gateway.config().sandbox, "gateway client ready");

    let identity = IdentityVerifier::new(&cfg.identity_jwt_secret, &cfg.identity_project_id);
    let mailer = Mailer::new(cfg.email_api_key.clone(), cfg.email_template_id.clone());
    let metrics = Metrics::new();

    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        gateway,
        identity,
        mailer,
        metrics,
    });

    let app = routes::app_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
