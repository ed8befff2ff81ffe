//! session-guard - Single Live Session Authentication Service
//! Mission: Exactly one valid session per account; a newer login retires the older one
//! Philosophy: The store is the authority, the bearer is only a claim

use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_guard::{
    auth::{AuthState, CookiePolicy, CredentialStore, JwtHandler, SqliteAccountStore, SystemClock},
    config::{load_env, ServerConfig},
    middleware::RateLimitLayer,
    server::build_router,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = ServerConfig::parse();
    config.validate().context("Invalid configuration")?;

    info!("🛡️ session-guard starting");

    let (secret, dev_fallback) = config.signing_secret();
    if dev_fallback {
        warn!("⚠️ JWT_SECRET not set, using the development secret. Do not run this in production.");
    }

    let db_path = config.db_path.to_string_lossy().to_string();
    let bcrypt_cost = config.bcrypt_cost;
    let bootstrap = config
        .bootstrap_admin()
        .map(|(email, password)| (email.to_string(), password.to_string()));

    let store = tokio::task::spawn_blocking(move || -> Result<SqliteAccountStore> {
        let store = SqliteAccountStore::new(&db_path, bcrypt_cost)?;
        if let Some((email, password)) = bootstrap {
            store.ensure_admin(&email, &password)?;
        }
        Ok(store)
    })
    .await
    .context("Store initialization task failed")??;
    info!("✅ Account store ready at {}", config.db_path.display());

    let store: Arc<dyn CredentialStore> = Arc::new(store);
    let jwt_handler = Arc::new(JwtHandler::new(
        &secret,
        config.session_ttl(),
        Arc::new(SystemClock),
    ));
    let auth_state = AuthState::new(
        store,
        jwt_handler,
        CookiePolicy {
            secure: config.secure_cookies,
        },
    );

    let limiter = RateLimitLayer::new(config.login_rate_limit());
    tokio::spawn(limiter_cleanup(limiter.clone()));

    let app = build_router(auth_state, Some(limiter));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        ttl_secs = config.session_ttl_secs,
        "🎯 API server listening on {}", config.bind_addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_guard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Periodically forget idle rate limit entries
async fn limiter_cleanup(limiter: RateLimitLayer) {
    let mut tick = interval(Duration::from_secs(300));
    loop {
        tick.tick().await;
        limiter.cleanup();
    }
}
