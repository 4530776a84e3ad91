//! Lendcore loan-servicing server
//!
//! Wires configuration, the database pool, domain services, the payment
//! gateway client, scheduled sweeps, and the HTTP router.

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use lendcore_server::config::Config;
use lendcore_server::handlers;
use lendcore_server::installment::InstallmentService;
use lendcore_server::loan::LoanService;
use lendcore_server::middleware;
use lendcore_server::notification::{LogNotifier, NotificationSender};
use lendcore_server::payment::{
    HttpGateway, PaymentGateway, PaymentService, SimulatedGateway, WebhookReconciler,
};
use lendcore_server::routes;
use lendcore_server::scanner::{start_scheduler, SweepService};
use lendcore_server::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(
        environment = ?config.environment,
        database_url = %config.database_url_masked(),
        "Starting lendcore server"
    );

    let db_pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    tracing::info!("Database connected");

    // Live gateway when an API key is configured, simulated otherwise
    let gateway: Arc<dyn PaymentGateway> = match &config.gateway_api_key {
        Some(api_key) => Arc::new(HttpGateway::new(
            config.gateway_api_url.clone(),
            api_key.clone(),
        )),
        None => {
            tracing::warn!("GATEWAY_API_KEY not set - using simulated payment gateway");
            Arc::new(SimulatedGateway::new())
        }
    };

    let notifier: Arc<dyn NotificationSender> = Arc::new(LogNotifier);

    let installment_service = InstallmentService::new(db_pool.clone());
    let loan_service = LoanService::new(
        db_pool.clone(),
        installment_service.clone(),
        config.grace_period_days,
    );
    let payment_service = PaymentService::new(
        db_pool.clone(),
        installment_service.clone(),
        gateway,
        config.currency.clone(),
    );
    let reconciler = WebhookReconciler::new(
        db_pool.clone(),
        installment_service.clone(),
        loan_service.clone(),
        payment_service.clone(),
        notifier.clone(),
        config.webhook_secret.clone(),
        config.portal_base_url.clone(),
    );
    let sweep_service = Arc::new(SweepService::new(
        installment_service.clone(),
        payment_service.clone(),
        notifier.clone(),
        &config,
    ));

    let app_state = AppState::new(
        Arc::new(loan_service),
        Arc::new(installment_service),
        Arc::new(payment_service),
        Arc::new(reconciler),
        sweep_service.clone(),
    );

    let mut scheduler = match start_scheduler(&config, sweep_service).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start sweep scheduler");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(routes::loan_routes())
        .merge(routes::payment_routes())
        .merge(routes::admin_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind {}", addr);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler shutdown failed");
    }

    tracing::info!("Server shutdown complete");
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed) = config.cors_allowed_origins.as_deref().filter(|s| !s.is_empty()) else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
