use actix_web::{web, App, HttpResponse, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;

use event_report_service::clients::{
    FixedWindowLimiter, HttpFederationTransport, LoggingNotifier, PgCalendarAccess,
    PgEventDirectory,
};
use event_report_service::config::Config;
use event_report_service::handlers::{self, AppState};
use event_report_service::jobs::EscalationScheduler;
use event_report_service::repository::PgReportRepository;
use event_report_service::services::{
    AnalyticsAggregator, AuthorizationResolver, LifecycleEngine, PatternDetector,
    SubmissionGateway, VerificationService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    tracing::info!("Starting Event Report Service...");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        http_port = %config.http_port,
        "Configuration loaded"
    );

    // Initialize database pool
    let pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?,
    );
    tracing::info!("Database pool initialized");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&*pool).await.map_err(|e| {
        tracing::error!("Migration failed: {}", e);
        e
    })?;
    tracing::info!("Migrations completed successfully");

    // Wire up collaborators
    let repo = Arc::new(PgReportRepository::new(pool.clone()));
    let events = Arc::new(PgEventDirectory::new(pool.clone()));
    let access = Arc::new(PgCalendarAccess::new(pool.clone()));
    let notifier = Arc::new(LoggingNotifier);
    let federation = Arc::new(HttpFederationTransport::new());
    let limiter = Arc::new(FixedWindowLimiter::new());

    let authz = Arc::new(AuthorizationResolver::new(access));
    let gateway = Arc::new(SubmissionGateway::new(
        repo.clone(),
        events.clone(),
        notifier.clone(),
        limiter,
        authz.clone(),
        config.clone(),
    ));
    let verification = Arc::new(VerificationService::new(repo.clone()));
    let engine = Arc::new(LifecycleEngine::new(
        repo.clone(),
        events.clone(),
        federation,
        authz.clone(),
        config.clone(),
    ));
    let analytics = Arc::new(AnalyticsAggregator::new(repo.clone(), authz));
    let patterns = Arc::new(PatternDetector::new(repo.clone(), events, config.clone()));

    // Background auto-escalation scheduler with graceful shutdown
    let scheduler = EscalationScheduler::new(repo, engine.clone(), notifier, config.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    let state = web::Data::new(AppState {
        gateway,
        verification,
        engine,
        analytics,
        patterns,
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    tracing::info!("HTTP server listening on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind(&bind_addr)?
    .run();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // Let the scheduler finish its current pass before exiting.
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;

    Ok(())
}
