//! services/monitor/src/bin/monitor.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use monitor_lib::{
    adapters::{ArxivSource, DbAdapter, OpenAiSummaryAdapter, TelegramNotifier, TelegraphPublisher},
    config::Config,
    error::ApiError,
    runner::{parse_schedule, run_pass_loop},
    web::{self, middleware::USER_ID_HEADER, rest::ApiDoc, state::AppState},
};
use paper_watch_core::{
    enrich::PageEnricher,
    gate::CheckGate,
    ports::{ContentSource, EnrichmentService},
    scheduler::SubscriptionScheduler,
    search_session::PaperSearch,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting paper monitor...");
    let schedule = parse_schedule(&config.check_schedule)?;

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_adapter = Arc::new(DbAdapter::connect(&config.database_url).await?);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .user_agent(concat!("paper-watch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let mut openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
    if let Some(base) = &config.openai_base_url {
        openai_config = openai_config.with_api_base(base.clone());
    }
    let summary_adapter = Arc::new(OpenAiSummaryAdapter::new(
        Client::with_config(openai_config),
        config.summary_model.clone(),
        config.summary_language.clone(),
    ));
    let telegraph = Arc::new(TelegraphPublisher::new(
        http.clone(),
        config.telegraph_api_url.clone(),
        config.telegraph_short_name.clone(),
        config.telegraph_access_token.clone(),
    ));
    let enricher: Arc<dyn EnrichmentService> =
        Arc::new(PageEnricher::new(summary_adapter, telegraph));
    let source: Arc<dyn ContentSource> =
        Arc::new(ArxivSource::new(http.clone(), config.arxiv_api_url.clone()));
    let notifier = Arc::new(TelegramNotifier::new(
        http,
        config.telegram_api_url.clone(),
        config.telegram_bot_token.clone(),
    ));

    // --- 4. Build the Scheduler, Search and Shared AppState ---
    let scheduler = Arc::new(SubscriptionScheduler::new(
        db_adapter.clone(),
        source.clone(),
        enricher.clone(),
        notifier,
        CheckGate::new(config.gate.clone()),
        config.scheduler,
    ));
    let search = Arc::new(PaperSearch::new(source, config.search_page_size));

    let app_state = Arc::new(AppState {
        ledger: db_adapter,
        config: config.clone(),
        scheduler: scheduler.clone(),
        search,
        enricher,
    });

    // --- 5. Start the Pass Runner ---
    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(run_pass_loop(scheduler, schedule, shutdown.clone()));
    info!(schedule = %config.check_schedule, "Pass runner started");

    // --- 6. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static(USER_ID_HEADER)]);

    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = runner.await {
        error!(error = %e, "Pass runner task failed");
    }
    info!("Paper monitor stopped");
    Ok(())
}
