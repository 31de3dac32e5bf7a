use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use quillspace::application::ports::document_store::DocumentStore;
use quillspace::application::ports::note_cache::NoteCache;
use quillspace::application::ports::spreadsheet_cache::SpreadsheetCache;
use quillspace::application::ports::view_cache::ViewCache;
use quillspace::application::ports::whiteboard_cache::WhiteboardCache;
use quillspace::bootstrap::app_context::{AppContext, AppServices};
use quillspace::bootstrap::config::Config;
use quillspace::infrastructure::cache::{
    CacheClient, RedisNoteCache, RedisSpreadsheetCache, RedisViewCache, RedisWhiteboardCache,
};
use quillspace::infrastructure::db::repositories::SqlxDocumentStore;
use quillspace::infrastructure::realtime::{Hub, HubCaches, REAP_INTERVAL};
use quillspace::infrastructure::worker::{
    NOTE_PERSIST_INTERVAL, NotePersister, SPREADSHEET_PERSIST_INTERVAL, SpreadsheetPersister,
    ViewPersister, WHITEBOARD_PERSIST_INTERVAL, WhiteboardPersister, YJS_PERSIST_INTERVAL,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        quillspace::presentation::http::health::health,
        quillspace::presentation::http::stats::hub_stats,
        quillspace::presentation::http::tools::fetch_url,
        quillspace::presentation::http::tools::fetch_rss,
        quillspace::presentation::ws::view_ws,
        quillspace::presentation::ws::public_view_ws,
        quillspace::presentation::ws::note_ws,
    ),
    components(schemas(
        quillspace::presentation::http::health::HealthResp,
        quillspace::presentation::http::tools::FetchRequest,
        quillspace::infrastructure::realtime::HubStats,
    )),
    tags(
        (name = "Health", description = "System health checks"),
        (name = "Realtime", description = "WebSocket collaboration endpoints"),
        (name = "Tools", description = "SSRF-hardened outbound fetch tools")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "quillspace=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(port = cfg.port, redis_addr = %cfg.redis_addr, "starting quillspace backend");

    // Database
    let pool = quillspace::infrastructure::db::connect_pool(&cfg.db_dsn, cfg.db_max_open).await?;
    quillspace::infrastructure::db::migrate(&pool).await?;

    // Shared KV store and the typed caches over it
    let cache_client = CacheClient::connect(&cfg.redis_url()).await?;
    info!(addr = %cfg.redis_addr, "redis_connected");

    let view_cache: Arc<dyn ViewCache> = Arc::new(RedisViewCache::new(cache_client.clone()));
    let whiteboard_cache: Arc<dyn WhiteboardCache> =
        Arc::new(RedisWhiteboardCache::new(cache_client.clone()));
    let spreadsheet_cache: Arc<dyn SpreadsheetCache> =
        Arc::new(RedisSpreadsheetCache::new(cache_client.clone()));
    let note_cache: Arc<dyn NoteCache> = Arc::new(RedisNoteCache::new(cache_client.clone()));

    let store: Arc<dyn DocumentStore> = Arc::new(SqlxDocumentStore::new(pool.clone()));

    // Realtime hub
    let hub = Hub::new(
        HubCaches {
            view: view_cache.clone(),
            whiteboard: whiteboard_cache.clone(),
            spreadsheet: spreadsheet_cache.clone(),
            note: note_cache.clone(),
        },
        store.clone(),
        REAP_INTERVAL,
    );
    info!("realtime_hub_initialized");

    // Scheduled persisters
    let view_persister = Arc::new(ViewPersister::new(view_cache.clone(), store.clone()));
    let whiteboard_persister = Arc::new(WhiteboardPersister::new(
        whiteboard_cache.clone(),
        store.clone(),
    ));
    let spreadsheet_persister = Arc::new(SpreadsheetPersister::new(
        spreadsheet_cache.clone(),
        store.clone(),
    ));
    let note_persister = Arc::new(NotePersister::new(note_cache.clone(), store.clone()));

    let view_task = view_persister.start(YJS_PERSIST_INTERVAL);
    let whiteboard_task = whiteboard_persister.start(WHITEBOARD_PERSIST_INTERVAL);
    let spreadsheet_task = spreadsheet_persister.start(SPREADSHEET_PERSIST_INTERVAL);
    let note_task = note_persister.start(NOTE_PERSIST_INTERVAL);

    let ctx = AppContext::new(cfg.clone(), AppServices::new(hub.clone(), store.clone()));

    let app = Router::new()
        .nest(
            &cfg.api_root_path,
            quillspace::presentation::http::health::routes(pool.clone()),
        )
        .nest(
            &cfg.api_root_path,
            quillspace::presentation::http::stats::routes(ctx.clone()),
        )
        .nest(
            &cfg.api_root_path,
            quillspace::presentation::http::tools::routes(ctx.clone()),
        )
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .merge(quillspace::presentation::ws::routes(ctx.clone()))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting_down");

    // Drain cached state into the durable store before the schedulers stop.
    if let Err(e) = view_persister.force_persist().await {
        error!(error = ?e, "final_view_persist_failed");
    }
    if let Err(e) = whiteboard_persister.force_persist().await {
        error!(error = ?e, "final_whiteboard_persist_failed");
    }
    if let Err(e) = spreadsheet_persister.force_persist().await {
        error!(error = ?e, "final_spreadsheet_persist_failed");
    }
    if let Err(e) = note_persister.force_persist().await {
        error!(error = ?e, "final_note_persist_failed");
    }

    view_task.stop().await;
    whiteboard_task.stop().await;
    spreadsheet_task.stop().await;
    note_task.stop().await;

    hub.stop().await;
    info!("server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "install_ctrl_c_handler_failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!(error = ?e, "install_sigterm_handler_failed"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
