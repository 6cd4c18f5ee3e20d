//! enhanced-http demo server.
//!
//! ```text
//!   TCP ─▶ net::listener ─▶ http::Pipeline ─────────────────────────────▶ ResponseWriter ─▶ TCP
//!                              │ validate │ upload │ session │ chain+handler │
//!                              ▼          ▼        ▼
//!                          security    upload   session store     (sweepers, config watcher)
//! ```
//!
//! The bundled handler echoes the request as JSON, hands out a session
//! cookie on first contact and streams a few chunks on `/stream`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};

use enhanced_http::config::{load_config, ConfigWatcher, ServerConfig};
use enhanced_http::http::middleware::boxed;
use enhanced_http::http::{handler_fn, Handler, Pipeline, TraceMiddleware};
use enhanced_http::lifecycle::{self, Shutdown};
use enhanced_http::net::Listener;
use enhanced_http::observability::{init_metrics, init_tracing, ServerMetrics};
use enhanced_http::session::{session_cookie, SessionStore};

#[derive(Debug, Parser)]
#[command(name = "enhanced-http", version, about = "HTTP request/response enhancement pipeline")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "enhanced-http starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.connections.max_connections,
        compression = config.compression.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = build_pipeline(config.clone());
    let shutdown = Shutdown::new();

    tokio::spawn(Arc::clone(pipeline.connections()).run_sweeper(
        config.connections.sweep_interval(),
        shutdown.subscribe(),
    ));
    tokio::spawn(Arc::clone(pipeline.sessions()).run_sweeper(
        config.sessions.sweep_interval(),
        shutdown.subscribe(),
    ));

    // The watcher handle must outlive the reload task.
    let _watcher = match &cli.config {
        Some(path) => match ConfigWatcher::new(path, config.clone()).spawn() {
            Ok((watcher, mut updates)) => {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    while let Some(next) = updates.recv().await {
                        pipeline.reload(next);
                    }
                });
                Some(watcher)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        },
        None => None,
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = tokio::spawn(listener.serve(Arc::clone(&pipeline), shutdown.subscribe()));

    lifecycle::ctrl_c().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    server.await??;

    tracing::info!(metrics = ?pipeline.metrics().snapshot(), "Shutdown complete");
    Ok(())
}

fn build_pipeline(config: ServerConfig) -> Arc<Pipeline> {
    let cookie_name = config.sessions.cookie_name.clone();
    let metrics = Arc::new(ServerMetrics::new(config.observability.metrics_enabled));
    let sessions = Arc::new(SessionStore::new(
        config.sessions.timeout(),
        Arc::clone(&metrics),
    ));
    let handler = echo_handler(Arc::clone(&sessions), cookie_name);

    Arc::new(
        Pipeline::with_metrics(config, handler, metrics)
            .with_session_store(sessions)
            .with_middleware(TraceMiddleware),
    )
}

fn echo_handler(sessions: Arc<SessionStore>, cookie_name: String) -> impl Handler {
    handler_fn(move |req, resp| {
        let sessions = Arc::clone(&sessions);
        let cookie_name = cookie_name.clone();
        boxed(async move {
            let session_id = match req.session_id() {
                Some(id) => id.to_string(),
                None => {
                    let session = sessions.create();
                    resp.add_cookie(session_cookie(&cookie_name, session.id()));
                    session.id().to_string()
                }
            };
            let session = sessions.get(&session_id);
            let visits = session
                .get_attribute("visits")
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
                + 1;
            session.set_attribute("visits", json!(visits));

            if req.path() == "/stream" {
                resp.set_content_type("text/plain");
                let body = resp.enable_streaming();
                for i in 0..4 {
                    body.send(format!("chunk {i}\n"))?;
                }
                return Ok(Value::Null);
            }

            let upload = req.upload().map(|batch| {
                json!({
                    "files": batch
                        .files()
                        .map(|f| json!({"name": f.name, "filename": f.filename, "size": f.size()}))
                        .collect::<Vec<_>>(),
                    "fields": batch.fields(),
                })
            });
            let echo = json!({
                "method": req.method(),
                "path": req.path(),
                "query": req.query_params(),
                "session": session_id,
                "visits": visits,
                "upload": upload,
            });
            resp.json(&echo)?;
            Ok(echo)
        })
    })
}
