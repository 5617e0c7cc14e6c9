//! Process entry point: CLI parsing, logger setup, collaborator wiring, and
//! clean `SIGINT` shutdown.

use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer};
use clap::Parser;
use tracing::info;

use iotlab_ws_gateway::api::{ApiConfig, AuthApi, HttpAuthApi, LocalApi};
use iotlab_ws_gateway::app;
use iotlab_ws_gateway::config::CliArgs;
use iotlab_ws_gateway::gateway::Gateway;

/// Idempotent subscriber setup mirroring the original `setup_server_logger`:
/// console output iff `--log-console`, a log file iff `--log-file` is set,
/// both driven by an `RUST_LOG`-controlled `EnvFilter` (default `"info"`).
fn init_tracing(
    log_file: Option<&Path>,
    log_console: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = tracing_log::LogTracer::init();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "iotlab-ws-gateway.log".to_owned());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    let console_layer = log_console.then(fmt::layer);

    let _ = registry.with(file_layer).with(console_layer).try_init();
    guard
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(args.log_file.as_deref(), args.log_console);

    let api_config: ApiConfig = args.api_config();
    let auth_api: Arc<dyn AuthApi> = Arc::new(
        HttpAuthApi::new(api_config)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?,
    );

    let local_api = args
        .use_local_api
        .then(|| LocalApi::with_defaults(Some(args.token.clone()).filter(|t| !t.is_empty())));

    let gateway = Gateway::new();

    info!(port = args.port, "starting iotlab-ws-gateway");
    let server_gateway = Arc::clone(&gateway);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(|cfg| {
                app::configure(
                    cfg,
                    Arc::clone(&server_gateway),
                    Arc::clone(&auth_api),
                    local_api.clone(),
                )
            })
    })
    .bind(("0.0.0.0", args.port))?
    .run();

    let server_handle = server.handle();
    let shutdown_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping gateway");
            shutdown_gateway.stop();
            server_handle.stop(true).await;
        }
    });

    server.await
}
