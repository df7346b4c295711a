use std::process;
use std::sync::Arc;

use cartolina::{
    application::error::AppError,
    application::pipeline::RenderPipeline,
    application::queue::RenderQueue,
    application::registry::TemplateRegistry,
    application::templates::{TemplateAssets, TemplateContext},
    config,
    infra::{
        browser::ChromeRenderer,
        error::InfraError,
        http::{self, HttpState},
        records::RecordStore,
        storage::ArtifactStore,
        supabase::SupabaseClient,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let api_key = settings
        .auth
        .api_key
        .clone()
        .ok_or_else(|| InfraError::configuration("auth.api_key is required to serve"))?;
    let supabase_url = settings
        .supabase
        .url
        .clone()
        .ok_or_else(|| InfraError::configuration("supabase.url is required to serve"))?;
    let service_role_key = settings.supabase.service_role_key.clone().ok_or_else(|| {
        InfraError::configuration("supabase.service_role_key is required to serve")
    })?;

    let client = SupabaseClient::new(&supabase_url, &service_role_key)
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let renderer = Arc::new(ChromeRenderer::new(
        settings.render.chrome_executable.clone(),
        settings.render.wait_timeout,
    ));
    let store = Arc::new(ArtifactStore::new(client.clone()));
    let records = Arc::new(RecordStore::new(client));
    let pipeline = Arc::new(RenderPipeline::new(renderer, store, records));

    let assets = Arc::new(match settings.templates.directory.as_ref() {
        Some(directory) => {
            info!(
                target: "cartolina::serve",
                directory = %directory.display(),
                "loading card templates from disk"
            );
            TemplateAssets::from_directory(directory.clone())
        }
        None => TemplateAssets::embedded(),
    });
    let context = Arc::new(TemplateContext {
        pipeline,
        assets,
        options: settings.render.options(),
    });
    let registry = Arc::new(TemplateRegistry::with_builtin_templates(context));

    let queue = RenderQueue::new(
        settings.queue.result_capacity,
        settings.queue.task_timeout,
    );

    let state = HttpState {
        queue,
        registry,
        api_key: api_key.into(),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target: "cartolina::serve", addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: std::time::Duration) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(
        target: "cartolina::serve",
        grace_secs = grace.as_secs(),
        "shutdown signal received, draining connections"
    );
}
