use orchestra_api::{config::ApiConfig, startup::Application};
use orchestra_config::{Environment, load_config};
use orchestra_telemetry::tracing::init_tracing_with_cluster_name;
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = load_config::<ApiConfig>()?;

    // Initialize tracing from the binary name, stamping the cluster name
    // into every log entry.
    let _log_flusher = init_tracing_with_cluster_name(
        env!("CARGO_BIN_NAME"),
        Some(config.cluster.name.clone()),
    )?;

    // Initialize Sentry before the async runtime starts.
    let _sentry_guard = init_sentry(&config)?;

    actix_web::rt::System::new().block_on(async_main(config))?;

    Ok(())
}

async fn async_main(config: ApiConfig) -> anyhow::Result<()> {
    log_application_config(&config);

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}

fn init_sentry(config: &ApiConfig) -> anyhow::Result<Option<sentry::ClientInitGuard>> {
    if let Some(sentry_config) = &config.sentry {
        info!("initializing sentry with supplied dsn");

        let environment = Environment::load()?;
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(sentry_config.dsn.parse()?),
            environment: Some(environment.to_string().into()),
            traces_sample_rate: 1.0,
            max_request_body_size: sentry::MaxRequestBodySize::Always,
            integrations: vec![Arc::new(
                sentry::integrations::panic::PanicIntegration::new(),
            )],
            ..Default::default()
        });

        // Set a service tag to differentiate the API from other services.
        sentry::configure_scope(|scope| {
            scope.set_tag("service", "api");
        });

        return Ok(Some(guard));
    }

    info!("sentry not configured for api, skipping initialization");

    Ok(None)
}

fn log_application_config(config: &ApiConfig) {
    info!(
        host = config.application.host,
        port = config.application.port,
        cluster = config.cluster.name,
        namespace = config.cluster.namespace,
        version = config.cluster.version,
        "application options",
    );
}
