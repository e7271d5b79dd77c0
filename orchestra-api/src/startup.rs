use std::{net::TcpListener, sync::Arc};

use actix_web::{App, HttpServer, dev::Server, web};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::ApiConfig,
    k8s::{K8sClient, http::HttpK8sClient},
    routes::{
        ErrorMessage,
        ctl::{PrePullImagesResponse, images_to_pre_pull, restart, start_update},
        health_check::health_check,
        settings::{SettingsUpdateResponse, read_settings, replace_settings, update_settings},
    },
};

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Builds the application: binds the listener, constructs the
    /// Kubernetes client once, and assembles the server.
    pub async fn build(config: ApiConfig) -> Result<Self, anyhow::Error> {
        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let k8s_client =
            Arc::new(HttpK8sClient::new(&config.cluster.namespace).await?) as Arc<dyn K8sClient>;

        let server = run(config, listener, k8s_client).await?;

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Assembles the actix server with all routes and shared state.
///
/// The Kubernetes client is injected as a trait object so tests can run the
/// full HTTP stack against a mock without a cluster.
pub async fn run(
    config: ApiConfig,
    listener: TcpListener,
    k8s_client: Arc<dyn K8sClient>,
) -> Result<Server, anyhow::Error> {
    let config = web::Data::new(config);
    let k8s_client: web::Data<dyn K8sClient> = web::Data::from(k8s_client);

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::health_check::health_check,
            crate::routes::ctl::start_update,
            crate::routes::ctl::restart,
            crate::routes::ctl::images_to_pre_pull,
            crate::routes::settings::read_settings,
            crate::routes::settings::update_settings,
            crate::routes::settings::replace_settings,
        ),
        components(schemas(
            ErrorMessage,
            PrePullImagesResponse,
            SettingsUpdateResponse,
        ))
    )]
    struct ApiDoc;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .service(health_check)
            .service(start_update)
            .service(restart)
            .service(images_to_pre_pull)
            .service(read_settings)
            .service(update_settings)
            .service(replace_settings)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            .app_data(config.clone())
            .app_data(k8s_client.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
