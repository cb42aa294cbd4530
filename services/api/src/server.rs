use crate::cli::ServeArgs;
use crate::infra::{bootstrap, open_store, AppState};
use crate::routes::with_shortlist_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use edu_program::error::AppError;
use edu_program::workflows::shortlist::ShortlistService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = bootstrap(args.database.take())?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.database)?;
    let shortlist_service = Arc::new(ShortlistService::new(store));

    let app = with_shortlist_routes(shortlist_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, database = %config.database.path.display(), "shortlisting service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
