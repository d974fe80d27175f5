use crate::cli::ServeArgs;
use crate::infra::{seed_roster, AppState};
use crate::routes::with_grading_routes;
use academia::config::AppConfig;
use academia::error::AppError;
use academia::grading::{AverageCalculator, Gradebook, InMemoryGradebook};
use academia::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = Arc::new(InMemoryGradebook::default());
    if args.seed_roster {
        seed_roster(&backend)?;
        info!("sample roster loaded");
    }
    let calculator = AverageCalculator::new(config.grading.grading_scale);
    let gradebook = Arc::new(Gradebook::new(backend, calculator));

    let app = with_grading_routes(gradebook)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        grading_scale = config.grading.grading_scale,
        "gradebook service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
