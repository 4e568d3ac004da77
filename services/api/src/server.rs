use crate::cli::ServeArgs;
use crate::infra::{in_memory_marketplace, AppState};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use gig_hire::config::AppConfig;
use gig_hire::error::AppError;
use gig_hire::marketplace::{Admissions, OriginPolicy, SlidingWindowGate};
use gig_hire::telemetry;
use std::net::SocketAddr;
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

    let (service, _store) = in_memory_marketplace(&config.hiring);
    let admissions = Admissions::new(
        Arc::new(SlidingWindowGate::new(config.hiring.admission)),
        Arc::new(SlidingWindowGate::new(config.hiring.bid_admission)),
        OriginPolicy::from_trust(config.hiring.trust_forwarded),
    );

    let app = with_marketplace_routes(service, admissions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        tx_timeout_ms = config.hiring.transaction_timeout.as_millis() as u64,
        rate_limit = config.hiring.admission.max_attempts,
        bid_rate_limit = config.hiring.bid_admission.max_attempts,
        trust_forwarded = config.hiring.trust_forwarded,
        "gig hire api ready"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
