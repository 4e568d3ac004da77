use gig_hire::config::HiringConfig;
use gig_hire::marketplace::{InMemoryEntityStore, MarketplaceService};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Marketplace service over the process-local entity store. The store handle is
/// returned too so callers can inspect committed state.
pub(crate) fn in_memory_marketplace(
    config: &HiringConfig,
) -> (
    Arc<MarketplaceService<InMemoryEntityStore>>,
    Arc<InMemoryEntityStore>,
) {
    let store = Arc::new(InMemoryEntityStore::new());
    let service = Arc::new(MarketplaceService::new(Arc::clone(&store), config));
    (service, store)
}
