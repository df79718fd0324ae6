pub mod cli;
pub mod error;
pub mod http_api;
pub mod ip_source;
pub mod metrics;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod tracing_setup;
pub mod zero_trust;

use std::sync::Arc;
use std::time::Duration;

use ip_source::ZoomIpClient;
use rate_limit::Pacer;
use store::KvStore;
use zero_trust::ZeroTrustClient;

pub(crate) const USER_AGENT: &str = "warp-zoom-sync/v0.1.0";

pub struct App {
    pub zoom: ZoomIpClient,
    pub zero_trust: ZeroTrustClient,
    pub store: Arc<dyn KvStore>,
    pub pacer: Pacer,
    pub config: Config,
}

pub struct Config {
    pub update_interval: Duration,
    /// Environment-pinned target account; outranks persisted selection.
    pub default_account_id: Option<String>,
}

impl App {
    pub fn new(
        zoom: ZoomIpClient,
        zero_trust: ZeroTrustClient,
        store: Arc<dyn KvStore>,
        config: Config,
    ) -> Self {
        Self {
            zoom,
            zero_trust,
            store,
            pacer: Pacer::default(),
            config,
        }
    }
}
