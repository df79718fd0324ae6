use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use warp_zoom_sync::cli::Cli;
use warp_zoom_sync::http_api;
use warp_zoom_sync::ip_source::ZoomIpClient;
use warp_zoom_sync::orchestrator::scheduled_loop;
use warp_zoom_sync::retry::RetryPolicy;
use warp_zoom_sync::store::{FileKvStore, KvStore, MemoryKvStore};
use warp_zoom_sync::tracing_setup::{get_subscriber, init_subscriber};
use warp_zoom_sync::zero_trust::ZeroTrustClient;
use warp_zoom_sync::{App, Config};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber(String::from("warp-zoom-sync"), String::from("info"));
    init_subscriber(subscriber);

    let args = Cli::parse();

    let zoom = ZoomIpClient::new(
        args.source_url.clone(),
        RetryPolicy::new(args.max_fetch_retries, Duration::from_secs(2)),
    );
    let zero_trust = ZeroTrustClient::new(
        args.api_url.clone(),
        args.api_token.clone(),
        args.account_token.clone(),
    );
    let store: Arc<dyn KvStore> = match &args.state_file {
        Some(path) => Arc::new(FileKvStore::open(path).await?),
        None => Arc::new(MemoryKvStore::new()),
    };
    let config = Config {
        update_interval: Duration::from_secs(args.update_interval_hours * 3600),
        default_account_id: args.account_id.clone(),
    };
    let app = Arc::new(App::new(zoom, zero_trust, store, config));

    let server = http_api::serve(app.clone(), args.listen);

    let mut task_set = tokio::task::JoinSet::new();
    task_set.spawn(scheduled_loop(app));
    task_set.spawn(async { Ok(server.await?) });

    while let Some(res) = task_set.join_next().await {
        res??;
    }

    info!("Exit!");

    Ok(())
}
