use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use reqwest::Url;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Bearer token for device policy reads and writes
    #[arg(long, env = "ZERO_TRUST_API_TOKEN")]
    pub api_token: String,

    /// Optional token with account:read scope for the account listing call;
    /// falls back to the policy token when unset
    #[arg(long, env = "ZERO_TRUST_ACCOUNT_TOKEN")]
    pub account_token: Option<String>,

    /// Base URL of the zero trust API; must end with a trailing slash
    #[arg(
        long,
        env = "ZERO_TRUST_API_URL",
        default_value = "https://api.cloudflare.com/client/v4/"
    )]
    pub api_url: Url,

    /// Published Zoom IP range list
    #[arg(
        long,
        env = "ZOOM_IP_SOURCE_URL",
        default_value = "https://assets.zoom.us/docs/ipranges/Zoom.txt"
    )]
    pub source_url: Url,

    /// Pin the target account, overriding any selection made via the API
    #[arg(long, env = "ZERO_TRUST_ACCOUNT_ID")]
    pub account_id: Option<String>,

    #[arg(long, env = "UPDATE_INTERVAL_HOURS", default_value_t = 24)]
    pub update_interval_hours: u64,

    #[arg(long, env = "MAX_FETCH_RETRIES", default_value_t = 3)]
    pub max_fetch_retries: u32,

    /// JSON state file; state is kept in memory only when unset
    #[arg(long, env = "STATE_FILE")]
    pub state_file: Option<PathBuf>,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
}
