use serde::{Deserialize, Serialize};

/// Description stamped on every exclude entry this job owns. Any existing
/// entry whose description contains "zoom" (case-insensitive) is treated as
/// ours and replaced on the next merge; everything else is foreign and must
/// survive untouched.
pub const MANAGED_MARKER: &str = "Zoom IP Range (managed by warp-zoom-sync)";

fn unknown_account_name() -> String {
    String::from("Unknown")
}

/// Provider response envelope: `result` is absent on failures, `errors`
/// carries the structured error payload, `result_info` only appears on
/// paginated listings.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result_info: Option<ResultInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiMessage {
    pub code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_count: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub id: String,
    #[serde(default = "unknown_account_name")]
    pub name: String,
}

/// One split tunnel entry. The provider accepts either an address or a
/// hostname per entry; host entries are always foreign to this job but have
/// to round-trip through merges unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SplitTunnelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SplitTunnelEntry {
    pub fn managed(ip: &str) -> Self {
        Self {
            address: Some(ip.to_string()),
            host: None,
            description: Some(MANAGED_MARKER.to_string()),
        }
    }

    pub fn is_managed(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.to_ascii_lowercase().contains("zoom"))
    }
}

/// Raw device profile shape. Fields the provider omits stay `None`; display
/// names substitute "default" / "Unknown Profile".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub include: Option<Vec<SplitTunnelEntry>>,
    #[serde(default)]
    pub exclude: Option<Vec<SplitTunnelEntry>>,
}

impl DeviceProfile {
    pub fn is_default(&self) -> bool {
        self.default || self.policy_id.is_none()
    }

    /// A profile with a non-empty include list tunnels only the listed
    /// networks; exclude entries are meaningless there.
    pub fn is_include_mode(&self) -> bool {
        self.include.as_ref().is_some_and(|list| !list.is_empty())
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ if self.is_default() => String::from("default"),
            _ => String::from("Unknown Profile"),
        }
    }
}

/// Foreign entries in their original order, then one managed entry per input
/// IP. Stale managed entries are dropped rather than updated, which is what
/// makes repeated merges idempotent.
pub fn merge_exclude(existing: Vec<SplitTunnelEntry>, ips: &[String]) -> Vec<SplitTunnelEntry> {
    let mut merged: Vec<SplitTunnelEntry> = existing
        .into_iter()
        .filter(|entry| !entry.is_managed())
        .collect();
    merged.extend(ips.iter().map(|ip| SplitTunnelEntry::managed(ip)));
    merged
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileOutcome {
    pub profile_id: Option<String>,
    pub profile_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl ProfileOutcome {
    pub fn updated(profile_id: Option<String>, profile_name: String) -> Self {
        Self {
            profile_id,
            profile_name,
            success: true,
            error: None,
            skipped: None,
        }
    }

    pub fn failed(profile_id: Option<String>, profile_name: String, error: String) -> Self {
        Self {
            profile_id,
            profile_name,
            success: false,
            error: Some(error),
            skipped: None,
        }
    }

    pub fn skipped(profile_id: Option<String>, profile_name: String, reason: &str) -> Self {
        Self {
            profile_id,
            profile_name,
            success: true,
            error: None,
            skipped: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileSummary {
    pub updated: u32,
    pub failed: u32,
    pub outcomes: Vec<ProfileOutcome>,
}

impl ReconcileSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}
