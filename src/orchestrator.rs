use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::ip_source::{IpListSnapshot, IpListSource};
use crate::metrics::EXCLUDED_IPS_GAUGE;
use crate::store::{self, keys, KvStore};
use crate::zero_trust::{reconcile_account, ProfileOutcome, ReconcileSummary};
use crate::App;

/// Results kept in the persisted history, newest first.
pub const HISTORY_LIMIT: usize = 50;

/// How often the scheduled loop re-evaluates `is_update_needed`.
pub const SCHEDULE_CHECK_PERIOD: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    pub account_id: Option<String>,
    #[serde(default)]
    pub force_fetch: bool,
}

/// The account a pass acts on. Name is only known when the selection came
/// through the API (which verifies it against the provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl SelectedAccount {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Outcome of one reconciliation pass. Immutable once recorded; stored both
/// as the last result and prepended to the bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub account_id: String,
    #[serde(default)]
    pub account_name: Option<String>,
    pub profiles_updated: u32,
    pub profiles_failed: u32,
    pub ip_count: usize,
    #[serde(default)]
    pub profiles: Vec<ProfileOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub no_change: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl UpdateResult {
    fn base(account: SelectedAccount, elapsed: Duration) -> Self {
        Self {
            success: true,
            account_id: account.id,
            account_name: account.name,
            profiles_updated: 0,
            profiles_failed: 0,
            ip_count: 0,
            profiles: Vec::new(),
            error: None,
            no_change: false,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    fn from_summary(
        account: SelectedAccount,
        snapshot: &IpListSnapshot,
        summary: ReconcileSummary,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: summary.success(),
            profiles_updated: summary.updated,
            profiles_failed: summary.failed,
            ip_count: snapshot.total_count,
            profiles: summary.outcomes,
            ..Self::base(account, elapsed)
        }
    }

    fn no_change(account: SelectedAccount, ip_count: usize, elapsed: Duration) -> Self {
        Self {
            ip_count,
            no_change: true,
            ..Self::base(account, elapsed)
        }
    }

    fn failure(account: SelectedAccount, err: &Error, elapsed: Duration) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            ..Self::base(account, elapsed)
        }
    }
}

/// Explicit request parameter first, then the environment-pinned account
/// (a fixed override), then whatever selection was persisted.
pub async fn resolve_target_account(
    app: &App,
    explicit: Option<&str>,
) -> Result<SelectedAccount> {
    if let Some(id) = explicit {
        return Ok(SelectedAccount::by_id(id));
    }
    if let Some(id) = &app.config.default_account_id {
        return Ok(SelectedAccount::by_id(id.clone()));
    }
    if let Some(selected) =
        store::get_json::<SelectedAccount>(app.store.as_ref(), keys::SELECTED_ACCOUNT).await?
    {
        return Ok(selected);
    }
    Err(Error::NoAccountSelected)
}

/// Runs one reconciliation pass. Everything past account resolution is
/// converted into a failed-but-persisted [`UpdateResult`]; the only error a
/// caller ever sees is [`Error::NoAccountSelected`].
#[instrument(skip(app, request))]
pub async fn run_update(
    app: &App,
    request: &UpdateRequest,
    trigger: Trigger,
) -> Result<UpdateResult> {
    let started = Instant::now();

    let account = match resolve_target_account(app, request.account_id.as_deref()).await {
        Ok(account) => account,
        Err(Error::NoAccountSelected) => return Err(Error::NoAccountSelected),
        Err(err) => {
            error!(%err, "account resolution failed");
            let result =
                UpdateResult::failure(SelectedAccount::by_id("unknown"), &err, started.elapsed());
            persist_result(app.store.as_ref(), &result).await;
            return Ok(result);
        }
    };

    let result = match execute_pass(app, &account, request, trigger, started).await {
        Ok(result) => result,
        Err(err) => {
            error!(account = %account.id, %err, "reconciliation pass failed");
            UpdateResult::failure(account, &err, started.elapsed())
        }
    };

    persist_result(app.store.as_ref(), &result).await;
    Ok(result)
}

async fn execute_pass(
    app: &App,
    account: &SelectedAccount,
    request: &UpdateRequest,
    trigger: Trigger,
    started: Instant,
) -> Result<UpdateResult> {
    let store = app.store.as_ref();
    let prior: Option<IpListSnapshot> = store::get_json(store, keys::IP_LIST).await?;

    // Scheduled runs always look upstream, otherwise new ranges would never
    // be observed; manual runs reuse the cache unless forced.
    let must_fetch = request.force_fetch || trigger == Trigger::Scheduled;
    let snapshot = match &prior {
        Some(cached) if !must_fetch => cached.clone(),
        _ => {
            let snapshot = app.zoom.fetch_ip_list().await?;
            store::put_json(store, keys::IP_LIST, &snapshot).await?;
            snapshot
        }
    };

    if !request.force_fetch {
        if let Some(prior) = &prior {
            if prior.same_ips(&snapshot) {
                info!(account = %account.id, "ip list unchanged, skipping profile updates");
                return Ok(UpdateResult::no_change(
                    account.clone(),
                    snapshot.total_count,
                    started.elapsed(),
                ));
            }
        }
    }

    let delta = crate::ip_source::diff(prior.as_ref(), &snapshot);
    info!(
        account = %account.id,
        added = delta.added.len(),
        removed = delta.removed.len(),
        unchanged = delta.unchanged,
        "applying ip list"
    );

    let summary =
        reconcile_account(&app.zero_trust, &account.id, &snapshot.ips, &app.pacer).await?;
    EXCLUDED_IPS_GAUGE.set(snapshot.total_count as i64);

    Ok(UpdateResult::from_summary(
        account.clone(),
        &snapshot,
        summary,
        started.elapsed(),
    ))
}

/// Stores the result under the last-result key and prepends it to the
/// bounded history. Read-modify-write; racy across overlapping invocations,
/// which the deployment model keeps serialized.
pub async fn record_result(store: &dyn KvStore, result: &UpdateResult) -> Result<()> {
    store::put_json(store, keys::LAST_RESULT, result).await?;

    let mut history: Vec<UpdateResult> = store::get_json(store, keys::HISTORY)
        .await?
        .unwrap_or_default();
    history.insert(0, result.clone());
    history.truncate(HISTORY_LIMIT);
    store::put_json(store, keys::HISTORY, &history).await
}

async fn persist_result(store: &dyn KvStore, result: &UpdateResult) {
    if let Err(err) = record_result(store, result).await {
        error!(%err, "failed to persist update result");
    }
}

/// Due when no pass has ever recorded a result, or when the configured
/// interval has elapsed since the last one.
pub async fn is_update_needed(store: &dyn KvStore, interval: Duration) -> Result<bool> {
    let last: Option<UpdateResult> = store::get_json(store, keys::LAST_RESULT).await?;
    Ok(match last {
        None => true,
        Some(last) => {
            let elapsed = Utc::now().signed_duration_since(last.timestamp);
            elapsed.num_seconds() >= interval.as_secs() as i64
        }
    })
}

/// Interval-driven trigger. Failures are logged and swallowed; the loop
/// itself never terminates.
pub async fn scheduled_loop(app: Arc<App>) -> std::result::Result<(), anyhow::Error> {
    info!(
        check_period_secs = SCHEDULE_CHECK_PERIOD.as_secs(),
        interval_secs = app.config.update_interval.as_secs(),
        "starting scheduled update loop"
    );
    loop {
        match is_update_needed(app.store.as_ref(), app.config.update_interval).await {
            Ok(true) => {
                match run_update(&app, &UpdateRequest::default(), Trigger::Scheduled).await {
                    Ok(result) => info!(
                        success = result.success,
                        updated = result.profiles_updated,
                        failed = result.profiles_failed,
                        no_change = result.no_change,
                        "scheduled update finished"
                    ),
                    Err(Error::NoAccountSelected) => {
                        debug!("no account selected, skipping scheduled update");
                    }
                    Err(err) => error!(%err, "scheduled update failed"),
                }
            }
            Ok(false) => debug!("scheduled update not due yet"),
            Err(err) => error!(%err, "failed to evaluate update schedule"),
        }
        tokio::time::sleep(SCHEDULE_CHECK_PERIOD).await;
    }
}
