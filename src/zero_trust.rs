mod http;
mod interface;
mod types;

pub use http::ZeroTrustClient;
pub use interface::ZeroTrustApi;
pub use types::{
    merge_exclude, Account, DeviceProfile, ProfileOutcome, ReconcileSummary, SplitTunnelEntry,
    MANAGED_MARKER,
};

use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::metrics::PROFILE_UPDATES_COUNTER;
use crate::rate_limit::Pacer;

/// Applies the given IP list to every compatible profile of one account.
///
/// Profiles are processed sequentially; a failure on one profile is recorded
/// and the loop moves on, so a single bad profile cannot block the rest.
/// Include-mode profiles are skipped before any mutation. The pacer pause
/// follows every mutation to stay under upstream rate limits.
#[instrument(skip(api, ips, pacer))]
pub async fn reconcile_account(
    api: &impl ZeroTrustApi,
    account_id: &str,
    ips: &[String],
    pacer: &Pacer,
) -> Result<ReconcileSummary> {
    let profiles = api.list_profiles(account_id).await?;
    info!(profiles = profiles.len(), "reconciling account profiles");

    let mut summary = ReconcileSummary::default();
    for profile in profiles {
        let is_default = profile.is_default();
        let policy_id = if is_default {
            None
        } else {
            profile.policy_id.as_deref()
        };
        let name = profile.display_name();

        let details = match api.get_profile(account_id, policy_id).await {
            Ok(details) => details,
            Err(err) => {
                error!(profile = %name, %err, "failed to fetch profile details");
                summary.failed += 1;
                summary.outcomes.push(ProfileOutcome::failed(
                    policy_id.map(String::from),
                    name,
                    err.to_string(),
                ));
                PROFILE_UPDATES_COUNTER.with_label_values(&["failed"]).inc();
                continue;
            }
        };

        if details.is_include_mode() {
            info!(profile = %name, "skipping include-mode profile");
            summary.outcomes.push(ProfileOutcome::skipped(
                policy_id.map(String::from),
                name,
                "include mode incompatible",
            ));
            PROFILE_UPDATES_COUNTER
                .with_label_values(&["skipped"])
                .inc();
            continue;
        }

        match api.update_profile_exclude(account_id, policy_id, ips).await {
            Ok(()) => {
                summary.updated += 1;
                summary
                    .outcomes
                    .push(ProfileOutcome::updated(policy_id.map(String::from), name));
                PROFILE_UPDATES_COUNTER
                    .with_label_values(&["updated"])
                    .inc();
            }
            Err(err) => {
                warn!(profile = %name, %err, "profile update failed");
                summary.failed += 1;
                summary.outcomes.push(ProfileOutcome::failed(
                    policy_id.map(String::from),
                    name,
                    err.to_string(),
                ));
                PROFILE_UPDATES_COUNTER.with_label_values(&["failed"]).inc();
            }
        }
        pacer.pause().await;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use mockito::{Server, ServerGuard};
    use serde_json::json;

    use super::*;

    fn client(mock: &ServerGuard) -> ZeroTrustClient {
        let url = format!("http://{}/", mock.host_with_port());
        ZeroTrustClient::new(url.parse().unwrap(), String::from("token"), None)
    }

    fn profile_body(policy_id: &str, name: &str) -> serde_json::Value {
        json!({
            "success": true,
            "result": {"policy_id": policy_id, "name": name, "exclude": []},
            "errors": []
        })
    }

    fn mock_profile_update(server: &mut ServerGuard, policy_id: &str, name: &str) -> Vec<mockito::Mock> {
        vec![
            server
                .mock(
                    "GET",
                    format!("/accounts/a1/devices/policy/{policy_id}").as_str(),
                )
                .with_status(200)
                .with_body(profile_body(policy_id, name).to_string())
                .expect(2)
                .create(),
            server
                .mock(
                    "PUT",
                    format!("/accounts/a1/devices/policy/{policy_id}/exclude").as_str(),
                )
                .with_status(200)
                .with_body(json!({"success": true, "result": [], "errors": []}).to_string())
                .expect(1)
                .create(),
        ]
    }

    #[tokio::test]
    async fn one_bad_profile_does_not_abort_the_rest() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/a1/devices/policies")
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "result": [
                        {"policy_id": "p1", "name": "One"},
                        {"policy_id": "p2", "name": "Two"},
                        {"policy_id": "p3", "name": "Three"}
                    ],
                    "errors": []
                })
                .to_string(),
            )
            .create();

        let ok1 = mock_profile_update(&mut server, "p1", "One");
        let ok3 = mock_profile_update(&mut server, "p3", "Three");
        // p2 details load, but the exclude write is rejected
        let bad_details = server
            .mock("GET", "/accounts/a1/devices/policy/p2")
            .with_status(200)
            .with_body(profile_body("p2", "Two").to_string())
            .expect(2)
            .create();
        let bad_put = server
            .mock("PUT", "/accounts/a1/devices/policy/p2/exclude")
            .with_status(500)
            .with_body("upstream exploded")
            .create();

        let summary = reconcile_account(
            &client(&server),
            "a1",
            &[String::from("1.1.1.1")],
            &Pacer::disabled(),
        )
        .await
        .unwrap();

        for mock in ok1.iter().chain(ok3.iter()) {
            mock.assert();
        }
        bad_details.assert();
        bad_put.assert();

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.success());
        let failed: Vec<_> = summary.outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].profile_name, "Two");
    }

    #[tokio::test]
    async fn include_mode_profiles_are_skipped_not_updated() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/a1/devices/policies")
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "result": [{"policy_id": "p1", "name": "Split include"}],
                    "errors": []
                })
                .to_string(),
            )
            .create();
        server
            .mock("GET", "/accounts/a1/devices/policy/p1")
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "result": {
                        "policy_id": "p1",
                        "name": "Split include",
                        "include": [{"address": "10.0.0.0/8", "description": "office"}]
                    },
                    "errors": []
                })
                .to_string(),
            )
            .create();
        let never_put = server
            .mock("PUT", "/accounts/a1/devices/policy/p1/exclude")
            .expect(0)
            .create();

        let summary = reconcile_account(
            &client(&server),
            "a1",
            &[String::from("1.1.1.1")],
            &Pacer::disabled(),
        )
        .await
        .unwrap();

        never_put.assert();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.failed, 0);
        assert!(summary.success());
        assert_eq!(
            summary.outcomes[0].skipped.as_deref(),
            Some("include mode incompatible")
        );
    }

    #[tokio::test]
    async fn default_profile_resolves_to_account_endpoint() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/a1/devices/policies")
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "result": [{"default": true}],
                    "errors": []
                })
                .to_string(),
            )
            .create();
        let details = server
            .mock("GET", "/accounts/a1/devices/policy")
            .with_status(200)
            .with_body(
                json!({"success": true, "result": {"default": true, "exclude": []}, "errors": []})
                    .to_string(),
            )
            .expect(2)
            .create();
        let put = server
            .mock("PUT", "/accounts/a1/devices/policy/exclude")
            .with_status(200)
            .with_body(json!({"success": true, "result": [], "errors": []}).to_string())
            .create();

        let summary = reconcile_account(
            &client(&server),
            "a1",
            &[String::from("1.1.1.1")],
            &Pacer::disabled(),
        )
        .await
        .unwrap();

        details.assert();
        put.assert();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.outcomes[0].profile_name, "default");
        assert_eq!(summary.outcomes[0].profile_id, None);
    }
}
