use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::interface::ZeroTrustApi;
use super::types::{merge_exclude, Account, ApiEnvelope, DeviceProfile};
use crate::error::{Error, Result};
use crate::metrics::OUTGOING_REQUESTS_COUNTER;
use crate::USER_AGENT;

const PAGE_SIZE: u32 = 50;

/// Bearer-token client for the zero trust account/device-policy API. An
/// optional second token covers deployments where account enumeration needs
/// broader scope than policy edits.
#[derive(Debug)]
pub struct ZeroTrustClient {
    client: Client,
    base: Url,
    api_token: String,
    account_token: Option<String>,
}

impl ZeroTrustClient {
    /// `base` must end with a trailing slash so relative paths join under it.
    pub fn new(base: Url, api_token: String, account_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build client");
        Self {
            client,
            base,
            api_token,
            account_token,
        }
    }

    fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("invalid url")
    }

    fn account_token(&self) -> &str {
        self.account_token.as_deref().unwrap_or(&self.api_token)
    }

    fn profile_path(account_id: &str, policy_id: Option<&str>) -> String {
        match policy_id {
            Some(pid) => format!("accounts/{account_id}/devices/policy/{pid}"),
            None => format!("accounts/{account_id}/devices/policy"),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiEnvelope<T>> {
        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|env| env.errors.into_iter().next())
                .map(|err| err.message)
                .unwrap_or(body);
            return Err(Error::api(Some(status.as_u16()), message));
        }

        let envelope: ApiEnvelope<T> = resp.json().await?;
        if !envelope.success {
            let message = envelope
                .errors
                .first()
                .map(|err| err.message.clone())
                .unwrap_or_else(|| String::from("api reported failure"));
            return Err(Error::api(Some(status.as_u16()), message));
        }
        Ok(envelope)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        f: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<ApiEnvelope<T>> {
        let request = self.client.get(self.url(path)).bearer_auth(token);
        self.send(f(request)).await
    }

    async fn put<T: DeserializeOwned, P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
    ) -> Result<ApiEnvelope<T>> {
        let request = self
            .client
            .put(self.url(path))
            .bearer_auth(&self.api_token)
            .json(payload);
        self.send(request).await
    }
}

impl ZeroTrustApi for ZeroTrustClient {
    #[instrument(skip(self))]
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = Vec::new();
        let mut page = 1u32;

        loop {
            let envelope = self
                .get::<Vec<Account>>("accounts", self.account_token(), |req| {
                    req.query(&[("page", page), ("per_page", PAGE_SIZE)])
                })
                .await?;

            OUTGOING_REQUESTS_COUNTER
                .with_label_values(&["ZERO_TRUST", "accounts"])
                .inc();

            let batch = envelope.result.unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            accounts.extend(batch);

            let total = envelope
                .result_info
                .map(|info| info.total_count as usize)
                .unwrap_or(accounts.len());
            if accounts.len() >= total {
                break;
            }
            page += 1;
        }

        debug!(count = accounts.len(), "listed accounts");
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_profiles(&self, account_id: &str) -> Result<Vec<DeviceProfile>> {
        let path = format!("accounts/{account_id}/devices/policies");
        let envelope = self
            .get::<serde_json::Value>(&path, &self.api_token, |req| req)
            .await?;

        OUTGOING_REQUESTS_COUNTER
            .with_label_values(&["ZERO_TRUST", "devices/policies"])
            .inc();

        // Some tenants return null or an object here instead of a list.
        match envelope.result {
            Some(value @ serde_json::Value::Array(_)) => Ok(serde_json::from_value(value)?),
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    async fn get_profile(
        &self,
        account_id: &str,
        policy_id: Option<&str>,
    ) -> Result<DeviceProfile> {
        let path = Self::profile_path(account_id, policy_id);
        let envelope = self
            .get::<DeviceProfile>(&path, &self.api_token, |req| req)
            .await?;

        OUTGOING_REQUESTS_COUNTER
            .with_label_values(&["ZERO_TRUST", "devices/policy"])
            .inc();

        envelope
            .result
            .ok_or_else(|| Error::api(None, "profile response had no result"))
    }

    #[instrument(skip(self, ips))]
    async fn update_profile_exclude(
        &self,
        account_id: &str,
        policy_id: Option<&str>,
        ips: &[String],
    ) -> Result<()> {
        let current = self.get_profile(account_id, policy_id).await?;
        let merged = merge_exclude(current.exclude.unwrap_or_default(), ips);

        let path = format!("{}/exclude", Self::profile_path(account_id, policy_id));
        self.put::<serde_json::Value, _>(&path, &merged).await?;

        OUTGOING_REQUESTS_COUNTER
            .with_label_values(&["ZERO_TRUST", "devices/policy/exclude"])
            .inc();
        Ok(())
    }
}
