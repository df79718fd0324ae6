use std::time::Duration;

use reqwest::{Client, Url};
use tracing::{info, instrument};

use super::interface::IpListSource;
use super::types::{parse_ip_list, IpListSnapshot};
use crate::error::Result;
use crate::metrics::OUTGOING_REQUESTS_COUNTER;
use crate::retry::RetryPolicy;
use crate::USER_AGENT;

/// Fetches the published Zoom meeting-traffic ranges as plain text.
#[derive(Debug)]
pub struct ZoomIpClient {
    client: Client,
    source_url: Url,
    retry: RetryPolicy,
}

impl ZoomIpClient {
    pub fn new(source_url: Url, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build client");
        Self {
            client,
            source_url,
            retry,
        }
    }

    async fn get_body(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.source_url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

impl IpListSource for ZoomIpClient {
    #[instrument(skip(self))]
    async fn fetch_ip_list(&self) -> Result<IpListSnapshot> {
        let body = self
            .retry
            .execute("fetch_ip_list", || self.get_body())
            .await?;

        OUTGOING_REQUESTS_COUNTER
            .with_label_values(&["ZOOM", self.source_url.path()])
            .inc();

        let ips = parse_ip_list(&body);
        info!(count = ips.len(), "retrieved ip list");
        Ok(IpListSnapshot::new(ips, self.source_url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Server;

    use super::*;
    use crate::error::Error;

    fn client(mock: &Server, max_retries: u32) -> ZoomIpClient {
        let url = format!("http://{}/ipranges/zoom.txt", mock.host_with_port());
        ZoomIpClient::new(
            url.parse().unwrap(),
            RetryPolicy::new(max_retries, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn fetches_and_parses_list() {
        let mut server = Server::new_async().await;
        let body = "# Zoom ranges\n3.7.35.0/25\n1.2.3.4\nnot-an-ip\n";
        let mock = server
            .mock("GET", "/ipranges/zoom.txt")
            .with_status(200)
            .with_body(body)
            .create();

        let snapshot = client(&server, 3).fetch_ip_list().await.unwrap();
        mock.assert();
        assert_eq!(snapshot.ips, vec!["3.7.35.0/25", "1.2.3.4"]);
        assert_eq!(snapshot.total_count, 2);
        assert!(snapshot.source_url.ends_with("/ipranges/zoom.txt"));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_attempt_count() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ipranges/zoom.txt")
            .with_status(503)
            .expect(3)
            .create();

        let err = client(&server, 3).fetch_ip_list().await.unwrap_err();
        mock.assert();
        match err {
            Error::Fetch { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }
}
