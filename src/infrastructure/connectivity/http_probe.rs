use std::time::Duration;

use reqwest::Client;
use tracing::trace;

use crate::domain::ports::ConnectivityProbe;

/// Default timeout for a single reachability check.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Treats the backend as reachable when a GET on `url` gets any response
/// below 500. Timeouts, connect failures and server errors are unreachable.
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
}

impl HttpReachabilityProbe {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// URL that is probed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for HttpReachabilityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                trace!(url = %self.url, status = %status, "Reachability probe answered");
                !status.is_server_error()
            }
            Err(e) => {
                trace!(url = %self.url, error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let probe =
            HttpReachabilityProbe::new("http://127.0.0.1:9/health", Duration::from_secs(1))
                .unwrap();
        assert!(!probe.is_reachable().await);
    }
}
