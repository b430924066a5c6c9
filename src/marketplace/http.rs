use super::ClientError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("factory-queue/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client shared by the marketplace adapters. Every request
/// carries the configured auth headers and is bounded by `timeout`.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            headers: HeaderMap::new(),
        })
    }

    /// Attach a header sent with every request. Values are marked sensitive so
    /// they never show up in debug output.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, ClientError> {
        let mut value = HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name))?;
        value.set_sensitive(true);
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path)?;
        self.execute(self.http.get(url)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        self.execute(self.http.post(url).json(body)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let request = request.headers(self.headers.clone()).build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "marketplace request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%method, %url, %status, "marketplace API error");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_absolute_paths_onto_the_host() {
        let client = RestClient::new("https://api.example.com", Duration::from_secs(1)).unwrap();
        let url = client.url("/api/v3/supplies?limit=10&next=0").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v3/supplies?limit=10&next=0");
    }

    #[test]
    fn rejects_bad_base_url_and_header() {
        assert!(matches!(
            RestClient::new("not a url", Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
        let client = RestClient::new("https://api.example.com", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.with_header("authorization", "bad\nvalue"),
            Err(ClientError::InvalidHeader("authorization"))
        ));
    }

    #[test]
    fn debug_output_hides_headers() {
        let client = RestClient::new("https://api.example.com", Duration::from_secs(1))
            .unwrap()
            .with_header("authorization", "secret-token")
            .unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
