use std::future::Future;
use std::time::Duration;

/// Upper bound on every outbound call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

/// A minimal HTTP request representation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A minimal HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for sending HTTP requests. Implementations must be `Send + Sync`
/// so they can be shared across request handlers.
pub trait HttpClient: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>>> + Send;
}

#[cfg(feature = "reqwest-client")]
mod reqwest_impl {
    use super::{HttpClient, HttpMethod, HttpRequest, HttpResponse, REQUEST_TIMEOUT};

    pub struct ReqwestClient {
        inner: reqwest::Client,
    }

    impl ReqwestClient {
        /// Builds a client bounded by [`REQUEST_TIMEOUT`].
        pub fn new() -> Result<Self, reqwest::Error> {
            let inner = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(REQUEST_TIMEOUT)
                .user_agent(concat!("ivao-discord-link/", env!("CARGO_PKG_VERSION")))
                .build()?;
            Ok(Self { inner })
        }

        pub fn from_client(inner: reqwest::Client) -> Self {
            Self { inner }
        }
    }

    impl HttpClient for ReqwestClient {
        async fn send(
            &self,
            req: HttpRequest,
        ) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
            let mut builder = match req.method {
                HttpMethod::Get => self.inner.get(&req.url),
                HttpMethod::Post => self.inner.post(&req.url),
                HttpMethod::Put => self.inner.put(&req.url),
            };

            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }

            if !req.body.is_empty() {
                builder = builder.body(req.body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();

            Ok(HttpResponse { status, body })
        }
    }
}

#[cfg(feature = "reqwest-client")]
pub use reqwest_impl::ReqwestClient;
