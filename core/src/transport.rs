//! The single point where requests meet the network.
//!
//! # Design
//! `Transport::send` returns `Ok` for every response the server produced,
//! whatever its status code. Failures carry a structural classification so the
//! dispatcher can tell a certificate problem (permanent) from a dropped
//! connection (retryable) without inspecting error text. A failure after the
//! response head arrived is `ResponseBody`: the appliance already acted on the
//! request, so it must not be sent again.

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};

/// Marker that TLS stacks put in certificate-validation error messages.
const X509_MARKER: &str = "x509: ";

/// Why a request never produced a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer certificate failed validation.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// The connection could not be established or was dropped before a
    /// response head arrived.
    #[error("connection error: {0}")]
    Connection(String),

    /// Status and headers arrived, the body could not be read.
    #[error("response body error: {0}")]
    ResponseBody(String),
}

impl TransportError {
    /// Classify a transport that only exposes error text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(X509_MARKER) {
            TransportError::Certificate(message)
        } else {
            TransportError::Connection(message)
        }
    }
}

/// Executes one `HttpRequest`.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "ureq")]
mod ureq_transport {
    use std::fmt;
    use std::time::Duration;

    use ureq::tls::TlsConfig;
    use ureq::Agent;

    use super::{Transport, TransportError};
    use crate::credentials::Credentials;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    /// Blocking transport backed by a `ureq` agent.
    ///
    /// HTTP error statuses are returned as data; the dispatcher never retries
    /// on status codes. Bodies are read as bytes with no size limit unless
    /// `with_body_limit` sets one.
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: Agent,
        body_limit: u64,
    }

    impl fmt::Debug for UreqTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("UreqTransport")
                .field("body_limit", &self.body_limit)
                .finish_non_exhaustive()
        }
    }

    impl UreqTransport {
        pub fn new(insecure_tls: bool, timeout: Option<Duration>) -> Self {
            let agent = Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .tls_config(
                    TlsConfig::builder()
                        .disable_verification(insecure_tls)
                        .build(),
                )
                .build()
                .new_agent();
            Self {
                agent,
                body_limit: u64::MAX,
            }
        }

        /// Transport honouring `creds.insecure_tls`, without a timeout.
        pub fn for_credentials(creds: &Credentials) -> Self {
            Self::new(creds.insecure_tls, None)
        }

        /// Refuse response bodies larger than `limit` bytes. Exceeding it is a
        /// `ResponseBody` error.
        pub fn with_body_limit(mut self, limit: u64) -> Self {
            self.body_limit = limit;
            self
        }
    }

    impl Transport for UreqTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let url = request.url.as_str();
            let result = match request.method {
                HttpMethod::Get => {
                    let mut builder = self.agent.get(url);
                    for (k, v) in &request.headers {
                        builder = builder.header(k.as_str(), v.as_str());
                    }
                    builder.call()
                }
                HttpMethod::Delete => {
                    let mut builder = self.agent.delete(url);
                    for (k, v) in &request.headers {
                        builder = builder.header(k.as_str(), v.as_str());
                    }
                    match &request.body {
                        Some(body) => builder.force_send_body().send(body.as_slice()),
                        None => builder.call(),
                    }
                }
                HttpMethod::Post | HttpMethod::Put => {
                    let mut builder = if request.method == HttpMethod::Post {
                        self.agent.post(url)
                    } else {
                        self.agent.put(url)
                    };
                    for (k, v) in &request.headers {
                        builder = builder.header(k.as_str(), v.as_str());
                    }
                    match &request.body {
                        Some(body) => builder.send(body.as_slice()),
                        None => builder.send_empty(),
                    }
                }
            };

            let mut response = result.map_err(classify)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .with_config()
                .limit(self.body_limit)
                .read_to_vec()
                .map_err(|e| TransportError::ResponseBody(e.to_string()))?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    /// Classify a failure that happened before the response head arrived.
    fn classify(err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::Tls(msg) => TransportError::Certificate(msg.to_string()),
            ureq::Error::Rustls(tls) => TransportError::Certificate(tls.to_string()),
            // rustls surfaces handshake failures as io errors wrapping its own error.
            ureq::Error::Io(io) => match io
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            {
                Some(tls) => TransportError::Certificate(tls.to_string()),
                None => TransportError::from_message(io.to_string()),
            },
            other => TransportError::from_message(other.to_string()),
        }
    }

}
