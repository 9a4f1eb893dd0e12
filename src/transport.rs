//! HTTP access to the API server.
//!
//! The engine is generic over [`Transport`] the same way a resolver is
//! generic over its file system: production talks HTTP, tests hand the
//! engine canned XML. Implementations own credential injection and cookie
//! storage; callers own URL construction and body interpretation.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::FsError;

/// A streaming response body.
pub type Body = Box<dyn Read + Send>;

/// What the engine needs from the network.
pub trait Transport: Send + Sync {
    /// GET a URL, returning the body. Non-2xx responses are errors.
    fn get(&self, url: &str) -> Result<Body, FsError>;

    /// PUT `body` to a URL, returning the response body. The server answers
    /// uploads with a status document even on failure, so HTTP error
    /// statuses still yield their body.
    fn put(&self, url: &str, body: &mut dyn Read, len: u64) -> Result<Body, FsError>;

    /// DELETE a URL.
    fn delete(&self, url: &str) -> Result<(), FsError>;
}

/// Production transport: a shared `ureq` agent with Basic auth and an
/// in-memory cookie jar that lives as long as the mount.
pub struct HttpTransport {
    agent: ureq::Agent,
    auth: String,
}

impl HttpTransport {
    pub fn new(user: &str, pass: &str) -> Self {
        use std::time::Duration;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();
        let auth = format!("Basic {}", BASE64.encode(format!("{user}:{pass}")));
        Self { agent, auth }
    }

    fn transport_err(url: &str, err: &ureq::Error) -> FsError {
        match err {
            ureq::Error::Status(code, _) => FsError::Transport(format!("{url}: HTTP {code}")),
            ureq::Error::Transport(t) => FsError::Transport(format!("{url}: {t}")),
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Body, FsError> {
        let response = self
            .agent
            .get(url)
            .set("Authorization", &self.auth)
            .call()
            .map_err(|err| Self::transport_err(url, &err))?;
        Ok(Box::new(response.into_reader()))
    }

    fn put(&self, url: &str, body: &mut dyn Read, len: u64) -> Result<Body, FsError> {
        let request = self
            .agent
            .put(url)
            .set("Authorization", &self.auth)
            .set("Content-Length", &len.to_string());
        match request.send(body) {
            Ok(response) => Ok(Box::new(response.into_reader())),
            // An HTTP error status still carries the status document.
            Err(ureq::Error::Status(_, response)) => Ok(Box::new(response.into_reader())),
            Err(err) => Err(Self::transport_err(url, &err)),
        }
    }

    fn delete(&self, url: &str) -> Result<(), FsError> {
        self.agent
            .delete(url)
            .set("Authorization", &self.auth)
            .call()
            .map(|_| ())
            .map_err(|err| Self::transport_err(url, &err))
    }
}
