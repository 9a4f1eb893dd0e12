/// Host the API is served from when the mount options name none.
pub const DEFAULT_HOST: &str = "api.opensuse.org";

/// Mount options.
///
/// Everything the engine needs to know about the server: who to talk to and
/// who to talk as. Credentials left empty here are filled in from the oscrc
/// file by the binary before the engine is constructed.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// API user name (`-o user=...`).
    pub user: String,

    /// API password (`-o pass=...`).
    pub pass: String,

    /// API server host name (`-o host=...`). Default [`DEFAULT_HOST`].
    pub host: String,
}

impl MountOptions {
    /// Apply defaults. Called once by the engine constructor.
    #[must_use]
    pub fn sanitize(mut self) -> Self {
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        self
    }

    /// URL prefix for API calls.
    pub fn api_url(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Fold one `key=value` mount option into the set. Unknown keys are
    /// left to the caller to report.
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        match key {
            "user" => self.user = value.to_string(),
            "pass" => self.pass = value.to_string(),
            "host" => self.host = value.to_string(),
            _ => return false,
        }
        true
    }
}
