//! Credentials from the osc configuration file.
//!
//! `~/.oscrc` is an INI file with one section per API server. Depending on
//! the tool that wrote it, the section header is a bare host name or an
//! http(s) URL, and the password is either plaintext (`pass`) or
//! base64-encoded bzip2-compressed plaintext (`passx`).

use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bzip2::read::BzDecoder;
use configparser::ini::Ini;

use crate::error::FsError;

/// A username/password pair for one API host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user: String,
    pub pass: String,
}

/// The oscrc path to read: `$OSCRC_CONFIG` if set, else `<home>/.oscrc`.
pub fn config_path(home: &Path, override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| home.join(".oscrc"))
}

/// Strip scheme and trailing path from a section header so that
/// `[https://api.example.org/]` and `[api.example.org]` both name the host.
fn section_host(section: &str) -> &str {
    let rest = section
        .strip_prefix("https://")
        .or_else(|| section.strip_prefix("http://"))
        .unwrap_or(section);
    rest.split('/').next().unwrap_or(rest)
}

fn decode_passx(passx: &str) -> Option<String> {
    let compressed = BASE64.decode(passx.trim()).ok()?;
    let mut plain = String::new();
    BzDecoder::new(&compressed[..]).read_to_string(&mut plain).ok()?;
    Some(plain)
}

/// Look up the account for `host` in the given oscrc file.
pub fn account_for_host(host: &str, oscrc: &Path) -> Result<Account, FsError> {
    let mut ini = Ini::new();
    ini.load(oscrc).map_err(|err| {
        tracing::warn!(path = %oscrc.display(), error = %err, "could not read oscrc file");
        FsError::Credentials(host.to_string())
    })?;

    for section in ini.sections() {
        if !section_host(&section).eq_ignore_ascii_case(host) {
            continue;
        }
        let user = ini.get(&section, "user");
        let pass = ini
            .get(&section, "pass")
            .or_else(|| ini.get(&section, "passx").and_then(|px| decode_passx(&px)));
        if let (Some(user), Some(pass)) = (user, pass) {
            return Ok(Account { user, pass });
        }
    }
    Err(FsError::Credentials(host.to_string()))
}
