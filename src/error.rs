use std::{io, sync::Arc};

use rustix::io::Errno;
use thiserror::Error;

/// All filesystem-operation errors.
///
/// `thiserror` is used to display meaningful error messages; the kernel
/// bridge only cares about [`FsError::errno`].
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum FsError {
    /// The path does not name anything, on the server or in the caches.
    #[error("no such entry: {0}")]
    NotFound(String),

    /// A listing or status document the server sent could not be parsed.
    #[error("invalid server reply: {0}")]
    InvalidXml(String),

    /// The HTTP layer failed outright (connect, TLS, non-2xx on GET).
    #[error("transport: {0}")]
    Transport(String),

    /// The server answered an upload with an error status document.
    #[error("server status '{code}'")]
    Server { code: String, errno: i32 },

    /// An operation arrived for a file the attribute cache has no entry for.
    /// The kernel only issues write/flush on files it opened, so this is an
    /// internal inconsistency, not a user error.
    #[error("no cache entry for open file: {0}")]
    StaleHandle(String),

    /// No usable credentials on the command line or in the oscrc file.
    #[error("no credentials for host '{0}'")]
    Credentials(String),

    #[error("{0}")]
    IO(IOError),
}

impl FsError {
    /// The POSIX errno this error maps to at the kernel boundary.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => Errno::NOENT.raw_os_error(),
            Self::InvalidXml(_) => Errno::INVAL.raw_os_error(),
            Self::Transport(_) | Self::StaleHandle(_) => Errno::IO.raw_os_error(),
            Self::Server { errno, .. } => *errno,
            Self::Credentials(_) => Errno::ACCESS.raw_os_error(),
            Self::IO(err) => err.0.raw_os_error().unwrap_or_else(|| Errno::IO.raw_os_error()),
        }
    }

    pub(crate) fn not_found(path: &str) -> Self {
        Self::NotFound(path.to_string())
    }
}

/// Cloneable wrapper around [`io::Error`], compared by kind.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct IOError(Arc<io::Error>);

impl PartialEq for IOError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return Self::NotFound(err.to_string());
        }
        Self::IO(IOError(Arc::new(err)))
    }
}

#[test]
fn errno_mapping() {
    assert_eq!(FsError::not_found("/x").errno(), Errno::NOENT.raw_os_error());
    assert_eq!(FsError::InvalidXml("tag soup".into()).errno(), Errno::INVAL.raw_os_error());
    assert_eq!(FsError::Transport("connect".into()).errno(), Errno::IO.raw_os_error());
    let server = FsError::Server { code: "save_error".into(), errno: Errno::IO.raw_os_error() };
    assert_eq!(server.errno(), Errno::IO.raw_os_error());
}

#[test]
fn io_error_compares_by_kind() {
    let a: FsError = io::Error::new(io::ErrorKind::PermissionDenied, "one").into();
    let b: FsError = io::Error::new(io::ErrorKind::PermissionDenied, "two").into();
    assert_eq!(a, b);
    assert_eq!(a.errno(), Errno::IO.raw_os_error());
    let nf: FsError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(nf, FsError::NotFound(_)));
}
