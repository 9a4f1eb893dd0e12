use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use obsfs::{DEFAULT_HOST, MountOptions, ObsFs, account_for_host, config_path, fuse};

/// Mount a package-build service's API as a filesystem.
#[derive(Parser)]
#[command(name = "obsfs", version, about)]
struct Cli {
    /// Where to mount the filesystem.
    mountpoint: PathBuf,

    /// Mount options: user=NAME, pass=SECRET, host=FQDN (default
    /// api.opensuse.org). Credentials not given here are read from
    /// ~/.oscrc (or $OSCRC_CONFIG).
    #[arg(short = 'o', value_delimiter = ',', value_name = "opt[,opt...]")]
    options: Vec<String>,
}

/// To debug: `OBSFS_LOG=debug obsfs ...`
fn init_tracing() {
    // Usage without the `regex` feature.
    // <https://github.com/tokio-rs/tracing/issues/1436#issuecomment-918528013>
    tracing_subscriber::registry()
        .with(std::env::var("OBSFS_LOG").map_or_else(
            |_| Targets::new(),
            |env_var| {
                use std::str::FromStr;
                Targets::from_str(&env_var).unwrap_or_default()
            },
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut options = MountOptions::default();
    for opt in &cli.options {
        let (key, value) = opt.split_once('=').unwrap_or((opt.as_str(), ""));
        if !options.apply(key, value) {
            tracing::warn!(option = key, "ignoring unknown mount option");
        }
    }

    if options.user.is_empty() || options.pass.is_empty() {
        let Some(home) = std::env::var_os("HOME") else {
            eprintln!("obsfs: HOME is not set and no credentials were given");
            return ExitCode::FAILURE;
        };
        let oscrc = config_path(
            Path::new(&home),
            std::env::var_os("OSCRC_CONFIG").map(PathBuf::from),
        );
        let host = if options.host.is_empty() { DEFAULT_HOST } else { options.host.as_str() };
        match account_for_host(host, &oscrc) {
            Ok(account) => {
                if options.user.is_empty() {
                    options.user = account.user;
                }
                if options.pass.is_empty() {
                    options.pass = account.pass;
                }
            }
            Err(err) => {
                eprintln!("obsfs: could not retrieve account from oscrc file: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    let fs = match ObsFs::new(options) {
        Ok(fs) => Arc::new(fs),
        Err(err) => {
            eprintln!("obsfs: {err}");
            return ExitCode::FAILURE;
        }
    };

    match fuse::mount(fs, &cli.mountpoint) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("obsfs: mount failed: {err}");
            ExitCode::FAILURE
        }
    }
}
