use crate::error::BinbakError;
use crate::Result;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Send structured logs to an append-only file. `RUST_LOG` overrides
/// `default_level`.
pub fn init_logging(log_file: &Path, default_level: &str) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(log_file)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| BinbakError::config(format!("Invalid log level {default_level:?}: {e}")))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| BinbakError::config(format!("Failed to install logger: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_logging_writes_to_file() {
        let dir = tempdir().unwrap();
        let log_file = dir.path().join("logs").join("binbak.log");

        // Another test may already own the global subscriber
        let installed = init_logging(&log_file, "info").is_ok();
        if installed && std::env::var_os("RUST_LOG").is_none() {
            tracing::info!("logging initialised");
            let contents = std::fs::read_to_string(&log_file).unwrap();
            assert!(contents.contains("logging initialised"));
        }
        assert!(log_file.exists());
    }
}
