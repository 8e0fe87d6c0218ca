use crate::capacity::format_size;
use crate::database::Database;
use crate::dump::Dumper;
use crate::error::BinbakError;
use crate::naming::{ArtifactKind, ArtifactNamer, BackupArtifact};
use crate::signal::RunContext;
use crate::Result;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct BackupResult {
    pub artifact: BackupArtifact,
    pub bytes_written: u64,
    pub duration: Duration,
}

impl BackupResult {
    pub fn summary(&self) -> String {
        format!(
            "{} backup created: {} ({})",
            match self.artifact.kind {
                ArtifactKind::Full => "Full",
                ArtifactKind::Incremental => "Incremental",
            },
            self.artifact.path.display(),
            format_size(self.bytes_written)
        )
    }
}

/// Open `path` for writing, failing if anything already has that name
fn create_exclusive(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => BinbakError::ArtifactCollision {
                path: path.to_path_buf(),
            },
            _ => BinbakError::Io(e),
        })
}

/// Full snapshot of every schema into the destination.
///
/// `segment_at_start` is the current log segment read before the dump runs
/// (the dump itself rotates the log). When the dump reports any error the
/// run fails; an empty artifact is deleted, a non-empty one is kept.
pub fn run_full<M: Dumper + ?Sized>(
    dumper: &M,
    namer: &ArtifactNamer,
    destination: &Path,
    segment_at_start: &str,
    started_at: &DateTime<Local>,
    context: &RunContext,
) -> Result<BackupResult> {
    let start_time = Instant::now();

    let name = namer.name(ArtifactKind::Full, started_at, segment_at_start)?;
    let path = destination.join(&name);

    let file = create_exclusive(&path)?;
    let guard = context.register_artifact(path.clone());

    info!(path = %path.display(), segment = segment_at_start, "starting full backup");
    let report = match dumper.dump(file) {
        Ok(report) => report,
        Err(e) => {
            discard(guard.abandon(), &path);
            error!(severity = "critical", error = %e, "full backup failed");
            return Err(match e {
                BinbakError::DumpProcessFailed { .. } => e,
                other => BinbakError::DumpProcessFailed {
                    stderr: other.to_string(),
                },
            });
        }
    };

    if report.failed() {
        let removed = discard(guard.abandon(), &path);
        if !removed && path.exists() {
            warn!(
                path = %path.display(),
                "dump reported errors but wrote data; artifact kept for inspection"
            );
        }
        error!(severity = "critical", stderr = report.stderr.trim(), "full backup failed");
        return Err(BinbakError::DumpProcessFailed {
            stderr: report.stderr.trim().to_string(),
        });
    }

    let bytes_written = fs::metadata(&path)?.len();
    if bytes_written == 0 {
        discard(guard.abandon(), &path);
        error!(severity = "critical", "dump exited cleanly but wrote nothing");
        return Err(BinbakError::DumpProcessFailed {
            stderr: "dump produced no output".to_string(),
        });
    }

    guard.complete();
    info!(path = %path.display(), bytes = bytes_written, "full backup created");

    Ok(BackupResult {
        artifact: BackupArtifact {
            kind: ArtifactKind::Full,
            created_at: *started_at,
            log_segment: segment_at_start.to_string(),
            path,
        },
        bytes_written,
        duration: start_time.elapsed(),
    })
}

/// Seal the current log segment and copy it to the destination.
///
/// `prior_segment` must be read before calling: after the rotation the index
/// names the new, still open segment.
pub fn run_incremental<D: Database + ?Sized>(
    db: &D,
    namer: &ArtifactNamer,
    destination: &Path,
    log_dir: &Path,
    prior_segment: &str,
    started_at: &DateTime<Local>,
    context: &RunContext,
) -> Result<BackupResult> {
    let start_time = Instant::now();

    let name = namer.name(ArtifactKind::Incremental, started_at, prior_segment)?;
    let target = destination.join(&name);

    info!(segment = prior_segment, "rotating binary log");
    db.rotate_logs().map_err(|e| {
        error!(error = %e, "log rotation failed");
        e
    })?;

    let source = log_dir.join(prior_segment);
    let bytes_written = copy_exclusive(&source, &target, context).map_err(|e| {
        error!(error = %e, source = %source.display(), "failed to copy the incremental binary log");
        e
    })?;

    info!(path = %target.display(), bytes = bytes_written, "incremental backup created");

    Ok(BackupResult {
        artifact: BackupArtifact {
            kind: ArtifactKind::Incremental,
            created_at: *started_at,
            log_segment: prior_segment.to_string(),
            path: target,
        },
        bytes_written,
        duration: start_time.elapsed(),
    })
}

/// Stream `source` into a new file at `target`. An existing target is left
/// untouched; a partial target written by this call is removed.
fn copy_exclusive(source: &Path, target: &Path, context: &RunContext) -> Result<u64> {
    let mut reader = File::open(source).map_err(|e| BinbakError::CopyIoFailure {
        path: source.to_path_buf(),
        source: e,
    })?;

    let mut writer = create_exclusive(target).map_err(|e| match e {
        BinbakError::Io(io_error) => BinbakError::CopyIoFailure {
            path: target.to_path_buf(),
            source: io_error,
        },
        other => other,
    })?;
    let guard = context.register_artifact(target.to_path_buf());

    let copied = io::copy(&mut reader, &mut writer).and_then(|bytes| {
        writer.sync_all()?;
        Ok(bytes)
    });

    match copied {
        Ok(bytes) => {
            guard.complete();
            Ok(bytes)
        }
        Err(e) => {
            drop(writer);
            guard.complete();
            remove_partial(target);
            Err(BinbakError::CopyIoFailure {
                path: source.to_path_buf(),
                source: e,
            })
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial copy");
        }
    }
}

fn discard(result: io::Result<bool>, path: &Path) -> bool {
    match result {
        Ok(removed) => {
            if removed {
                info!(path = %path.display(), "removed empty artifact");
            }
            removed
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to delete the empty backup file");
            false
        }
    }
}
