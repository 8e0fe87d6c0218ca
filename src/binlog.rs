use crate::error::BinbakError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// How the server records segment paths in the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathConvention {
    /// Absolute paths, e.g. `/var/lib/mysql/binlog.000042`
    Posix,
    /// Relative paths with a marker, e.g. `.\binlog.000042`
    Windows,
}

impl PathConvention {
    pub fn host() -> Self {
        if cfg!(windows) {
            PathConvention::Windows
        } else {
            PathConvention::Posix
        }
    }
}

/// Reduce one index entry to a bare segment identifier
pub fn normalize_segment(entry: &str, convention: PathConvention) -> Option<String> {
    let entry = entry.trim();
    let bare = match convention {
        PathConvention::Posix => entry.rsplit('/').next().unwrap_or(entry),
        PathConvention::Windows => {
            let entry = entry.trim_start_matches(['.', '\\']);
            entry.rsplit(['\\', '/']).next().unwrap_or(entry)
        }
    };

    if bare.is_empty() || bare == "." || bare == ".." {
        None
    } else {
        Some(bare.to_string())
    }
}

/// Identifier of the most recently registered log segment.
///
/// The server appends one line per segment to its index file, so the last
/// entry is the segment currently being written. Index files hold one line
/// per rotation and are read whole.
pub fn last_segment(
    log_dir: &Path,
    index_name: &str,
    convention: PathConvention,
) -> Result<String> {
    let index_path = log_dir.join(index_name);
    let contents = fs::read_to_string(&index_path).map_err(|e| BinbakError::IndexUnavailable {
        path: index_path.clone(),
        reason: e.to_string(),
    })?;

    contents
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| normalize_segment(line, convention))
        .ok_or_else(|| BinbakError::IndexUnavailable {
            path: index_path,
            reason: "index file has no segment entries".to_string(),
        })
}

/// Name of the binary log index file in `log_dir`.
///
/// `stem` is the file name part of `log_bin_basename`; when `<stem>.index`
/// exists it is the answer. Otherwise the directory is scanned for names
/// ending exactly in `.index`, relay log indexes are skipped and the first
/// candidate in name order is taken.
pub fn find_index_file(log_dir: &Path, stem: Option<&str>) -> Result<String> {
    let unavailable = |reason: String| BinbakError::IndexUnavailable {
        path: log_dir.to_path_buf(),
        reason,
    };

    if let Some(stem) = stem.filter(|s| !s.is_empty()) {
        let name = format!("{stem}.index");
        if log_dir.join(&name).is_file() {
            return Ok(name);
        }
    }

    let entries = fs::read_dir(log_dir).map_err(|e| unavailable(e.to_string()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| unavailable(e.to_string()))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_binlog_index(name) {
                candidates.push(name.to_string());
            }
        }
    }

    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| unavailable("no binary log .index file in log directory".to_string()))
}

fn is_binlog_index(name: &str) -> bool {
    name.len() > ".index".len() && name.ends_with(".index") && !name.contains("relay-bin")
}

/// Index stem from `log_bin_basename` (`/var/lib/mysql/binlog` -> `binlog`)
pub fn index_stem_from_basename(basename: &str) -> Option<String> {
    Path::new(basename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Directory holding the binary logs, derived from the server's
/// `log_bin_basename` value (`/var/lib/mysql/binlog` -> `/var/lib/mysql`)
pub fn log_dir_from_basename(basename: &str) -> Option<PathBuf> {
    let basename = basename.trim();
    if basename.is_empty() {
        return None;
    }
    Path::new(basename)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
