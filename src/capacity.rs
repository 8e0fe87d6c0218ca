use crate::database::Database;
use crate::error::BinbakError;
use crate::Result;
use fs2::available_space;
use std::path::Path;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Total database size in MB across all schemas, rounded to two decimals
pub fn estimate_size_mb<D: Database + ?Sized>(db: &D) -> Result<f64> {
    let sizes = db.schema_sizes()?;
    if sizes.is_empty() {
        return Err(BinbakError::SizeUnavailable);
    }

    let total: f64 = sizes.iter().map(|row| row.size_mb).sum();
    Ok(round_mb(total))
}

/// Free space at the destination in MB
pub fn available_space_mb(destination: &Path) -> Result<f64> {
    let bytes = available_space(destination).map_err(|e| BinbakError::DestinationUnavailable {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(bytes as f64 / BYTES_PER_MB)
}

/// False when the estimate does not fit in the free space at the destination
pub fn has_sufficient_space(estimated_size_mb: f64, destination: &Path) -> Result<bool> {
    Ok(fits(estimated_size_mb, available_space_mb(destination)?))
}

/// Fail with `InsufficientSpace` when the estimate does not fit
pub fn check_capacity(estimated_size_mb: f64, destination: &Path) -> Result<()> {
    let available_mb = available_space_mb(destination)?;
    if !fits(estimated_size_mb, available_mb) {
        return Err(BinbakError::InsufficientSpace {
            needed_mb: estimated_size_mb,
            available_mb,
        });
    }
    Ok(())
}

fn fits(estimated_size_mb: f64, available_mb: f64) -> bool {
    estimated_size_mb <= available_mb
}

fn round_mb(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a byte count for status lines
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
