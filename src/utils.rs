//! # Utility Functions and Helper Module
//!
//! Formatters for human-readable output, validation of configuration values,
//! system information helpers, and plain-text table printing.
//!
//! ## Usage Examples
//!
//! ```rust
//! use photo_bench::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//!
//! validate_unit_size(1_000_000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Result;
use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for a benchmark run
///
/// ## Returns
/// String representation of a UUID v4 (e.g., "550e8400-e29b-41d4-a716-446655440000")
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// Picks the largest unit that keeps the value above one:
/// nanoseconds, microseconds, milliseconds and seconds get two decimals,
/// anything past a minute uses a compound format.
///
/// ## Examples
///
/// ```rust
/// # use photo_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_nanos(1250)), "1.25μs");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format bytes in a human-readable way (binary, 1024-based units)
///
/// ## Examples
///
/// ```rust
/// # use photo_bench::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(2621440), "2.50 MB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    format_bytes_f64(bytes as f64)
}

pub fn format_bytes_f64(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a throughput in bytes per second, e.g. "10.25 MB/s"
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_second))
}

/// Format a signed memory delta in megabytes with two decimals, e.g. "-0.50 MB"
pub fn format_memory_delta(delta_bytes: i64) -> String {
    format!("{:.2} MB", delta_bytes as f64 / (1024.0 * 1024.0))
}

/// Validate that a workload unit size is reasonable
///
/// ## Validation Rules
///
/// - **Minimum**: 1 byte (a zero-length photo processes nothing)
/// - **Maximum**: 1 GiB (a single unit must not exhaust the machine)
pub fn validate_unit_size(unit_size: usize) -> Result<()> {
    if unit_size == 0 {
        anyhow::bail!("Unit size cannot be zero");
    }
    if unit_size > crate::defaults::MAX_UNIT_SIZE {
        anyhow::bail!("Unit size {} is too large (maximum 1GB)", unit_size);
    }
    Ok(())
}

/// Validate the iteration count
///
/// Zero is accepted: every strategy completes immediately.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations > isize::MAX as usize {
        anyhow::bail!("Iteration count {} is too large", iterations);
    }
    Ok(())
}

/// Validate that concurrency level is reasonable
///
/// ## Validation Rules
///
/// - **Minimum**: 1 worker
/// - **Maximum**: 1024 workers
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 {
        anyhow::bail!("Concurrency cannot be zero");
    }
    if concurrency > crate::defaults::MAX_WORKERS {
        anyhow::bail!(
            "Concurrency {} is too high (maximum {})",
            concurrency,
            crate::defaults::MAX_WORKERS
        );
    }
    Ok(())
}

/// Validate the pipeline queue capacity
///
/// A zero-capacity queue would be a rendezvous channel rather than a bounded
/// buffer, so at least one slot is required.
pub fn validate_queue_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        anyhow::bail!("Queue capacity cannot be zero");
    }
    Ok(())
}

/// Get the number of CPU cores available
///
/// Uses `num_cpus`, which accounts for hyperthreading, cgroup limits and the
/// process affinity mask.
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Core ids this process may currently be scheduled on.
///
/// Empty when the platform cannot report them.
pub fn allowed_core_ids() -> Vec<usize> {
    core_affinity::get_core_ids()
        .map(|ids| ids.into_iter().map(|id| id.id).collect())
        .unwrap_or_default()
}

/// Print a formatted table row
///
/// ## Examples
///
/// ```rust
/// # use photo_bench::utils::{print_table_row, print_table_separator};
/// let widths = [15, 10, 12];
/// print_table_separator(&widths);
/// print_table_row(&["Scenario", "Time", "Memory"], &widths);
/// print_table_separator(&widths);
/// ```
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    println!("{}", format_table_row(columns, widths));
}

/// Print a table separator such as `+------+------+`
pub fn print_table_separator(widths: &[usize]) {
    println!("{}", format_table_separator(widths));
}

pub fn format_table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        line.push_str(&format!(" {:width$} |", column, width = width));
    }
    line
}

pub fn format_table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test duration formatting with various time scales
    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    /// Test byte formatting with various scales
    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1572864), "1.50 MB");
        assert_eq!(format_bytes(1610612736), "1.50 GB");
        assert_eq!(format_bytes(1_000_000), "976.56 KB");
    }

    #[test]
    fn test_format_rate_and_delta() {
        assert_eq!(format_rate(1024.0), "1.00 KB/s");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
        assert_eq!(format_memory_delta(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_memory_delta(-512 * 1024), "-0.50 MB");
    }

    #[test]
    fn test_validate_unit_size() {
        assert!(validate_unit_size(1).is_ok());
        assert!(validate_unit_size(1_000_000).is_ok());
        assert!(validate_unit_size(0).is_err());
        assert!(validate_unit_size(1024 * 1024 * 1024 + 1).is_err());
    }

    #[test]
    fn test_validate_iterations() {
        assert!(validate_iterations(0).is_ok());
        assert!(validate_iterations(3000).is_ok());
        assert!(validate_iterations(usize::MAX).is_err());
    }

    #[test]
    fn test_validate_concurrency() {
        assert!(validate_concurrency(1).is_ok());
        assert!(validate_concurrency(1024).is_ok());
        assert!(validate_concurrency(0).is_err());
        assert!(validate_concurrency(1025).is_err());
    }

    #[test]
    fn test_validate_queue_capacity() {
        assert!(validate_queue_capacity(1).is_ok());
        assert!(validate_queue_capacity(0).is_err());
    }

    #[test]
    fn test_system_helpers() {
        assert!(get_cpu_cores() > 0);
        let ids = allowed_core_ids();
        assert!(ids.len() <= 4096);
        assert_eq!(generate_run_id().len(), 36);
    }

    #[test]
    fn test_table_formatting() {
        assert_eq!(format_table_separator(&[3, 1]), "+-----+---+");
        assert_eq!(format_table_row(&["ab", "c"], &[3, 1]), "| ab  | c |");
    }
}
