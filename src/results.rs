use crate::{
    alloc_tracking,
    benchmark::ScenarioOutcome,
    cli::ScenarioKind,
    metrics::BenchmarkResult,
    simd::{self, SimdLevel},
    strategy::PipelineStats,
    utils,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of a single scenario as recorded in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub name: String,
    pub strategy: String,
    pub transform: String,
    pub unit_size: usize,
    pub iterations: usize,
    pub status: ScenarioStatus,
    pub result: Option<BenchmarkResult>,
    pub elapsed_ms: Option<f64>,
    pub memory_delta_mb: Option<f64>,
    pub throughput_bytes_per_second: Option<f64>,
    pub pipeline: Option<PipelineStats>,
    pub skip_reason: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Completed,
    Skipped,
}

impl From<&ScenarioOutcome> for ScenarioReport {
    fn from(outcome: &ScenarioOutcome) -> Self {
        let scenario = outcome.scenario();
        let mut report = Self {
            kind: scenario.kind,
            name: scenario.name.clone(),
            strategy: scenario.strategy.to_string(),
            transform: scenario.transform.to_string(),
            unit_size: scenario.unit_size,
            iterations: scenario.iterations,
            status: ScenarioStatus::Completed,
            result: None,
            elapsed_ms: None,
            memory_delta_mb: None,
            throughput_bytes_per_second: None,
            pipeline: None,
            skip_reason: None,
            timestamp: chrono::Utc::now(),
        };
        match outcome {
            ScenarioOutcome::Completed { result, report: run, .. } => {
                report.elapsed_ms = Some(result.elapsed_ms());
                report.memory_delta_mb = Some(result.memory_delta_mb());
                report.throughput_bytes_per_second =
                    Some(result.bytes_per_second(scenario.unit_size));
                report.pipeline = run.pipeline;
                report.result = Some(result.clone());
            }
            ScenarioOutcome::Skipped { reason, .. } => {
                report.status = ScenarioStatus::Skipped;
                report.skip_reason = Some(reason.clone());
            }
        }
        report
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    /// Core ids the process may run on at startup
    pub allowed_cores: Vec<usize>,
    pub simd_level: SimdLevel,
    pub lane_width: usize,
    /// Whether memory readings come from the tracking allocator
    pub allocation_tracking: bool,
    pub rust_version: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let simd_level = simd::detect();
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: utils::get_cpu_cores(),
            allowed_cores: utils::allowed_core_ids(),
            simd_level,
            lane_width: simd_level.lane_width(),
            allocation_tracking: alloc_tracking::is_active(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Photo Benchmark v{}", self.benchmark_version)?;
        writeln!(f, "  OS / Arch:          {} / {}", self.os, self.architecture)?;
        writeln!(
            f,
            "  CPU Cores:          {} ({} allowed)",
            self.cpu_cores,
            self.allowed_cores.len()
        )?;
        writeln!(
            f,
            "  SIMD:               {} ({} byte lanes)",
            self.simd_level, self.lane_width
        )?;
        write!(
            f,
            "  Memory Source:      {}",
            if self.allocation_tracking {
                "tracking allocator"
            } else {
                "resident set size"
            }
        )
    }
}

/// Final report written to the output file
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalBenchmarkResults {
    pub metadata: BenchmarkMetadata,
    pub results: Vec<ScenarioReport>,
    pub summary: OverallSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub run_id: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_scenarios: usize,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverallSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_units: usize,
    pub fastest_scenario: Option<String>,
}

/// Collects scenario outcomes, prints them, and writes the JSON report
pub struct ResultsManager {
    output_file: Option<PathBuf>,
    run_id: String,
    system_info: SystemInfo,
    results: Vec<ScenarioReport>,
    failed: usize,
}

impl ResultsManager {
    /// Create a results manager; `output_file` of `None` keeps results on the
    /// console only
    pub fn new(output_file: Option<&Path>) -> Self {
        Self {
            output_file: output_file.map(Path::to_path_buf),
            run_id: utils::generate_run_id(),
            system_info: SystemInfo::collect(),
            results: Vec::new(),
            failed: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn system_info(&self) -> &SystemInfo {
        &self.system_info
    }

    pub fn results(&self) -> &[ScenarioReport] {
        &self.results
    }

    /// Record and print one outcome
    pub fn add_outcome(&mut self, outcome: &ScenarioOutcome) {
        let report = ScenarioReport::from(outcome);
        println!("{}", Self::result_line(&report));
        self.results.push(report);
    }

    pub fn record_failures(&mut self, failed: usize) {
        self.failed += failed;
    }

    /// Console line for one scenario: name, elapsed milliseconds, memory delta
    /// in MB and, when present, the per-tier collection counts.
    pub fn result_line(report: &ScenarioReport) -> String {
        match (&report.status, &report.result) {
            (ScenarioStatus::Completed, Some(result)) => {
                format!("{}: {}", report.name, result)
            }
            _ => format!(
                "{}: skipped ({})",
                report.name,
                report.skip_reason.as_deref().unwrap_or("unsupported")
            ),
        }
    }

    /// Print a summary table of every recorded scenario
    pub fn print_summary(&self) {
        let widths = [34, 12, 14, 14, 24];
        println!();
        utils::print_table_separator(&widths);
        utils::print_table_row(
            &["Scenario", "Elapsed", "Memory Delta", "Throughput", "Collections"],
            &widths,
        );
        utils::print_table_separator(&widths);
        for report in &self.results {
            let (elapsed, memory, throughput, collections) = match &report.result {
                Some(result) => (
                    utils::format_duration(result.elapsed),
                    utils::format_memory_delta(result.memory_delta_bytes),
                    utils::format_rate(result.bytes_per_second(report.unit_size)),
                    result
                        .collections
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                None => (
                    "skipped".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ),
            };
            utils::print_table_row(
                &[&report.name, &elapsed, &memory, &throughput, &collections],
                &widths,
            );
        }
        utils::print_table_separator(&widths);
    }

    /// Write the JSON report if an output file was configured
    pub fn finalize(&self) -> Result<()> {
        info!("Finalizing benchmark results");
        let Some(output_file) = &self.output_file else {
            debug!("No output file configured, skipping JSON report");
            return Ok(());
        };

        let final_results = FinalBenchmarkResults {
            metadata: BenchmarkMetadata {
                run_id: self.run_id.clone(),
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_scenarios: self.results.len() + self.failed,
                system_info: self.system_info.clone(),
            },
            results: self.results.clone(),
            summary: self.calculate_overall_summary(),
        };

        let json = serde_json::to_string_pretty(&final_results)?;
        std::fs::write(output_file, json)
            .with_context(|| format!("failed to write results to {:?}", output_file))?;

        info!("Results written to: {:?}", output_file);
        Ok(())
    }

    fn calculate_overall_summary(&self) -> OverallSummary {
        let completed: Vec<&ScenarioReport> = self
            .results
            .iter()
            .filter(|r| r.status == ScenarioStatus::Completed)
            .collect();

        OverallSummary {
            completed: completed.len(),
            skipped: self.results.len() - completed.len(),
            failed: self.failed,
            total_units: completed
                .iter()
                .filter_map(|r| r.result.as_ref())
                .map(|r| r.units_processed)
                .sum(),
            fastest_scenario: completed
                .iter()
                .filter_map(|r| r.elapsed_ms.map(|ms| (ms, &r.name)))
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, name)| name.clone()),
        }
    }
}
