use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Photo Benchmark - measures allocation, SIMD, threading and affinity effects
/// on synthetic photo-buffer processing
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Scenarios to run (space-separated, or all)
    #[clap(short = 's', long, value_enum, default_values_t = vec![ScenarioKind::All], help_heading = "Core Options", num_args = 1..)]
    pub scenarios: Vec<ScenarioKind>,

    /// Buffer size in bytes for the large-buffer scenarios
    #[clap(short = 'u', long, default_value_t = crate::defaults::UNIT_SIZE, help_heading = "Core Options")]
    pub unit_size: usize,

    /// Buffer size in bytes for the small-buffer scenario
    #[clap(long, default_value_t = crate::defaults::SMALL_UNIT_SIZE, help_heading = "Core Options")]
    pub small_unit_size: usize,

    /// Units processed per scenario
    #[clap(short = 'i', long, default_value_t = crate::defaults::ITERATIONS, help_heading = "Core Options")]
    pub iterations: usize,

    /// Worker threads for the parallel scenarios (default: available cores)
    #[clap(short = 'w', long, help_heading = "Concurrency")]
    pub workers: Option<usize>,

    /// Core to pin the affinity scenario to (default: first allowed core)
    #[clap(long, help_heading = "Concurrency")]
    pub pin_core: Option<usize>,

    /// Capacity of the pipeline queue
    #[clap(short = 'q', long, default_value_t = crate::defaults::QUEUE_CAPACITY, help_heading = "Concurrency")]
    pub queue_capacity: usize,

    /// Seed for the random fill of small buffers
    #[clap(long, default_value_t = crate::defaults::SEED)]
    pub seed: u64,

    /// Write a JSON report to this file
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Also write logs (uncolored) to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[clap(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Continue running other scenarios even if one fails
    #[clap(long, default_value_t = false)]
    pub continue_on_error: bool,
}

/// Named benchmark scenarios
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// Sequential scalar over buffers below the large-object class
    #[clap(name = "small")]
    SmallSequential,

    /// Sequential scalar over large buffers
    #[clap(name = "scalar")]
    SequentialScalar,

    /// Sequential vectorized over large buffers
    #[clap(name = "vectorized")]
    SequentialVectorized,

    /// Parallel-For over a pool sized to the core count
    #[clap(name = "parallel")]
    ParallelFor,

    /// Parallel-For with the process pinned to one core
    #[clap(name = "pinned")]
    AffinityPinned,

    /// Producer and consumer pool joined by a bounded queue
    #[clap(name = "pipeline")]
    QueuePipeline,

    /// All scenarios, in the fixed order
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::SmallSequential => write!(f, "Small Sequential"),
            ScenarioKind::SequentialScalar => write!(f, "Sequential Scalar"),
            ScenarioKind::SequentialVectorized => write!(f, "Sequential Vectorized"),
            ScenarioKind::ParallelFor => write!(f, "Parallel-For"),
            ScenarioKind::AffinityPinned => write!(f, "Affinity-Pinned"),
            ScenarioKind::QueuePipeline => write!(f, "Queue-Pipeline"),
            ScenarioKind::All => write!(f, "All Scenarios"),
        }
    }
}

impl ScenarioKind {
    /// The fixed scenario order.
    pub const ORDER: [ScenarioKind; 6] = [
        ScenarioKind::SmallSequential,
        ScenarioKind::SequentialScalar,
        ScenarioKind::SequentialVectorized,
        ScenarioKind::ParallelFor,
        ScenarioKind::AffinityPinned,
        ScenarioKind::QueuePipeline,
    ];

    /// Expands `All` and puts the selection into the fixed order, dropping
    /// duplicates.
    pub fn expand_all(kinds: Vec<ScenarioKind>) -> Vec<ScenarioKind> {
        if kinds.contains(&ScenarioKind::All) {
            return Self::ORDER.to_vec();
        }
        Self::ORDER
            .iter()
            .copied()
            .filter(|kind| kinds.contains(kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_everything() {
        let args = Args::try_parse_from(["photo-bench"]).unwrap();
        assert_eq!(args.scenarios, vec![ScenarioKind::All]);
        assert_eq!(args.unit_size, 1_000_000);
        assert_eq!(args.iterations, 3000);
        assert_eq!(args.queue_capacity, 100);
        assert_eq!(args.verbose, 0);
        assert!(args.workers.is_none());
        assert!(args.output_file.is_none());
        assert!(!args.continue_on_error);
    }

    #[test]
    fn test_parse_selection_and_flags() {
        let args = Args::try_parse_from([
            "photo-bench",
            "-s",
            "pipeline",
            "scalar",
            "-i",
            "10",
            "-w",
            "2",
            "-vv",
            "--pin-core",
            "1",
        ])
        .unwrap();
        assert_eq!(
            args.scenarios,
            vec![ScenarioKind::QueuePipeline, ScenarioKind::SequentialScalar]
        );
        assert_eq!(args.iterations, 10);
        assert_eq!(args.workers, Some(2));
        assert_eq!(args.pin_core, Some(1));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        assert!(Args::try_parse_from(["photo-bench", "-s", "gpu"]).is_err());
    }

    #[test]
    fn test_scenario_kind_expand_all() {
        assert_eq!(
            ScenarioKind::expand_all(vec![ScenarioKind::All]),
            ScenarioKind::ORDER.to_vec()
        );
        assert_eq!(
            ScenarioKind::expand_all(vec![
                ScenarioKind::QueuePipeline,
                ScenarioKind::SmallSequential,
                ScenarioKind::QueuePipeline,
            ]),
            vec![ScenarioKind::SmallSequential, ScenarioKind::QueuePipeline]
        );
        assert_eq!(
            ScenarioKind::expand_all(vec![ScenarioKind::ParallelFor, ScenarioKind::All]),
            ScenarioKind::ORDER.to_vec()
        );
    }

    #[test]
    fn test_scenario_kind_display() {
        assert_eq!(ScenarioKind::ParallelFor.to_string(), "Parallel-For");
        assert_eq!(ScenarioKind::All.to_string(), "All Scenarios");
    }
}
