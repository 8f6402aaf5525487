//! Sequential strategy: every unit on the invoking thread, in index order.

use super::RunReport;
use crate::error::Result;
use crate::workload::Workload;

/// Processes indices `0..iterations` one after another.
///
/// The first failing unit stops the run; later indices are not started.
pub fn run(workload: &dyn Workload, iterations: usize) -> Result<RunReport> {
    for index in 0..iterations {
        workload.process(index)?;
    }
    Ok(RunReport::processed(iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::strategy::test_support::CountingWorkload;

    #[test]
    fn test_sequential_zero_iterations() {
        let workload = CountingWorkload::new(0);
        let report = run(&workload, 0).unwrap();
        assert_eq!(report.units_processed, 0);
        assert!(report.pipeline.is_none());
    }

    #[test]
    fn test_sequential_runs_all() {
        let workload = CountingWorkload::new(17);
        assert_eq!(run(&workload, 17).unwrap().units_processed, 17);
        workload.assert_exactly_once();
    }

    #[test]
    fn test_sequential_stops_at_first_failure() {
        let workload = CountingWorkload::new(10).failing_on(&[4]);
        let err = run(&workload, 10).unwrap_err();
        assert!(matches!(err, BenchError::ResourceExhaustion { requested: 4 }));
        assert_eq!(workload.hits(), vec![1, 1, 1, 1, 1, 0, 0, 0, 0, 0]);
    }
}
