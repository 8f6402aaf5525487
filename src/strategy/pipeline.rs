//! Queue-Pipeline strategy.
//!
//! A [`Producer`] publishes the tokens `0..N` into a bounded crossbeam
//! channel and blocks whenever the queue is full. A [`ConsumerPool`] of
//! `core count` threads drains the queue; each token becomes one
//! create/transform/release of a workload unit. Dropping the producer's
//! sender closes the queue, and a consumer stops once it observes the queue
//! closed and empty.
//!
//! The two roles share nothing but the channel. Consumers keep draining after
//! a failed token so the producer can never block forever on a full queue.

use super::{run_unit, RunReport};
use crate::error::{BenchError, Result, TaskFailure};
use crate::workload::Workload;
use crossbeam::channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{debug, trace};

/// Sequence token carried by the queue. Carries no payload; the consumer
/// materializes a unit for it.
pub type PipelineItem = usize;

/// Queue accounting for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub capacity: usize,
    pub consumers: usize,
    pub produced: usize,
    pub consumed: usize,
    /// Largest number of tokens pending in the queue, observed after each send.
    pub peak_depth: usize,
}

/// Writing end of the pipeline.
pub struct Producer {
    sender: Sender<PipelineItem>,
}

/// What the producer managed to publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProducerReport {
    pub produced: usize,
    pub peak_depth: usize,
}

impl Producer {
    /// Publishes `0..count`, then closes the queue by dropping the sender.
    ///
    /// Stops early only if every consumer has gone away.
    pub fn publish(self, count: usize) -> ProducerReport {
        let mut report = ProducerReport::default();
        for token in 0..count {
            if self.sender.send(token).is_err() {
                break;
            }
            report.produced += 1;
            report.peak_depth = report.peak_depth.max(self.sender.len());
        }
        trace!("Producer finished after {} tokens", report.produced);
        report
    }
}

/// Reading end of the pipeline, shared by `consumers` threads.
pub struct ConsumerPool {
    receiver: Receiver<PipelineItem>,
    consumers: usize,
}

/// What one consumer thread did.
#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub consumed: usize,
    pub failures: Vec<TaskFailure>,
}

impl ConsumerPool {
    pub fn consumers(&self) -> usize {
        self.consumers
    }

    /// Drains tokens until the queue is closed and empty.
    fn drain(receiver: Receiver<PipelineItem>, workload: &dyn Workload) -> ConsumerReport {
        let mut report = ConsumerReport::default();
        for token in receiver.iter() {
            report.consumed += 1;
            if let Err(failure) = run_unit(workload, token) {
                report.failures.push(failure);
            }
        }
        report
    }
}

/// Creates the two roles around a queue of `capacity` tokens.
pub fn channel(capacity: usize, consumers: usize) -> (Producer, ConsumerPool) {
    let (sender, receiver) = bounded(capacity);
    (
        Producer { sender },
        ConsumerPool {
            receiver,
            consumers,
        },
    )
}

pub fn run(
    workload: &dyn Workload,
    iterations: usize,
    consumers: usize,
    capacity: usize,
) -> Result<RunReport> {
    if capacity == 0 {
        return Err(BenchError::InvalidConfig(
            "pipeline queue capacity must be at least 1".to_string(),
        ));
    }
    if iterations == 0 {
        return Ok(RunReport {
            units_processed: 0,
            pipeline: Some(PipelineStats {
                capacity,
                consumers,
                ..Default::default()
            }),
        });
    }

    let (producer, pool) = channel(capacity, consumers);
    debug!(
        "Starting pipeline: {} tokens, {} consumers, capacity {}",
        iterations, pool.consumers(), capacity
    );

    let (producer_report, consumer_reports) = thread::scope(|scope| -> Result<_> {
        // Consumers first: if one fails to spawn, the producer never starts
        // and the already-running consumers see the queue close.
        let mut handles = Vec::with_capacity(pool.consumers);
        for id in 0..pool.consumers {
            let receiver = pool.receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("pipeline-consumer-{}", id))
                .spawn_scoped(scope, move || ConsumerPool::drain(receiver, workload))
                .map_err(|e| BenchError::Host(format!("failed to spawn consumer: {}", e)))?;
            handles.push(handle);
        }
        drop(pool);

        let producer_handle = thread::Builder::new()
            .name("pipeline-producer".to_string())
            .spawn_scoped(scope, move || producer.publish(iterations))
            .map_err(|e| BenchError::Host(format!("failed to spawn producer: {}", e)))?;

        let producer_report = producer_handle
            .join()
            .map_err(|_| BenchError::Host("pipeline producer panicked".to_string()))?;
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(
                handle
                    .join()
                    .map_err(|_| BenchError::Host("pipeline consumer panicked".to_string()))?,
            );
        }
        Ok((producer_report, reports))
    })?;

    let consumed: usize = consumer_reports.iter().map(|r| r.consumed).sum();
    let failures: Vec<TaskFailure> = consumer_reports
        .into_iter()
        .flat_map(|r| r.failures)
        .collect();

    if let Some(err) = BenchError::aggregate(failures, iterations) {
        return Err(err);
    }
    if producer_report.produced != iterations || consumed != iterations {
        return Err(BenchError::Host(format!(
            "pipeline lost tokens: produced {}, consumed {}, expected {}",
            producer_report.produced, consumed, iterations
        )));
    }

    Ok(RunReport {
        units_processed: consumed,
        pipeline: Some(PipelineStats {
            capacity,
            consumers,
            produced: producer_report.produced,
            consumed,
            peak_depth: producer_report.peak_depth,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::CountingWorkload;
    use crate::strategy::DEFAULT_QUEUE_CAPACITY;

    #[test]
    fn test_pipeline_3000_tokens_bounded() {
        let workload = CountingWorkload::new(3000);
        let report = run(&workload, 3000, 4, DEFAULT_QUEUE_CAPACITY).unwrap();

        workload.assert_exactly_once();
        let stats = report.pipeline.unwrap();
        assert_eq!(stats.produced, 3000);
        assert_eq!(stats.consumed, 3000);
        assert!(stats.peak_depth <= DEFAULT_QUEUE_CAPACITY);
        assert_eq!(stats.capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(stats.consumers, 4);
    }

    #[test]
    fn test_pipeline_tiny_queue_applies_backpressure() {
        let workload = CountingWorkload::new(500);
        let report = run(&workload, 500, 3, 1).unwrap();
        workload.assert_exactly_once();
        assert!(report.pipeline.unwrap().peak_depth <= 1);
    }

    #[test]
    fn test_pipeline_zero_tokens() {
        let workload = CountingWorkload::new(0);
        let report = run(&workload, 0, 2, 10).unwrap();
        assert_eq!(report.units_processed, 0);
        assert_eq!(report.pipeline.unwrap().produced, 0);
    }

    #[test]
    fn test_pipeline_zero_capacity_rejected() {
        let workload = CountingWorkload::new(5);
        assert!(matches!(
            run(&workload, 5, 2, 0),
            Err(BenchError::InvalidConfig(_))
        ));
        assert_eq!(workload.total(), 0);
    }

    #[test]
    fn test_pipeline_keeps_draining_after_failures() {
        let workload = CountingWorkload::new(1000)
            .failing_on(&[0, 999])
            .panicking_on(&[500]);
        let err = run(&workload, 1000, 4, 8).unwrap_err();
        workload.assert_exactly_once();
        match err {
            BenchError::AggregateTaskFailure { failures, total } => {
                assert_eq!(total, 1000);
                let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indices, vec![0, 500, 999]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_producer_closes_queue() {
        let (producer, pool) = channel(16, 1);
        let report = producer.publish(10);
        assert_eq!(report.produced, 10);
        assert_eq!(report.peak_depth, 10);
        let tokens: Vec<PipelineItem> = pool.receiver.iter().collect();
        assert_eq!(tokens, (0..10).collect::<Vec<_>>());
    }
}
