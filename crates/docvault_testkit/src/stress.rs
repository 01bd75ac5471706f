//! Stress tests for DocVault.
//!
//! These helpers drive a store from many threads at once and report
//! throughput and the admission controller's peak.

use docvault_core::{Document, StorageEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
    /// Highest number of operations admitted at once.
    pub peak_in_flight: usize,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration, peak_in_flight: usize) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
            peak_in_flight,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
        println!("Peak in flight: {}", self.peak_in_flight);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of the `body` field in bytes.
    pub document_size: usize,
    /// Collection to write to.
    pub collection: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 8,
            document_size: 256,
            collection: "stress".to_string(),
        }
    }
}

fn stress_document(id: String, size: usize) -> Document {
    Document::new(id).with("body", "x".repeat(size))
}

/// Each thread creates its own documents, then reads each back.
pub fn stress_concurrent_writes(engine: &Arc<StorageEngine>, config: &StressConfig) -> StressTestResult {
    engine.scheduler().reset_peak();
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(engine);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..config.operations {
                    let id = format!("t{t}-{i}");
                    let ok = engine
                        .create(&config.collection, stress_document(id.clone(), config.document_size))
                        .and_then(|_| engine.find_by_id(&config.collection, &id))
                        .is_ok();
                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
        engine.scheduler().peak_in_flight(),
    )
}

/// All threads update the same small set of documents.
///
/// Every update must succeed and every final document must decode; which
/// thread's write lands last is unspecified.
pub fn stress_contended_updates(
    engine: &Arc<StorageEngine>,
    config: &StressConfig,
    hot_documents: usize,
) -> StressTestResult {
    for i in 0..hot_documents {
        let _ = engine.create(&config.collection, stress_document(format!("hot{i}"), 8));
    }
    engine.scheduler().reset_peak();

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(engine);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..config.operations {
                    let id = format!("hot{}", i % hot_documents.max(1));
                    let doc = stress_document(id.clone(), config.document_size).with("writer", t);
                    match engine.update(&config.collection, &id, doc) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
        engine.scheduler().peak_in_flight(),
    )
}
