//! Fixed-size worker pool for per-example stage work.
//!
//! Every item is tagged with its index, mapped on a rayon pool, and the results
//! are sorted by index before they are returned, so output order always matches
//! input order regardless of scheduling.

use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;

use crate::error::StageError;

use super::io::StageResult;

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".into()
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> StageResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("kgpath-worker-{i}"))
            .build()
            .map_err(|e| StageError::Pool {
                message: e.to_string(),
            })?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `f` to every item in parallel and return the results in input order.
    ///
    /// A failing or panicking item fails the whole stage; the reported index is
    /// the smallest failing one.
    pub fn map_ordered<I, O, F>(&self, stage: &str, items: &[I], f: F) -> StageResult<Vec<O>>
    where
        I: Sync,
        O: Send,
        F: Fn(usize, &I) -> Result<O, String> + Sync,
    {
        let mut tagged: Vec<(usize, Result<O, String>)> = self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| {
                    let result = catch_unwind(AssertUnwindSafe(|| f(index, item)))
                        .unwrap_or_else(|payload| Err(panic_message(payload)));
                    (index, result)
                })
                .collect()
        });
        tagged.sort_unstable_by_key(|(index, _)| *index);

        let mut outputs = Vec::with_capacity(tagged.len());
        for (index, result) in tagged {
            match result {
                Ok(output) => outputs.push(output),
                Err(message) => {
                    tracing::error!(stage, index, %message, "stage failed");
                    return Err(StageError::Example {
                        stage: stage.to_string(),
                        index,
                        message,
                    });
                }
            }
        }
        Ok(outputs)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_order_matches_input_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<u64> = (0..500).collect();
        let out = pool
            .map_ordered("square", &items, |_, &x| {
                // Uneven work so completion order differs from input order.
                if x % 7 == 0 {
                    std::thread::sleep(std::time::Duration::from_micros(200));
                }
                Ok(x * x)
            })
            .unwrap();
        assert_eq!(out, items.iter().map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn smallest_failing_index_is_reported() {
        let pool = WorkerPool::new(3).unwrap();
        let items: Vec<u32> = (0..100).collect();
        let err = pool
            .map_ordered("find-paths", &items, |i, _| {
                if i == 41 || i == 77 {
                    Err(format!("bad example {i}"))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        match err {
            StageError::Example { stage, index, message } => {
                assert_eq!(stage, "find-paths");
                assert_eq!(index, 41);
                assert_eq!(message, "bad example 41");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn panics_become_stage_errors() {
        let pool = WorkerPool::new(2).unwrap();
        let err = pool
            .map_ordered("score-paths", &[1, 2, 3], |_, &x: &i32| {
                if x == 2 {
                    panic!("embedding table exploded");
                }
                Ok(x)
            })
            .unwrap_err();
        assert!(matches!(err, StageError::Example { index: 1, .. }));
        assert!(err.to_string().contains("score-paths"));
    }

    #[test]
    fn empty_input_is_fine() {
        let pool = WorkerPool::new(1).unwrap();
        let out: Vec<u8> = pool.map_ordered("noop", &[] as &[u8], |_, &x| Ok(x)).unwrap();
        assert!(out.is_empty());
    }
}
