//! Bounded worker pool for per-ciphertext batch work.
//!
//! Verifiable decryption verifies and recombines every ciphertext of a
//! batch independently, so the work is fanned out over a pool of
//! `min(batch, cpu)` threads. Workers are pure functions of their index
//! and own disjoint output slots; the first failing index aborts the
//! whole batch.

use rayon::prelude::*;

use crate::errors::DkgError;

/// Number of workers for a batch of the given size.
fn worker_count(batch: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    batch.min(cpus).max(1)
}

/// Run `worker` over every index in `0..batch` and collect the results in
/// index order. An empty batch returns immediately without building a
/// pool.
pub fn parallel_for_indexed<T, F>(batch: usize, worker: F) -> Result<Vec<T>, DkgError>
where
    T: Send,
    F: Fn(usize) -> Result<T, DkgError> + Send + Sync,
{
    if batch == 0 {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(batch))
        .build()
        .map_err(|err| DkgError::Crypto(format!("worker pool: {err}")))?;

    pool.install(|| (0..batch).into_par_iter().map(&worker).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_index_order() {
        let out = parallel_for_indexed(64, |i| Ok(i * 2)).unwrap();
        assert_eq!(out.len(), 64);
        assert!(out.iter().enumerate().all(|(i, v)| *v == i * 2));
    }

    #[test]
    fn empty_batch_short_circuits() {
        let out = parallel_for_indexed(0, |_| Ok(())).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn first_failure_aborts_the_batch() {
        let err = parallel_for_indexed(16, |i| {
            if i == 7 {
                Err(DkgError::ProofInvalid("index 7".into()))
            } else {
                Ok(i)
            }
        })
        .unwrap_err();
        assert!(matches!(err, DkgError::ProofInvalid(_)));
    }

    #[test]
    fn worker_count_is_bounded_by_batch() {
        assert_eq!(worker_count(1), 1);
        let cpus = std::thread::available_parallelism().unwrap().get();
        assert_eq!(worker_count(10_000), cpus);
    }
}
