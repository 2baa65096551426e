//! Randomizer pool (§4.5) — selects the two XOR operands for each block and
//! tracks reuse so later uploads are biased toward overlapping anonymity
//! sets with earlier ones.
//!
//! # Selection policy
//! Candidates of the exact requested size are drawn with probability
//! proportional to `use_count + 1` (so never-used and once-used entries
//! still have a nonzero chance, but heavily reused entries dominate over
//! time), sampled without replacement so the two results are always
//! distinct, and the sampling itself is randomized — two calls with an
//! identical candidate pool are not guaranteed to return the same pair.
//! This satisfies the spec's "reuse-biased with randomized tie-break"
//! requirement (§4.5); the exact weighting curve (linear in `use_count`)
//! is an implementation choice recorded in `DESIGN.md`.

use crate::backend::{Backend, Cid};
use crate::block::Block;
use crate::error::NoiseFsError;
use crate::metrics::ClientMetrics;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct RandomizerRecord {
    cid: Cid,
    size: usize,
    use_count: u64,
    #[allow(dead_code)] // kept for diagnostics/future eviction policy
    first_used_at: Instant,
}

/// Contract so pipelines can be generic over the pool implementation.
pub trait RandomizerSource: Send + Sync {
    /// Returns two distinct randomizer blocks of exactly `size` bytes,
    /// along with their CIDs. Every returned block has been (or is, by the
    /// time this returns) durably `put` to the backend.
    fn select_two(&self, size: usize) -> Result<(Block, Cid, Block, Cid), NoiseFsError>;
}

/// The concrete pool described in §4.5.
pub struct RandomizerPool {
    backend: Arc<dyn Backend>,
    metrics: Arc<ClientMetrics>,
    by_size: Mutex<HashMap<usize, Vec<RandomizerRecord>>>,
}

impl RandomizerPool {
    pub fn new(backend: Arc<dyn Backend>, metrics: Arc<ClientMetrics>) -> Self {
        Self {
            backend,
            metrics,
            by_size: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, size: usize, cid: Cid) {
        let mut guard = self.by_size.lock().unwrap();
        guard.entry(size).or_default().push(RandomizerRecord {
            cid,
            size,
            use_count: 0,
            first_used_at: Instant::now(),
        });
    }

    fn mint(&self, size: usize) -> Result<(Block, Cid), NoiseFsError> {
        let block = Block::random(size);
        let cid = self.backend.put(&block)?;
        self.record(size, cid.clone());
        self.metrics.record_block_generated();
        tracing::trace!(%cid, size, "minted fresh randomizer block");
        Ok((block, cid))
    }

    /// Weighted pick-two-without-replacement over the candidate pool for
    /// `size`, biased toward high `use_count`. Returns indices into the
    /// `Vec` held under the size bucket.
    fn weighted_pick_two(records: &[RandomizerRecord]) -> (usize, usize) {
        let mut rng = rand::thread_rng();
        let weights: Vec<f64> = records.iter().map(|r| (r.use_count + 1) as f64).collect();

        let mut pick = |weights: &[f64], exclude: Option<usize>| -> usize {
            let total: f64 = weights
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != exclude)
                .map(|(_, w)| w)
                .sum();
            let mut target = rng.gen::<f64>() * total;
            for (i, w) in weights.iter().enumerate() {
                if Some(i) == exclude {
                    continue;
                }
                if target < *w {
                    return i;
                }
                target -= w;
            }
            // Floating-point edge case: fall back to the last eligible index.
            (0..weights.len())
                .rev()
                .find(|i| Some(*i) != exclude)
                .unwrap_or(0)
        };

        let first = pick(&weights, None);
        let second = pick(&weights, Some(first));
        (first, second)
    }
}

impl RandomizerSource for RandomizerPool {
    fn select_two(&self, size: usize) -> Result<(Block, Cid, Block, Cid), NoiseFsError> {
        enum Plan {
            ReuseTwo(usize, usize),
            ReuseOne(usize),
            MintTwo,
        }

        let plan = {
            let guard = self.by_size.lock().unwrap();
            match guard.get(&size).map(|v| v.len()).unwrap_or(0) {
                0 => Plan::MintTwo,
                1 => Plan::ReuseOne(0),
                _ => {
                    let records = &guard[&size];
                    let (i, j) = Self::weighted_pick_two(records);
                    Plan::ReuseTwo(i, j)
                }
            }
        };

        match plan {
            Plan::MintTwo => {
                let (b1, c1) = self.mint(size)?;
                let (b2, c2) = self.mint(size)?;
                self.touch(&c1);
                self.touch(&c2);
                Ok((b1, c1, b2, c2))
            }
            Plan::ReuseOne(idx) => {
                let existing_cid = {
                    let guard = self.by_size.lock().unwrap();
                    guard[&size][idx].cid.clone()
                };
                let existing_block = self.backend.get(&existing_cid)?;
                self.metrics.record_block_reused();
                tracing::trace!(cid = %existing_cid, "reused randomizer block");
                let (fresh_block, fresh_cid) = self.mint(size)?;
                self.touch(&existing_cid);
                self.touch(&fresh_cid);
                Ok((existing_block, existing_cid, fresh_block, fresh_cid))
            }
            Plan::ReuseTwo(i, j) => {
                let (cid_a, cid_b) = {
                    let guard = self.by_size.lock().unwrap();
                    let records = &guard[&size];
                    (records[i].cid.clone(), records[j].cid.clone())
                };
                let block_a = self.backend.get(&cid_a)?;
                let block_b = self.backend.get(&cid_b)?;
                self.metrics.record_block_reused();
                self.metrics.record_block_reused();
                self.touch(&cid_a);
                self.touch(&cid_b);
                Ok((block_a, cid_a, block_b, cid_b))
            }
        }
    }
}

impl RandomizerPool {
    /// Increment `use_count` for the record matching `cid`, across all size
    /// buckets (a CID only ever appears in one).
    fn touch(&self, cid: &Cid) {
        let mut guard = self.by_size.lock().unwrap();
        for records in guard.values_mut() {
            if let Some(r) = records.iter_mut().find(|r| &r.cid == cid) {
                r.use_count += 1;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn pool() -> RandomizerPool {
        RandomizerPool::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ClientMetrics::new()),
        )
    }

    #[test]
    fn first_selection_mints_two_distinct_blocks() {
        let pool = pool();
        let (b1, c1, b2, c2) = pool.select_two(64).unwrap();
        assert_ne!(c1, c2);
        assert_eq!(b1.size(), 64);
        assert_eq!(b2.size(), 64);
        assert_eq!(pool.metrics.snapshot().blocks_generated, 2);
    }

    #[test]
    fn second_selection_reuses_at_least_one() {
        let pool = pool();
        pool.select_two(64).unwrap();
        pool.select_two(64).unwrap();
        assert!(pool.metrics.snapshot().blocks_reused >= 1);
    }

    #[test]
    fn every_returned_randomizer_is_retrievable() {
        let pool = pool();
        let (_, c1, _, c2) = pool.select_two(32).unwrap();
        assert!(pool.backend.has(&c1));
        assert!(pool.backend.has(&c2));
    }

    #[test]
    fn reuse_rate_is_monotone_non_decreasing_across_uploads() {
        let pool = pool();
        let mut last = 0.0;
        for _ in 0..10 {
            pool.select_two(64).unwrap();
            let rate = pool.metrics.reuse_rate();
            assert!(rate >= last - f64::EPSILON);
            last = rate;
        }
    }
}
