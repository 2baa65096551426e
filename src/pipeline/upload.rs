//! Upload pipeline (§4.7) — three concurrent stages connected by bounded
//! queues: **X** (XOR each plaintext block against two randomizers), **S**
//! (store the anonymized block to the backend, retrying transient errors),
//! and **D** (assemble the resulting triples into a [`Descriptor`] in
//! original block order). The splitter feeds stage X directly; nothing
//! downstream ever sees plaintext.

use crate::backend::{Backend, Cid};
use crate::block::Block;
use crate::cache::Cache;
use crate::config::Config;
use crate::descriptor::{BlockTriple, Descriptor};
use crate::error::NoiseFsError;
use crate::metrics::ClientMetrics;
use crate::pipeline::{retry_with_backoff, with_timeout, CancellationToken, MemoryGate};
use crate::randomizer::RandomizerSource;
use crate::splitter::{BlockSink, Splitter};
use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};

/// Runs the three-stage upload pipeline over a single file.
pub struct UploadPipeline<'a> {
    pub backend: &'a Arc<dyn Backend>,
    pub cache: &'a Arc<dyn Cache>,
    pub randomizers: &'a Arc<dyn RandomizerSource>,
    pub metrics: &'a Arc<ClientMetrics>,
    pub config: &'a Config,
}

struct XMessage {
    ordinal: u64,
    anon: Block,
    r1: Cid,
    r2: Cid,
}

struct SMessage {
    ordinal: u64,
    data: Cid,
    r1: Cid,
    r2: Cid,
}

struct SplitSink {
    tx: SyncSender<(u64, Block)>,
    cancel: CancellationToken,
}

impl BlockSink for SplitSink {
    fn process_block(&mut self, ordinal: u64, block: Block) -> Result<(), NoiseFsError> {
        self.cancel.check()?;
        self.tx
            .send((ordinal, block))
            .map_err(|_| NoiseFsError::Cancelled)?;
        Ok(())
    }
}

impl<'a> UploadPipeline<'a> {
    pub fn new(
        backend: &'a Arc<dyn Backend>,
        cache: &'a Arc<dyn Cache>,
        randomizers: &'a Arc<dyn RandomizerSource>,
        metrics: &'a Arc<ClientMetrics>,
        config: &'a Config,
    ) -> Self {
        Self {
            backend,
            cache,
            randomizers,
            metrics,
            config,
        }
    }

    /// Upload `source` under `filename`, returning the finished (unsaved)
    /// [`Descriptor`]. Persisting the descriptor itself is the caller's job
    /// (`crate::client::Client` does it via `DescriptorStore`).
    pub fn run<R: Read>(
        &self,
        source: R,
        filename: &str,
        cancel: CancellationToken,
    ) -> Result<Descriptor, NoiseFsError> {
        let block_size = self.config.block_size;
        let queue_depth = self.config.stream_buffer_size.max(1);
        let workers = self.config.max_concurrent_ops.max(1);
        // Stage X holds up to four block-size buffers per in-flight ordinal
        // at once (plaintext, both randomizers, and the anonymized result),
        // so that's the real per-block reservation, not one block_size.
        let per_block_reservation = 4 * block_size;
        let gate = MemoryGate::new(self.config.memory_limit.max(per_block_reservation));

        let (tx1, rx1) = sync_channel::<(u64, Block)>(queue_depth);
        let (tx2, rx2) = sync_channel::<XMessage>(queue_depth);
        let (tx3, rx3) = sync_channel::<SMessage>(queue_depth);
        let rx1 = Mutex::new(rx1);
        let rx2 = Mutex::new(rx2);
        let rx3 = Mutex::new(rx3);

        let error: Mutex<Option<NoiseFsError>> = Mutex::new(None);
        let record_error = |slot: &Mutex<Option<NoiseFsError>>, e: NoiseFsError, cancel: &CancellationToken| {
            cancel.cancel();
            let mut guard = slot.lock().unwrap();
            if guard.is_none() {
                *guard = Some(e);
            }
        };

        let triples: Mutex<HashMap<u64, BlockTriple>> = Mutex::new(HashMap::new());
        let mut total_read = 0u64;

        std::thread::scope(|scope| {
            // Stage D — single aggregator, no contention needed.
            scope.spawn(|| {
                while let Ok(msg) = rx3.lock().unwrap().recv() {
                    triples.lock().unwrap().insert(
                        msg.ordinal,
                        BlockTriple::new(msg.data, msg.r1, msg.r2),
                    );
                }
            });

            // Stage S workers.
            for _ in 0..workers {
                let rx2 = &rx2;
                let tx3 = tx3.clone();
                let error = &error;
                let cancel = cancel.clone();
                let gate = gate.clone();
                scope.spawn(move || loop {
                    let msg = {
                        let rx = rx2.lock().unwrap();
                        rx.recv()
                    };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(_) => break,
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    let backend_timeout = self.config.backend_timeout;
                    let put_result = retry_with_backoff(self.config.retry_max_attempts, &cancel, || {
                        let backend = self.backend.clone();
                        let block = msg.anon.clone();
                        with_timeout(backend_timeout, move || backend.put(&block))
                    });
                    match put_result {
                        Ok(data_cid) => {
                            // bytes_stored counts storage amplification: one
                            // anonymized block implies three equal-size
                            // blocks backing it (data + two randomizers),
                            // whether or not the randomizers were freshly
                            // minted this call.
                            self.metrics.add_bytes_stored(3 * msg.anon.size() as u64);
                            tracing::trace!(ordinal = msg.ordinal, %data_cid, "anonymized block stored");
                            gate.release(per_block_reservation);
                            if tx3
                                .send(SMessage {
                                    ordinal: msg.ordinal,
                                    data: data_cid,
                                    r1: msg.r1,
                                    r2: msg.r2,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            record_error(error, e, &cancel);
                            break;
                        }
                    }
                });
            }
            drop(tx3);

            // Stage X workers.
            for _ in 0..workers {
                let rx1 = &rx1;
                let tx2 = tx2.clone();
                let error = &error;
                let cancel = cancel.clone();
                scope.spawn(move || loop {
                    let msg = {
                        let rx = rx1.lock().unwrap();
                        rx.recv()
                    };
                    let (ordinal, plaintext) = match msg {
                        Ok(m) => m,
                        Err(_) => break,
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    let selection = self.randomizers.select_two(plaintext.size());
                    let (r1_block, r1_cid, r2_block, r2_cid) = match selection {
                        Ok(v) => v,
                        Err(e) => {
                            record_error(error, e, &cancel);
                            break;
                        }
                    };
                    match plaintext.xor3(&r1_block, &r2_block) {
                        Ok(anon) => {
                            if tx2
                                .send(XMessage {
                                    ordinal,
                                    anon,
                                    r1: r1_cid,
                                    r2: r2_cid,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            record_error(error, e, &cancel);
                            break;
                        }
                    }
                });
            }
            drop(tx2);

            // Splitter runs on this thread, feeding stage X directly.
            let mut splitter = Splitter::new(block_size);
            let mut sink = SplitSink {
                tx: tx1,
                cancel: cancel.clone(),
            };
            let gate_for_admit = gate.clone();
            let cancel_for_admit = cancel.clone();
            let read_result = splitter.run(source, &mut sink, |_| {
                gate_for_admit.acquire(per_block_reservation, &cancel_for_admit)
            });
            drop(sink);

            match read_result {
                Ok(n) => total_read = n,
                Err(e) => record_error(&error, e, &cancel),
            }
        });

        // Every stage has stopped touching `gate` by now — a stage that hit
        // an error or saw cancellation may have broken out still holding a
        // reservation, so force the counter back to zero here rather than
        // relying on each break site to release exactly what it held.
        gate.drain();

        if let Some(e) = error.into_inner().unwrap() {
            return Err(e);
        }
        cancel.check()?;

        let triples = triples.into_inner().unwrap();
        let mut descriptor = Descriptor::new(filename, total_read, block_size as u32);
        let expected = descriptor.expected_block_count();
        descriptor.blocks = Vec::with_capacity(expected as usize);
        for ordinal in 0..expected {
            let triple = triples
                .get(&ordinal)
                .cloned()
                .ok_or(NoiseFsError::MissingBlock(ordinal))?;
            descriptor.blocks.push(triple);
        }

        self.metrics.add_bytes_uploaded_original(total_read);
        self.metrics.record_file_uploaded();
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::BlockCache;
    use crate::randomizer::RandomizerPool;

    fn pipeline_parts() -> (
        Arc<dyn Backend>,
        Arc<dyn Cache>,
        Arc<dyn RandomizerSource>,
        Arc<ClientMetrics>,
        Config,
    ) {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let cache: Arc<dyn Cache> = Arc::new(BlockCache::new(1024 * 1024, 0));
        let metrics = Arc::new(ClientMetrics::new());
        let randomizers: Arc<dyn RandomizerSource> =
            Arc::new(RandomizerPool::new(backend.clone(), metrics.clone()));
        let mut config = Config::default();
        config.block_size = 16;
        (backend, cache, randomizers, metrics, config)
    }

    #[test]
    fn uploads_unaligned_file_with_correct_block_count() {
        let (backend, cache, randomizers, metrics, config) = pipeline_parts();
        let pipeline = UploadPipeline::new(&backend, &cache, &randomizers, &metrics, &config);
        let data = vec![0x42u8; 16 * 4 + 3];
        let descriptor = pipeline
            .run(&data[..], "file.bin", CancellationToken::new())
            .unwrap();
        assert_eq!(descriptor.original_size, data.len() as u64);
        assert_eq!(descriptor.blocks.len(), 5);
    }

    #[test]
    fn uploads_empty_file_with_zero_blocks() {
        let (backend, cache, randomizers, metrics, config) = pipeline_parts();
        let pipeline = UploadPipeline::new(&backend, &cache, &randomizers, &metrics, &config);
        let descriptor = pipeline
            .run(&b""[..], "empty.bin", CancellationToken::new())
            .unwrap();
        assert_eq!(descriptor.original_size, 0);
        assert!(descriptor.blocks.is_empty());
    }

    #[test]
    fn cancelling_before_run_aborts_immediately() {
        let (backend, cache, randomizers, metrics, config) = pipeline_parts();
        let pipeline = UploadPipeline::new(&backend, &cache, &randomizers, &metrics, &config);
        let token = CancellationToken::new();
        token.cancel();
        let data = vec![0u8; 64];
        let result = pipeline.run(&data[..], "file.bin", token);
        assert!(matches!(result, Err(NoiseFsError::Cancelled)));
    }
}
