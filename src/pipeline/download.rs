//! Download pipeline (§4.8) — mirrors the upload pipeline with three
//! stages: **F** (fetch the data block and both randomizers, cache first),
//! **R** (reconstruct the plaintext block via XOR), and **W** (write
//! reconstructed blocks to the output sink in original block order).

use crate::backend::{Backend, Cid};
use crate::block::Block;
use crate::cache::{Cache, Partition};
use crate::config::Config;
use crate::descriptor::{BlockTriple, Descriptor};
use crate::error::NoiseFsError;
use crate::metrics::ClientMetrics;
use crate::pipeline::{retry_with_backoff, with_timeout, CancellationToken, MemoryGate};
use crate::splitter::Assembler;
use std::io::Write;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};

pub struct DownloadPipeline<'a> {
    pub backend: &'a Arc<dyn Backend>,
    pub cache: &'a Arc<dyn Cache>,
    pub metrics: &'a Arc<ClientMetrics>,
    pub config: &'a Config,
}

struct FMessage {
    ordinal: u64,
    data: Block,
    r1: Block,
    r2: Block,
}

struct RMessage {
    ordinal: u64,
    block: Block,
}

impl<'a> DownloadPipeline<'a> {
    pub fn new(
        backend: &'a Arc<dyn Backend>,
        cache: &'a Arc<dyn Cache>,
        metrics: &'a Arc<ClientMetrics>,
        config: &'a Config,
    ) -> Self {
        Self {
            backend,
            cache,
            metrics,
            config,
        }
    }

    fn fetch_one(&self, cid: &Cid, cancel: &CancellationToken) -> Result<Block, NoiseFsError> {
        if let Some(block) = self.cache.get(cid) {
            self.metrics.record_cache_hit();
            return Ok(block);
        }
        self.metrics.record_cache_miss();
        let backend_timeout = self.config.backend_timeout;
        let block = retry_with_backoff(self.config.retry_max_attempts, cancel, || {
            let backend = self.backend.clone();
            let cid = cid.clone();
            with_timeout(backend_timeout, move || backend.get(&cid))
        })?;
        self.cache.put(cid.clone(), block.clone(), Partition::Personal);
        Ok(block)
    }

    /// Reconstruct `descriptor` and write its bytes to `sink`. Returns the
    /// number of bytes written (always `descriptor.original_size` on
    /// success).
    pub fn run<W: Write + Send>(
        &self,
        descriptor: &Descriptor,
        sink: W,
        cancel: CancellationToken,
    ) -> Result<u64, NoiseFsError> {
        let queue_depth = self.config.stream_buffer_size.max(1);
        let workers = self.config.max_concurrent_ops.max(1);
        // Resident per in-flight ordinal: data + r1 + r2 fetched in stage F,
        // plus the reconstructed block waiting in stage W's reorder buffer —
        // mirrors the upload pipeline's four-block-size accounting.
        let block_size = (descriptor.block_size as usize).max(1);
        let per_block_reservation = 4 * block_size;
        let gate = MemoryGate::new(self.config.memory_limit.max(per_block_reservation));

        let (tx_work, rx_work) = sync_channel::<(u64, BlockTriple)>(queue_depth);
        let (tx_f, rx_f) = sync_channel::<FMessage>(queue_depth);
        let (tx_r, rx_r) = sync_channel::<RMessage>(queue_depth);
        let rx_work: Mutex<Receiver<(u64, BlockTriple)>> = Mutex::new(rx_work);
        let rx_f: Mutex<Receiver<FMessage>> = Mutex::new(rx_f);
        let rx_r: Mutex<Receiver<RMessage>> = Mutex::new(rx_r);

        let error: Mutex<Option<NoiseFsError>> = Mutex::new(None);
        let record_error = |slot: &Mutex<Option<NoiseFsError>>, e: NoiseFsError, cancel: &CancellationToken| {
            cancel.cancel();
            let mut guard = slot.lock().unwrap();
            if guard.is_none() {
                *guard = Some(e);
            }
        };

        let assembler = Mutex::new(Assembler::new(sink, descriptor.original_size));
        let write_error: Mutex<Option<NoiseFsError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            // Stage W — single writer, flushes contiguous runs as they arrive
            // and releases the feeder's reservation for each block actually
            // written (not merely received — a block stuck behind a gap in
            // the reorder buffer is still resident).
            scope.spawn(|| {
                while let Ok(msg) = rx_r.lock().unwrap().recv() {
                    match assembler.lock().unwrap().feed(msg.ordinal, msg.block) {
                        Ok(flushed) => gate.release(flushed * per_block_reservation),
                        Err(e) => {
                            *write_error.lock().unwrap() = Some(e);
                            return;
                        }
                    }
                }
            });

            // Stage R workers — reconstruct via XOR.
            for _ in 0..workers {
                let rx_f = &rx_f;
                let tx_r = tx_r.clone();
                let error = &error;
                let cancel = cancel.clone();
                scope.spawn(move || loop {
                    let msg = {
                        let rx = rx_f.lock().unwrap();
                        rx.recv()
                    };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(_) => break,
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    match msg.data.xor3(&msg.r1, &msg.r2) {
                        Ok(block) => {
                            if tx_r
                                .send(RMessage {
                                    ordinal: msg.ordinal,
                                    block,
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
            drop(tx_r);

            // Stage F workers — fetch data + randomizer blocks.
            for _ in 0..workers {
                let rx_work = &rx_work;
                let tx_f = tx_f.clone();
                let error = &error;
                let cancel = cancel.clone();
                scope.spawn(move || loop {
                    let msg = {
                        let rx = rx_work.lock().unwrap();
                        rx.recv()
                    };
                    let (ordinal, triple) = match msg {
                        Ok(m) => m,
                        Err(_) => break,
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    let fetched = self
                        .fetch_one(&triple.data_cid, &cancel)
                        .and_then(|data| {
                            let r1 = self.fetch_one(&triple.r1_cid, &cancel)?;
                            let r2 = self.fetch_one(&triple.r2_cid, &cancel)?;
                            Ok((data, r1, r2))
                        });
                    match fetched {
                        Ok((data, r1, r2)) => {
                            if tx_f
                                .send(FMessage {
                                    ordinal,
                                    data,
                                    r1,
                                    r2,
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
            drop(tx_f);

            // Feeder — gates intake on the same memory bound the upload
            // pipeline's splitter honors, releasing only once stage W has
            // actually written a block's bytes out.
            for (ordinal, triple) in descriptor.blocks.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = gate.acquire(per_block_reservation, &cancel) {
                    record_error(&error, e, &cancel);
                    break;
                }
                if tx_work.send((ordinal as u64, triple.clone())).is_err() {
                    break;
                }
            }
            drop(tx_work);
        });

        // Every stage has stopped touching `gate` by now — a stage that hit
        // an error or saw cancellation may have broken out still holding a
        // reservation, so force the counter back to zero here rather than
        // relying on each break site to release exactly what it held.
        gate.drain();

        if let Some(e) = error.into_inner().unwrap() {
            return Err(e);
        }
        if let Some(e) = write_error.into_inner().unwrap() {
            return Err(e);
        }
        cancel.check()?;

        let written = assembler.into_inner().unwrap().finalize()?;

        self.metrics.record_file_downloaded();
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::BlockCache;
    use crate::pipeline::upload::UploadPipeline;
    use crate::randomizer::{RandomizerPool, RandomizerSource};

    fn roundtrip(data: &[u8], block_size: usize) -> Vec<u8> {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let cache: Arc<dyn Cache> = Arc::new(BlockCache::new(1024 * 1024, 0));
        let metrics = Arc::new(ClientMetrics::new());
        let randomizers: Arc<dyn RandomizerSource> =
            Arc::new(RandomizerPool::new(backend.clone(), metrics.clone()));
        let mut config = Config::default();
        config.block_size = block_size;

        let upload = UploadPipeline::new(&backend, &cache, &randomizers, &metrics, &config);
        let descriptor = upload
            .run(data, "f.bin", CancellationToken::new())
            .unwrap();

        let download = DownloadPipeline::new(&backend, &cache, &metrics, &config);
        let mut out = Vec::new();
        download
            .run(&descriptor, &mut out, CancellationToken::new())
            .unwrap();
        out
    }

    #[test]
    fn roundtrips_unaligned_file() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        assert_eq!(roundtrip(&data, 8), data);
    }

    #[test]
    fn roundtrips_empty_file() {
        let data = Vec::new();
        assert_eq!(roundtrip(&data, 16), data);
    }

    #[test]
    fn roundtrips_single_aligned_block() {
        let data = vec![0x7fu8; 32];
        assert_eq!(roundtrip(&data, 32), data);
    }
}
