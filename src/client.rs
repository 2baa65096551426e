//! The client facade (§3 `Client`, §4.9) — the single entry point an
//! embedding application uses. It owns the cache, randomizer pool, and
//! metrics for its whole lifetime and drives the upload/download pipelines
//! per call.

use crate::backend::{Backend, Cid};
use crate::cache::{BlockCache, Cache};
use crate::config::Config;
use crate::descriptor::store::DescriptorStore;
use crate::error::NoiseFsError;
use crate::metrics::{ClientMetrics, MetricsSnapshot};
use crate::pipeline::download::DownloadPipeline;
use crate::pipeline::upload::UploadPipeline;
use crate::pipeline::CancellationToken;
use crate::randomizer::{RandomizerPool, RandomizerSource};
use std::io::{Read, Write};
use std::sync::Arc;

/// Owns everything a sequence of uploads/downloads against one backend
/// needs: the block cache, the randomizer pool (which shares that cache's
/// backend), and process-wide metrics.
pub struct Client {
    backend: Arc<dyn Backend>,
    cache: Arc<dyn Cache>,
    randomizers: Arc<dyn RandomizerSource>,
    descriptors: DescriptorStore,
    metrics: Arc<ClientMetrics>,
    config: Config,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let metrics = Arc::new(ClientMetrics::new());
        let cache: Arc<dyn Cache> = Arc::new(BlockCache::new(
            config.cache_capacity_bytes,
            config.min_personal_cache_bytes,
        ));
        let randomizers: Arc<dyn RandomizerSource> =
            Arc::new(RandomizerPool::new(backend.clone(), metrics.clone()));
        let descriptors = DescriptorStore::new(backend.clone());
        tracing::debug!(
            block_size = config.block_size,
            partitioned_cache = config.partitioned_cache(),
            "client initialized"
        );
        Self {
            backend,
            cache,
            randomizers,
            descriptors,
            metrics,
            config,
        }
    }

    /// Split, anonymize, and store `source` under `filename`. Returns the
    /// CID of the saved, plaintext descriptor.
    pub fn upload<R: Read>(&self, source: R, filename: &str) -> Result<Cid, NoiseFsError> {
        let pipeline = UploadPipeline::new(
            &self.backend,
            &self.cache,
            &self.randomizers,
            &self.metrics,
            &self.config,
        );
        let descriptor = pipeline.run(source, filename, CancellationToken::new())?;
        let cid = self.descriptors.save(&descriptor)?;
        tracing::info!(filename, %cid, blocks = descriptor.blocks.len(), "upload complete");
        Ok(cid)
    }

    /// Same as [`upload`](Self::upload), but the descriptor is encrypted
    /// with a key derived from `password` before being stored.
    pub fn encrypted_upload<R: Read>(
        &self,
        source: R,
        filename: &str,
        password: &str,
    ) -> Result<Cid, NoiseFsError> {
        let pipeline = UploadPipeline::new(
            &self.backend,
            &self.cache,
            &self.randomizers,
            &self.metrics,
            &self.config,
        );
        let descriptor = pipeline.run(source, filename, CancellationToken::new())?;
        self.descriptors.encrypted_save(&descriptor, password)
    }

    /// Load the plaintext descriptor at `cid` and reconstruct its file into
    /// `sink`. Returns [`NoiseFsError::NeedsKey`] if the descriptor is
    /// encrypted.
    pub fn download<W: Write + Send>(&self, cid: &Cid, sink: W) -> Result<(), NoiseFsError> {
        let descriptor = self.descriptors.load(cid)?;
        self.run_download(&descriptor, sink)
    }

    /// Same as [`download`](Self::download), decrypting the descriptor with
    /// a key derived from `password` first.
    pub fn encrypted_download<W: Write + Send>(
        &self,
        cid: &Cid,
        password: &str,
        sink: W,
    ) -> Result<(), NoiseFsError> {
        let descriptor = self.descriptors.encrypted_load(cid, password)?;
        self.run_download(&descriptor, sink)
    }

    fn run_download<W: Write + Send>(
        &self,
        descriptor: &crate::descriptor::Descriptor,
        sink: W,
    ) -> Result<(), NoiseFsError> {
        let pipeline = DownloadPipeline::new(&self.backend, &self.cache, &self.metrics, &self.config);
        let written = pipeline.run(descriptor, sink, CancellationToken::new())?;
        tracing::info!(filename = %descriptor.filename, written, "download complete");
        Ok(())
    }

    /// Whether the descriptor at `cid` represents a directory, without
    /// downloading its contents. Works for plaintext descriptors only — an
    /// encrypted descriptor's `is_directory` flag is inside the ciphertext.
    pub fn is_directory(&self, cid: &Cid) -> Result<bool, NoiseFsError> {
        Ok(self.descriptors.load(cid)?.is_directory())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}
