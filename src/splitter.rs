//! Splitter and Assembler (§4.2) — the streaming boundary between a byte
//! source/sink and the ordered block sequence the rest of the engine moves.

use crate::block::Block;
use crate::error::NoiseFsError;
use std::io::Read;

/// Receives blocks from the [`Splitter`] in emission order (which is always
/// ascending ordinal — the splitter itself never reorders).
pub trait BlockSink {
    fn process_block(&mut self, ordinal: u64, block: Block) -> Result<(), NoiseFsError>;
}

/// Progress observed by a caller driving a long-running split.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitProgress {
    pub bytes_read: u64,
    pub blocks_emitted: u64,
}

/// Reads a byte source and emits fixed-size blocks to a [`BlockSink`].
///
/// Never buffers more than one block at a time: [`Splitter::run`] reads
/// exactly `block_size` bytes (or fewer, at EOF) into a single reusable
/// buffer, hands ownership of the resulting [`Block`] to the sink, and only
/// then reads the next chunk. The final block is zero-padded to
/// `block_size`; an empty source yields zero blocks.
pub struct Splitter {
    block_size: usize,
    progress: SplitProgress,
}

impl Splitter {
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block_size must be nonzero");
        Self {
            block_size,
            progress: SplitProgress::default(),
        }
    }

    pub fn progress(&self) -> SplitProgress {
        self.progress
    }

    /// Split `source` into blocks of exactly `block_size` bytes, calling
    /// `sink.process_block` once per block, then calling `admit` before
    /// every read to let the caller apply backpressure (the pipeline's
    /// memory-limit admission gate hooks in here — §4.7).
    ///
    /// Returns the total number of plaintext bytes read.
    pub fn run<R: Read, S: BlockSink>(
        &mut self,
        mut source: R,
        sink: &mut S,
        mut admit: impl FnMut(usize) -> Result<(), NoiseFsError>,
    ) -> Result<u64, NoiseFsError> {
        let mut ordinal = 0u64;
        let mut total_read = 0u64;
        let mut buf = vec![0u8; self.block_size];

        loop {
            let mut filled = 0usize;
            while filled < self.block_size {
                let n = source.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                if filled == 0 {
                    // Admit only once we know this iteration will actually
                    // produce a block — a final EOF-only iteration must
                    // never reserve a token that nothing downstream will
                    // ever release.
                    admit(self.block_size)?;
                }
                filled += n;
            }

            if filled == 0 {
                break;
            }

            total_read += filled as u64;

            let mut block_bytes = buf.clone();
            if filled < self.block_size {
                // Zero-pad the final, short block up to block_size.
                for byte in &mut block_bytes[filled..] {
                    *byte = 0;
                }
            }

            sink.process_block(ordinal, Block::new(block_bytes))?;
            self.progress.bytes_read = total_read;
            self.progress.blocks_emitted = ordinal + 1;
            ordinal += 1;

            if filled < self.block_size {
                break;
            }
        }

        Ok(total_read)
    }
}

/// Consumes `(ordinal, Block)` pairs, possibly arriving out of order, and
/// writes them to a byte sink in strictly ascending ordinal order.
///
/// Maintains a small reorder buffer keyed by ordinal; `feed` never writes
/// ordinal *n* before ordinal *n-1* has been written. Since every
/// reconstructed block is exactly `block_size` bytes (the splitter
/// zero-pads the last one), `feed` trims the padding off the final block
/// itself as it writes — `original_size` must be known up front because an
/// arbitrary `Write` sink (unlike a `Vec<u8>`) cannot be truncated after
/// the fact.
pub struct Assembler<W: std::io::Write> {
    sink: W,
    original_size: u64,
    next_ordinal: u64,
    pending: std::collections::HashMap<u64, Block>,
    bytes_written: u64,
}

impl<W: std::io::Write> Assembler<W> {
    pub fn new(sink: W, original_size: u64) -> Self {
        Self {
            sink,
            original_size,
            next_ordinal: 0,
            pending: std::collections::HashMap::new(),
            bytes_written: 0,
        }
    }

    /// Feed one reconstructed block. Writes any contiguous run that this
    /// block completes, in ordinal order, trimming the final block down to
    /// whatever is left of `original_size`. Returns how many blocks were
    /// actually written this call (zero if `ordinal` is still waiting on an
    /// earlier one), so a caller tracking resident memory per block can
    /// release exactly what was just flushed rather than what was merely
    /// handed to `feed`.
    pub fn feed(&mut self, ordinal: u64, block: Block) -> Result<usize, NoiseFsError> {
        self.pending.insert(ordinal, block);
        let mut flushed = 0usize;
        while let Some(block) = self.pending.remove(&self.next_ordinal) {
            let remaining = self.original_size.saturating_sub(self.bytes_written);
            let take = (block.size() as u64).min(remaining) as usize;
            self.sink.write_all(&block.as_bytes()[..take])?;
            self.bytes_written += take as u64;
            self.next_ordinal += 1;
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Flush the sink and confirm exactly `original_size` bytes were
    /// written, returning that count.
    pub fn finalize(&mut self) -> Result<u64, NoiseFsError> {
        if !self.pending.is_empty() {
            return Err(NoiseFsError::MissingBlock(self.next_ordinal));
        }
        self.sink.flush()?;
        if self.bytes_written < self.original_size {
            return Err(NoiseFsError::IntegrityError(format!(
                "assembled {} bytes, expected {}",
                self.bytes_written, self.original_size
            )));
        }
        Ok(self.bytes_written)
    }
}

/// An `Assembler` specialization for `Vec<u8>` sinks, which is what the
/// download pipeline uses in practice: accumulate into a buffer, then trim
/// it to `original_size` exactly (rather than relying on the sink to know
/// how to truncate itself).
pub struct VecAssembler {
    next_ordinal: u64,
    pending: std::collections::HashMap<u64, Block>,
    buf: Vec<u8>,
}

impl VecAssembler {
    pub fn new() -> Self {
        Self {
            next_ordinal: 0,
            pending: std::collections::HashMap::new(),
            buf: Vec::new(),
        }
    }

    pub fn feed(&mut self, ordinal: u64, block: Block) -> Result<(), NoiseFsError> {
        self.pending.insert(ordinal, block);
        while let Some(block) = self.pending.remove(&self.next_ordinal) {
            self.buf.extend_from_slice(block.as_bytes());
            self.next_ordinal += 1;
        }
        Ok(())
    }

    /// Trim to exactly `original_size` bytes and return the finished buffer.
    pub fn finalize(mut self, original_size: u64) -> Result<Vec<u8>, NoiseFsError> {
        if !self.pending.is_empty() {
            return Err(NoiseFsError::MissingBlock(self.next_ordinal));
        }
        if (self.buf.len() as u64) < original_size {
            return Err(NoiseFsError::IntegrityError(format!(
                "assembled {} bytes, expected {}",
                self.buf.len(),
                original_size
            )));
        }
        self.buf.truncate(original_size as usize);
        Ok(self.buf)
    }
}

impl Default for VecAssembler {
    fn default() -> Self {
        Self::new()
    }
}
