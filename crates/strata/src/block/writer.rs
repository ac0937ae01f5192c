//! Cutting a timestamp-ordered record stream into blocks.

use crate::block::{Block, CompressionType};
use crate::error::{Result, StrataError};
use crate::record::{Record, TimeSeriesRecord};
use crate::schema::{TimeRange, TimeSeriesDefinition};
use std::io::Write;
use tracing::debug;

/// Default payload size (before compression) at which a block is cut: 64 KiB.
pub const DEFAULT_BLOCK_SIZE_THRESHOLD: usize = 64 * 1024;

/// Configuration for [`BlockWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWriterConfig {
    /// Codec applied to every block payload.
    ///
    /// Default: no compression.
    pub compression: CompressionType,

    /// Uncompressed payload size at which the current block is cut.
    ///
    /// The block is cut after the record that reaches the threshold, so blocks
    /// may exceed it by one record. Default: 64 KiB.
    pub block_size_threshold: usize,
}

impl Default for BlockWriterConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::default(),
            block_size_threshold: DEFAULT_BLOCK_SIZE_THRESHOLD,
        }
    }
}

impl BlockWriterConfig {
    /// Creates a new configuration with a custom codec.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Creates a new configuration with a custom size threshold.
    pub fn with_block_size_threshold(mut self, threshold: usize) -> Self {
        self.block_size_threshold = threshold;
        self
    }
}

/// Writes blocks of records to a byte sink.
///
/// Records are appended fully resolved and in timestamp order. The writer
/// delta-encodes them per record type and cuts a block whenever a record falls in
/// a new partition or the pending payload reaches the size threshold.
#[derive(Debug)]
pub struct BlockWriter<'a, W: Write> {
    definition: &'a TimeSeriesDefinition,
    config: BlockWriterConfig,
    sink: W,
    pending: Vec<TimeSeriesRecord>,
    pending_size: usize,
    partition: Option<TimeRange>,
    last_timestamp: Option<i64>,
    blocks_written: usize,
    bytes_written: usize,
}

impl<'a, W: Write> BlockWriter<'a, W> {
    /// Creates a writer with the default configuration.
    pub fn new(definition: &'a TimeSeriesDefinition, sink: W) -> Self {
        Self::with_config(definition, sink, BlockWriterConfig::default())
    }

    /// Creates a writer with a custom configuration.
    pub fn with_config(definition: &'a TimeSeriesDefinition, sink: W, config: BlockWriterConfig) -> Self {
        Self {
            definition,
            config,
            sink,
            pending: Vec::new(),
            pending_size: 0,
            partition: None,
            last_timestamp: None,
            blocks_written: 0,
            bytes_written: 0,
        }
    }

    /// Appends a fully resolved record.
    ///
    /// # Errors
    ///
    /// Fails with `StrataError::InvalidFormat` for delta records and for records
    /// older than the previous one.
    pub fn append(&mut self, record: &dyn Record) -> Result<()> {
        if record.is_delta()? {
            return Err(StrataError::InvalidFormat(
                "block writer expects resolved records".into(),
            ));
        }
        self.definition.record_type(record.record_type())?;
        let timestamp = record.timestamp()?.timestamp_in_nanos()?;
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                return Err(StrataError::InvalidFormat(format!(
                    "record at {} appended after {}",
                    timestamp, last
                )));
            }
        }
        self.last_timestamp = Some(timestamp);

        let partition = match self.partition {
            Some(range) if range.contains(timestamp) => range,
            _ => self.definition.partition_range(timestamp)?,
        };
        if self.partition != Some(partition) {
            if !self.pending.is_empty() {
                debug!(partition = %partition, "Partition changed, cutting block");
            }
            self.flush()?;
            self.partition = Some(partition);
        }

        self.pending_size += record.framed_size()?;
        self.pending.push(record.to_record()?);
        if self.pending_size >= self.config.block_size_threshold {
            debug!(size = self.pending_size, "Block size threshold reached, cutting block");
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the pending records as a block, if any.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let block = Block::encode(self.definition, &self.pending, self.config.compression)?;
        block.write_to(&mut self.sink)?;
        self.bytes_written += block.serialized_size()?;
        self.blocks_written += 1;
        self.pending.clear();
        self.pending_size = 0;
        Ok(())
    }

    /// Number of blocks written so far.
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Flushes the pending block and the sink and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}
