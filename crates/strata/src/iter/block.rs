//! Block-level iterators: reading blocks from a stream, pruning them by time,
//! recompressing them and exploding them into records.

use crate::block::{Block, CompressionType, Compressor, Decompressor};
use crate::error::Result;
use crate::field::{ImmutableField, TimeUnit};
use crate::iter::{BlockIterator, CloseableIterator, ComputeNext, NextSlot};
use crate::range::RangeSet;
use crate::record::{BinaryTimeSeriesRecord, BoxedRecord};
use crate::schema::TimeSeriesDefinition;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Keeps one decompressor and replaces it only when the codec changes.
#[derive(Default)]
struct DecompressorCache {
    current: Option<Box<dyn Decompressor>>,
}

impl DecompressorCache {
    fn get(&mut self, compression: CompressionType) -> &mut dyn Decompressor {
        let stale = self
            .current
            .as_ref()
            .map_or(true, |d| d.compression_type() != compression);
        if stale {
            debug!(compression = ?compression, "Creating decompressor");
        }
        let decompressor = match self.current.take() {
            Some(d) if !stale => d,
            _ => compression.decompressor(),
        };
        self.current.insert(decompressor).as_mut()
    }
}

struct BlockReader<R> {
    definition: Arc<TimeSeriesDefinition>,
    reader: Option<R>,
}

impl<R: Read> ComputeNext for BlockReader<R> {
    type Item = Block;

    fn compute_next(&mut self) -> Result<Option<Block>> {
        match self.reader.as_mut() {
            Some(reader) => Block::read_from(&self.definition, reader),
            None => Ok(None),
        }
    }

    fn close_source(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Reads consecutive blocks from a byte stream.
///
/// Closing the iterator drops the stream.
pub struct BinaryBlockIterator<R: Read> {
    slot: NextSlot<Block>,
    stage: BlockReader<R>,
}

impl<R: Read> BinaryBlockIterator<R> {
    /// Reads blocks of `definition` from `reader`.
    pub fn new(definition: Arc<TimeSeriesDefinition>, reader: R) -> Self {
        Self {
            slot: NextSlot::default(),
            stage: BlockReader {
                definition,
                reader: Some(reader),
            },
        }
    }
}

impl<R: Read> CloseableIterator for BinaryBlockIterator<R> {
    type Item = Block;

    fn has_next(&mut self) -> Result<bool> {
        self.slot.has_next(&mut self.stage)
    }

    fn next(&mut self) -> Result<Block> {
        self.slot.next(&mut self.stage)
    }

    fn close(&mut self) -> Result<()> {
        self.slot.close(&mut self.stage)
    }
}

struct BlockPruner {
    source: BlockIterator,
    ranges: RangeSet<ImmutableField>,
    unit: TimeUnit,
}

impl ComputeNext for BlockPruner {
    type Item = Block;

    fn compute_next(&mut self) -> Result<Option<Block>> {
        while self.source.has_next()? {
            let block = self.source.next()?;
            let span = block.header().timestamp_span(self.unit);
            if self.ranges.intersects(&span) {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    fn close_source(&mut self) -> Result<()> {
        self.source.close()
    }
}

/// Drops blocks whose `[first, last]` timestamp span misses a set of timestamp
/// ranges.
///
/// The span is compared in the time unit of the series, so ranges produced by
/// [`Predicate::timestamp_ranges_for`](crate::Predicate::timestamp_ranges_for)
/// prune exactly the blocks the row filter would reject.
pub struct BlockFilteringIterator {
    slot: NextSlot<Block>,
    stage: BlockPruner,
}

impl BlockFilteringIterator {
    /// Keeps the blocks of `source` that may hold a timestamp in `ranges`.
    pub fn new(
        definition: &TimeSeriesDefinition,
        source: BlockIterator,
        ranges: RangeSet<ImmutableField>,
    ) -> Self {
        Self {
            slot: NextSlot::default(),
            stage: BlockPruner {
                source,
                ranges,
                unit: definition.time_unit(),
            },
        }
    }
}

impl CloseableIterator for BlockFilteringIterator {
    type Item = Block;

    fn has_next(&mut self) -> Result<bool> {
        self.slot.has_next(&mut self.stage)
    }

    fn next(&mut self) -> Result<Block> {
        self.slot.next(&mut self.stage)
    }

    fn close(&mut self) -> Result<()> {
        self.slot.close(&mut self.stage)
    }
}

/// Rewrites every block with a given codec.
pub struct CompressingBlockIterator {
    source: BlockIterator,
    compressor: Box<dyn Compressor>,
}

impl CompressingBlockIterator {
    /// Compresses the blocks of `source` with `compression`.
    pub fn new(source: BlockIterator, compression: CompressionType) -> Self {
        Self {
            source,
            compressor: compression.compressor(),
        }
    }
}

impl CloseableIterator for CompressingBlockIterator {
    type Item = Block;

    fn has_next(&mut self) -> Result<bool> {
        self.source.has_next()
    }

    fn next(&mut self) -> Result<Block> {
        let block = self.source.next()?;
        block.compress(self.compressor.as_mut())
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

/// Rewrites every block with an uncompressed payload.
pub struct DecompressingBlockIterator {
    source: BlockIterator,
    decompressors: DecompressorCache,
}

impl DecompressingBlockIterator {
    /// Decompresses the blocks of `source`.
    pub fn new(source: BlockIterator) -> Self {
        Self {
            source,
            decompressors: DecompressorCache::default(),
        }
    }
}

impl CloseableIterator for DecompressingBlockIterator {
    type Item = Block;

    fn has_next(&mut self) -> Result<bool> {
        self.source.has_next()
    }

    fn next(&mut self) -> Result<Block> {
        let block = self.source.next()?;
        if block.compression() == CompressionType::None {
            return Ok(block);
        }
        block.decompress(self.decompressors.get(block.compression()))
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

struct RecordExploder {
    definition: Arc<TimeSeriesDefinition>,
    source: BlockIterator,
    decompressors: DecompressorCache,
    payload: Arc<[u8]>,
    position: usize,
}

impl ComputeNext for RecordExploder {
    type Item = BoxedRecord;

    fn compute_next(&mut self) -> Result<Option<BoxedRecord>> {
        loop {
            if self.position < self.payload.len() {
                let (record, next) = BinaryTimeSeriesRecord::read_framed(
                    &self.definition,
                    &self.payload,
                    self.position,
                )?;
                self.position = next;
                return Ok(Some(Box::new(record)));
            }
            if !self.source.has_next()? {
                return Ok(None);
            }
            let block = self.source.next()?;
            self.payload = block.decompressed_data(self.decompressors.get(block.compression()))?;
            self.position = 0;
        }
    }

    fn close_source(&mut self) -> Result<()> {
        self.source.close()
    }
}

/// Explodes blocks into their records, decoded lazily from the block payload.
///
/// Records come out in stored form: the first record of each type in a block is
/// full and later ones are deltas, except where a delta could not be exact.
pub struct BlockRecordIterator {
    slot: NextSlot<BoxedRecord>,
    stage: RecordExploder,
}

impl BlockRecordIterator {
    /// Reads the records of the blocks of `source`.
    pub fn new(definition: Arc<TimeSeriesDefinition>, source: BlockIterator) -> Self {
        Self {
            slot: NextSlot::default(),
            stage: RecordExploder {
                definition,
                source,
                decompressors: DecompressorCache::default(),
                payload: Arc::from(Vec::new()),
                position: 0,
            },
        }
    }
}

impl CloseableIterator for BlockRecordIterator {
    type Item = BoxedRecord;

    fn has_next(&mut self) -> Result<bool> {
        self.slot.has_next(&mut self.stage)
    }

    fn next(&mut self) -> Result<BoxedRecord> {
        self.slot.next(&mut self.stage)
    }

    fn close(&mut self) -> Result<()> {
        self.slot.close(&mut self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;
    use crate::field::{Field, FieldType};
    use crate::range::Range;
    use crate::iter::IteratorAdapter;
    use crate::record::{Record, TimeSeriesRecord};
    use crate::schema::RecordTypeDefinition;

    fn definition() -> Arc<TimeSeriesDefinition> {
        Arc::new(
            TimeSeriesDefinition::builder("test")
                .add_record_type(
                    RecordTypeDefinition::builder("value")
                        .add_field("v", FieldType::Long)
                        .build(),
                )
                .build()
                .unwrap(),
        )
    }

    fn block(definition: &TimeSeriesDefinition, timestamps: &[i64], compression: CompressionType) -> Block {
        let records: Vec<TimeSeriesRecord> = timestamps
            .iter()
            .map(|ts| TimeSeriesRecord::new(0, vec![Field::NanosecondTimestamp(*ts), Field::Long(*ts * 2)]))
            .collect();
        Block::encode(definition, &records, compression).unwrap()
    }

    fn blocks(items: Vec<Block>) -> BlockIterator {
        Box::new(IteratorAdapter::new(items))
    }

    #[test]
    fn test_binary_block_iterator_reads_stream() {
        let definition = definition();
        let mut bytes = Vec::new();
        block(&definition, &[1, 2], CompressionType::None).write_to(&mut bytes).unwrap();
        block(&definition, &[3], CompressionType::Lz4).write_to(&mut bytes).unwrap();

        let iter = BinaryBlockIterator::new(Arc::clone(&definition), &bytes[..]);
        let read = iter.collect_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].header().first_timestamp, 3);
        assert_eq!(read[1].compression(), CompressionType::Lz4);
    }

    #[test]
    fn test_closed_block_iterator_is_exhausted() {
        let definition = definition();
        let mut bytes = Vec::new();
        block(&definition, &[1], CompressionType::None).write_to(&mut bytes).unwrap();
        let mut iter = BinaryBlockIterator::new(definition, &bytes[..]);
        iter.close().unwrap();
        assert!(!iter.has_next().unwrap());
        assert!(matches!(iter.next(), Err(StrataError::NoSuchElement)));
    }

    #[test]
    fn test_record_iterator_spans_blocks() {
        let definition = definition();
        let source = blocks(vec![
            block(&definition, &[1, 2], CompressionType::Lz4),
            block(&definition, &[3, 4], CompressionType::None),
            block(&definition, &[5], CompressionType::Lz4),
        ]);
        let records = BlockRecordIterator::new(Arc::clone(&definition), source)
            .collect_all()
            .unwrap();
        let deltas: Vec<bool> = records.iter().map(|r| r.is_delta().unwrap()).collect();
        assert_eq!(deltas, vec![false, true, false, true, false]);
        assert_eq!(records[1].field(0).unwrap(), Field::NanosecondTimestamp(1));
        assert_eq!(records[2].field(1).unwrap(), Field::Long(6));
    }

    #[test]
    fn test_block_filtering_by_time() {
        let definition = definition();
        let source = blocks(vec![
            block(&definition, &[1, 5], CompressionType::None),
            block(&definition, &[10, 15], CompressionType::None),
            block(&definition, &[20, 25], CompressionType::None),
        ]);
        let ranges = RangeSet::from_range(Range::closed_open(
            Field::NanosecondTimestamp(6).into(),
            Field::NanosecondTimestamp(20).into(),
        ));
        let kept = BlockFilteringIterator::new(&definition, source, ranges)
            .collect_all()
            .unwrap();
        let firsts: Vec<i64> = kept.iter().map(|b| b.header().first_timestamp).collect();
        assert_eq!(firsts, vec![10]);
    }

    #[test]
    fn test_block_filtering_in_millisecond_series() {
        let definition = Arc::new(
            TimeSeriesDefinition::builder("millis")
                .time_unit(TimeUnit::Milliseconds)
                .add_record_type(
                    RecordTypeDefinition::builder("value")
                        .add_field("v", FieldType::Long)
                        .build(),
                )
                .build()
                .unwrap(),
        );
        let block_of = |millis: &[i64]| {
            let records: Vec<TimeSeriesRecord> = millis
                .iter()
                .map(|ms| TimeSeriesRecord::new(0, vec![Field::MillisecondTimestamp(*ms), Field::Long(*ms)]))
                .collect();
            Block::encode(&definition, &records, CompressionType::None).unwrap()
        };
        let source = blocks(vec![block_of(&[1, 2]), block_of(&[3, 4]), block_of(&[5])]);
        // Bounds sitting exactly on the last record of the first block and the
        // first record of the last block.
        let ranges = RangeSet::from_range(Range::closed(
            Field::MillisecondTimestamp(2).into(),
            Field::MillisecondTimestamp(5).into(),
        ));
        let kept = BlockFilteringIterator::new(&definition, source, ranges)
            .collect_all()
            .unwrap();
        let firsts: Vec<i64> = kept.iter().map(|b| b.header().first_timestamp).collect();
        assert_eq!(firsts, vec![1_000_000, 3_000_000, 5_000_000]);
    }

    #[test]
    fn test_compress_then_decompress_stages() {
        let definition = definition();
        let original = vec![
            block(&definition, &[1, 2, 3], CompressionType::None),
            block(&definition, &[4, 5], CompressionType::Lz4),
        ];
        let compressed: BlockIterator = Box::new(CompressingBlockIterator::new(
            blocks(original.clone()),
            CompressionType::Lz4,
        ));
        let restored = DecompressingBlockIterator::new(compressed)
            .collect_all()
            .unwrap();
        assert_eq!(restored.len(), 2);
        for (restored, original) in restored.iter().zip(&original) {
            assert_eq!(restored.compression(), CompressionType::None);
            assert_eq!(restored.payload().unwrap(), original.payload().unwrap());
            assert_eq!(restored.header().record_counts, original.header().record_counts);
        }
    }
}
