//! Blocks: a header record followed by the encoded records of one partition.
//!
//! # Binary format
//!
//! ```text
//! block  := header payload
//! header := record frame of type 0xFF
//! ```
//!
//! The header record holds, in order: the first timestamp (nanoseconds), the last
//! timestamp as an offset from the first, the payload size in bytes, the
//! compression type code and one record count per record type of the series.
//! The payload is the concatenation of the record frames, possibly compressed.
//! Inside a payload, records are sorted by timestamp and the first record of each
//! record type is full; later records of that type are deltas.

pub mod compression;
mod writer;

pub use compression::{CompressionType, Compressor, Decompressor};
pub use writer::{BlockWriter, BlockWriterConfig, DEFAULT_BLOCK_SIZE_THRESHOLD};

use crate::codec::{SliceReader, MAX_VARINT_LEN};
use crate::error::{Result, StrataError};
use crate::field::{Field, ImmutableField, TimeUnit};
use crate::range::Range;
use crate::record::utils::{inflate_records, read_records, to_delta_encoded, write_records};
use crate::record::{BinaryTimeSeriesRecord, Record, TimeSeriesRecord};
use crate::schema::{TimeRange, TimeSeriesDefinition};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Record type byte reserved for block headers.
pub const BLOCK_HEADER_RECORD_TYPE: u8 = 0xFF;

/// Number of fixed header fields before the per-type record counts.
const HEADER_FIXED_FIELDS: usize = 4;

/// Summary of a block's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Timestamp of the first record, in nanoseconds.
    pub first_timestamp: i64,
    /// Timestamp of the last record, in nanoseconds.
    pub last_timestamp: i64,
    /// Size of the (possibly compressed) payload in bytes.
    pub compressed_size: usize,
    /// Codec of the payload.
    pub compression: CompressionType,
    /// Number of records per record type.
    pub record_counts: Vec<u32>,
}

impl BlockHeader {
    /// Total number of records in the block.
    pub fn record_count(&self) -> u64 {
        self.record_counts.iter().map(|c| *c as u64).sum()
    }

    /// Number of records of `record_type`.
    pub fn record_count_of(&self, record_type: usize) -> u32 {
        self.record_counts.get(record_type).copied().unwrap_or(0)
    }

    /// Returns true if `[first_timestamp, last_timestamp]` overlaps `range`.
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        range.overlaps(self.first_timestamp, self.last_timestamp)
    }

    /// The closed span `[first_timestamp, last_timestamp]` as timestamp fields in
    /// `unit`, rounded outward.
    pub fn timestamp_span(&self, unit: TimeUnit) -> Range<ImmutableField> {
        Range::closed(
            Field::timestamp_of(unit, unit.floor_nanos(self.first_timestamp)).into(),
            Field::timestamp_of(unit, unit.ceil_nanos(self.last_timestamp)).into(),
        )
    }

    /// Encodes the header as a record of the block header type.
    pub fn to_record(&self) -> Result<TimeSeriesRecord> {
        let mut fields = Vec::with_capacity(HEADER_FIXED_FIELDS + self.record_counts.len());
        fields.push(Field::NanosecondTimestamp(self.first_timestamp));
        fields.push(Field::NanosecondTimestamp(
            self.last_timestamp.wrapping_sub(self.first_timestamp),
        ));
        fields.push(Field::Integer(to_int(self.compressed_size, "compressed size")?));
        fields.push(Field::Byte(self.compression.code() as i8));
        for count in &self.record_counts {
            fields.push(Field::Integer(to_int(*count as usize, "record count")?));
        }
        Ok(TimeSeriesRecord::new(
            BLOCK_HEADER_RECORD_TYPE as usize,
            fields,
        ))
    }

    /// Decodes a header from a block header record.
    ///
    /// # Errors
    ///
    /// Fails with `StrataError::InvalidFormat` if the record is not a full header
    /// record, and with `StrataError::UnknownCompressionType` for unknown codecs.
    pub fn from_record(record: &dyn Record) -> Result<Self> {
        if record.record_type() != BLOCK_HEADER_RECORD_TYPE as usize {
            return Err(StrataError::UnknownRecordType(
                record.record_type().min(u8::MAX as usize) as u8,
            ));
        }
        if record.field_count() < HEADER_FIXED_FIELDS {
            return Err(StrataError::InvalidFormat(format!(
                "block header has {} fields",
                record.field_count()
            )));
        }
        if record.is_delta()? {
            return Err(StrataError::InvalidFormat(
                "block header record is a delta".into(),
            ));
        }

        let first_timestamp = record.field(0)?.timestamp_in_nanos()?;
        let span = record.field(1)?.timestamp_in_nanos()?;
        let compressed_size = from_int(record.field(2)?.int()?, "compressed size")?;
        let compression = CompressionType::try_from_u8(record.field(3)?.byte()? as u8)?;
        let mut record_counts = Vec::with_capacity(record.field_count() - HEADER_FIXED_FIELDS);
        for i in HEADER_FIXED_FIELDS..record.field_count() {
            record_counts.push(from_int(record.field(i)?.int()?, "record count")? as u32);
        }

        Ok(Self {
            first_timestamp,
            last_timestamp: first_timestamp.wrapping_add(span),
            compressed_size,
            compression,
            record_counts,
        })
    }
}

fn to_int(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StrataError::InvalidFormat(format!("{} {} does not fit in an int", what, value)))
}

fn from_int(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| StrataError::InvalidFormat(format!("negative {} {}", what, value)))
}

/// A header and its payload.
#[derive(Debug, Clone)]
pub struct Block {
    header: BlockHeader,
    data: Arc<[u8]>,
}

impl Block {
    /// Assembles a block from a header and a payload of matching size.
    pub fn new(header: BlockHeader, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        if header.compressed_size != data.len() {
            return Err(StrataError::InvalidFormat(format!(
                "block header declares {} payload bytes, got {}",
                header.compressed_size,
                data.len()
            )));
        }
        Ok(Self { header, data })
    }

    /// Encodes `records` into a block.
    ///
    /// Records must be sorted by timestamp; they may be full or delta-encoded as long
    /// as the first record of each type is full. The stored payload is re-encoded
    /// so that its first record of each type is full.
    pub fn encode<R: Record>(
        definition: &TimeSeriesDefinition,
        records: &[R],
        compression: CompressionType,
    ) -> Result<Self> {
        let encoded = to_delta_encoded(records)?;
        let inflated = inflate_records(&encoded)?;

        let mut record_counts = vec![0u32; definition.number_of_record_types()];
        let mut first_timestamp = None;
        let mut last_timestamp = i64::MIN;
        for record in &inflated {
            let count = record_counts
                .get_mut(record.record_type())
                .ok_or(StrataError::UnknownRecordType(
                    record.record_type().min(u8::MAX as usize) as u8,
                ))?;
            *count += 1;
            let timestamp = record.timestamp()?.timestamp_in_nanos()?;
            first_timestamp.get_or_insert(timestamp);
            last_timestamp = last_timestamp.max(timestamp);
        }
        let first_timestamp = first_timestamp
            .ok_or_else(|| StrataError::InvalidFormat("cannot encode an empty block".into()))?;

        let mut payload = Vec::new();
        write_records(&encoded, &mut payload)?;
        let data = compression.compressor().compress(&payload)?;

        let header = BlockHeader {
            first_timestamp,
            last_timestamp,
            compressed_size: data.len(),
            compression,
            record_counts,
        };
        Self::new(header, data)
    }

    /// The header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// The stored, possibly compressed, payload.
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    /// The codec of the stored payload.
    pub fn compression(&self) -> CompressionType {
        self.header.compression
    }

    /// Returns the uncompressed payload, using `decompressor` if the block is
    /// compressed.
    pub fn decompressed_data(&self, decompressor: &mut dyn Decompressor) -> Result<Arc<[u8]>> {
        match self.header.compression {
            CompressionType::None => Ok(Arc::clone(&self.data)),
            compression if compression == decompressor.compression_type() => {
                Ok(Arc::from(decompressor.decompress(&self.data)?))
            }
            compression => Err(StrataError::DecompressionError(format!(
                "block compressed with {:?} given a {:?} decompressor",
                compression,
                decompressor.compression_type()
            ))),
        }
    }

    /// Returns the uncompressed payload.
    pub fn payload(&self) -> Result<Arc<[u8]>> {
        self.decompressed_data(self.header.compression.decompressor().as_mut())
    }

    /// Returns a copy of this block with the payload stored by `compressor`.
    pub fn compress(&self, compressor: &mut dyn Compressor) -> Result<Block> {
        let target = compressor.compression_type();
        if target == self.header.compression {
            return Ok(self.clone());
        }
        let payload = self.payload()?;
        let data = compressor.compress(&payload)?;
        let header = BlockHeader {
            compressed_size: data.len(),
            compression: target,
            ..self.header.clone()
        };
        Self::new(header, data)
    }

    /// Returns a copy of this block with an uncompressed payload.
    pub fn decompress(&self, decompressor: &mut dyn Decompressor) -> Result<Block> {
        if self.header.compression == CompressionType::None {
            return Ok(self.clone());
        }
        let data = self.decompressed_data(decompressor)?;
        let header = BlockHeader {
            compressed_size: data.len(),
            compression: CompressionType::None,
            ..self.header.clone()
        };
        Self::new(header, data)
    }

    /// Decodes the records of the payload, in stored (delta-encoded) form.
    pub fn records(&self, definition: &TimeSeriesDefinition) -> Result<Vec<BinaryTimeSeriesRecord>> {
        read_records(definition, self.payload()?)
    }

    /// Splits the block along the partition boundaries of `definition`.
    ///
    /// Each partition touched by the block maps to a block holding exactly the
    /// records of that partition, with a freshly computed header. The first record
    /// of each type in every resulting block is full.
    pub fn split(&self, definition: &TimeSeriesDefinition) -> Result<BTreeMap<TimeRange, Block>> {
        let first = definition.partition_range(self.header.first_timestamp)?;
        let mut result = BTreeMap::new();
        if first.contains(self.header.last_timestamp) {
            result.insert(first, self.clone());
            return Ok(result);
        }

        let inflated = inflate_records(&self.records(definition)?)?;
        let mut current: Option<TimeRange> = None;
        let mut pending: Vec<TimeSeriesRecord> = Vec::new();
        for record in inflated {
            let timestamp = record.timestamp()?.timestamp_in_nanos()?;
            let partition = match current {
                Some(range) if range.contains(timestamp) => range,
                _ => definition.partition_range(timestamp)?,
            };
            if current != Some(partition) {
                if let Some(range) = current {
                    let block = Block::encode(definition, &pending, self.header.compression)?;
                    result.insert(range, block);
                    pending.clear();
                }
                current = Some(partition);
            }
            pending.push(record);
        }
        if let Some(range) = current {
            let block = Block::encode(definition, &pending, self.header.compression)?;
            result.insert(range, block);
        }

        debug!(
            first_timestamp = self.header.first_timestamp,
            last_timestamp = self.header.last_timestamp,
            partitions = result.len(),
            "Split block"
        );
        Ok(result)
    }

    /// Number of bytes [`Block::write_to`] emits.
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(self.header.to_record()?.framed_size()? + self.data.len())
    }

    /// Writes the header frame followed by the payload.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.to_record()?.write_framed(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Reads the next block from `reader`.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    pub fn read_from<R: Read + ?Sized>(
        definition: &TimeSeriesDefinition,
        reader: &mut R,
    ) -> Result<Option<Block>> {
        let mut type_byte = [0u8; 1];
        loop {
            match reader.read(&mut type_byte) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if type_byte[0] != BLOCK_HEADER_RECORD_TYPE {
            return Err(StrataError::InvalidFormat(format!(
                "expected a block header, found record type {}",
                type_byte[0]
            )));
        }

        let length = read_stream_varint(reader)?;
        let header_payload = read_payload(reader, length, "block header")?;
        let header_record = BinaryTimeSeriesRecord::from_payload(
            BLOCK_HEADER_RECORD_TYPE as usize,
            Arc::clone(definition.block_header_definition().field_types()),
            header_payload,
        )?;
        let header = BlockHeader::from_record(&header_record)?;
        if header.record_counts.len() != definition.number_of_record_types() {
            return Err(StrataError::InvalidFormat(format!(
                "block header has {} record counts, series has {} record types",
                header.record_counts.len(),
                definition.number_of_record_types()
            )));
        }

        let data = read_payload(reader, header.compressed_size, "block payload")?;
        Block::new(header, data).map(Some)
    }
}

/// Reads exactly `length` bytes without trusting `length` for the allocation.
fn read_payload<R: Read + ?Sized>(reader: &mut R, length: usize, what: &str) -> Result<Vec<u8>> {
    let limit = u64::try_from(length)
        .map_err(|_| StrataError::InvalidFormat(format!("{} length {} out of range", what, length)))?;
    let mut bytes = Vec::new();
    reader.take(limit).read_to_end(&mut bytes)?;
    if bytes.len() != length {
        return Err(StrataError::InvalidFormat(format!(
            "truncated {}: expected {} bytes, found {}",
            what,
            length,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Reads an unsigned varint length directly from a stream.
fn read_stream_varint<R: Read + ?Sized>(reader: &mut R) -> Result<usize> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        bytes.push(byte[0]);
        if byte[0] & 0x80 == 0 || bytes.len() == MAX_VARINT_LEN {
            break;
        }
    }
    SliceReader::new(&bytes).read_var_usize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldType, TimeUnit};
    use crate::record::RecordListBuilder;
    use crate::schema::{PartitionType, RecordTypeDefinition};

    const DAY: i64 = 86_400_000_000_000;

    fn definition() -> TimeSeriesDefinition {
        TimeSeriesDefinition::builder("test")
            .time_unit(TimeUnit::Nanoseconds)
            .partition_type(PartitionType::ByDay)
            .add_record_type(
                RecordTypeDefinition::builder("state")
                    .add_field("status", FieldType::Byte)
                    .build(),
            )
            .add_record_type(
                RecordTypeDefinition::builder("trade")
                    .add_field("price", FieldType::Decimal)
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn records(definition: &TimeSeriesDefinition, points: &[(&str, i64, i64)]) -> Vec<TimeSeriesRecord> {
        let mut builder = RecordListBuilder::new(definition);
        for (record_type, ts, value) in points {
            builder.new_record(record_type).unwrap().set_timestamp_in_nanos(*ts).unwrap();
            if *record_type == "state" {
                builder.set_byte("status", *value as i8).unwrap();
            } else {
                builder.set_decimal("price", *value, -1).unwrap();
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_header_record_roundtrip() {
        let header = BlockHeader {
            first_timestamp: 1_000,
            last_timestamp: 5_000,
            compressed_size: 42,
            compression: CompressionType::Lz4,
            record_counts: vec![3, 0],
        };
        let record = header.to_record().unwrap();
        assert_eq!(record.field(1).unwrap(), Field::NanosecondTimestamp(4_000));
        assert_eq!(BlockHeader::from_record(&record).unwrap(), header);
        assert_eq!(header.record_count(), 3);
    }

    #[test]
    fn test_header_rejects_unknown_compression() {
        let mut record = BlockHeader {
            first_timestamp: 0,
            last_timestamp: 0,
            compressed_size: 0,
            compression: CompressionType::None,
            record_counts: vec![],
        }
        .to_record()
        .unwrap();
        record.field_mut(3).unwrap().set_byte(7).unwrap();
        assert!(matches!(
            BlockHeader::from_record(&record),
            Err(StrataError::UnknownCompressionType(7))
        ));
    }

    #[test]
    fn test_encode_and_read_back() {
        let definition = definition();
        let records = records(
            &definition,
            &[("state", 100, 3), ("trade", 150, 100), ("state", 200, 1), ("trade", 250, 155)],
        );
        for compression in [CompressionType::None, CompressionType::Lz4] {
            let block = Block::encode(&definition, &records, compression).unwrap();
            assert_eq!(block.header().first_timestamp, 100);
            assert_eq!(block.header().last_timestamp, 250);
            assert_eq!(block.header().record_counts, vec![2, 2]);
            assert_eq!(block.header().compressed_size, block.data().len());

            let mut bytes = Vec::new();
            block.write_to(&mut bytes).unwrap();
            assert_eq!(bytes.len(), block.serialized_size().unwrap());

            let mut reader = &bytes[..];
            let read = Block::read_from(&definition, &mut reader).unwrap().unwrap();
            assert_eq!(read.header(), block.header());
            assert!(Block::read_from(&definition, &mut reader).unwrap().is_none());

            let decoded: Vec<TimeSeriesRecord> = read
                .records(&definition)
                .unwrap()
                .iter()
                .map(|r| r.to_record().unwrap())
                .collect();
            assert_eq!(decoded, records);
        }
    }

    #[test]
    fn test_compress_and_decompress_blocks() {
        let definition = definition();
        let records = records(&definition, &[("state", 1, 1), ("state", 2, 2), ("state", 3, 3)]);
        let plain = Block::encode(&definition, &records, CompressionType::None).unwrap();
        let compressed = plain
            .compress(CompressionType::Lz4.compressor().as_mut())
            .unwrap();
        assert_eq!(compressed.compression(), CompressionType::Lz4);
        assert_eq!(compressed.header().record_counts, plain.header().record_counts);
        let restored = compressed
            .decompress(CompressionType::Lz4.decompressor().as_mut())
            .unwrap();
        assert_eq!(restored.header(), plain.header());
        assert_eq!(restored.data(), plain.data());
    }

    #[test]
    fn test_wrong_decompressor_is_rejected() {
        let definition = definition();
        let records = records(&definition, &[("state", 1, 1)]);
        let block = Block::encode(&definition, &records, CompressionType::Lz4).unwrap();
        let mut none = compression::NoCompression;
        assert!(block.decompressed_data(&mut none).is_err());
    }

    #[test]
    fn test_split_rebases_first_records() {
        let definition = definition();
        let records = records(
            &definition,
            &[
                ("state", DAY - 20, 1),
                ("trade", DAY - 10, 100),
                ("state", DAY + 5, 2),
                ("trade", 2 * DAY + 1, 110),
                ("state", 2 * DAY + 7, 3),
            ],
        );
        let block = Block::encode(&definition, &records, CompressionType::None).unwrap();
        let parts = block.split(&definition).unwrap();
        assert_eq!(parts.len(), 3);

        let mut total = 0;
        for (range, part) in &parts {
            let header = part.header();
            assert!(range.contains(header.first_timestamp));
            assert!(range.contains(header.last_timestamp));
            let stored = part.records(&definition).unwrap();
            assert!(!stored.is_empty());
            let mut seen = [false; 2];
            for record in &stored {
                if !seen[record.record_type()] {
                    assert!(!record.is_delta().unwrap());
                    seen[record.record_type()] = true;
                }
            }
            total += header.record_count();
        }
        assert_eq!(total, 5);

        let day_two = parts.get(&TimeRange::new(DAY, 2 * DAY)).unwrap();
        let stored = day_two.records(&definition).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].field(1).unwrap(), Field::Byte(2));
    }

    #[test]
    fn test_split_single_partition_is_identity() {
        let definition = definition();
        let records = records(&definition, &[("state", 10, 1), ("state", 20, 2)]);
        let block = Block::encode(&definition, &records, CompressionType::None).unwrap();
        let parts = block.split(&definition).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts.get(&TimeRange::new(0, DAY)).unwrap().data(), block.data());
    }

    #[test]
    fn test_read_rejects_non_header_frame() {
        let definition = definition();
        let mut reader: &[u8] = &[0, 1, 0];
        assert!(matches!(
            Block::read_from(&definition, &mut reader),
            Err(StrataError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_truncated_payload() {
        let definition = definition();
        let records = records(&definition, &[("state", 10, 1), ("state", 20, 2)]);
        let block = Block::encode(&definition, &records, CompressionType::None).unwrap();
        let mut bytes = Vec::new();
        block.write_to(&mut bytes).unwrap();
        bytes.pop();
        let mut reader = &bytes[..];
        assert!(matches!(
            Block::read_from(&definition, &mut reader),
            Err(StrataError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_rejects_oversized_header_length() {
        let definition = definition();
        // Header frame claiming a 2^56 byte payload.
        let mut reader: &[u8] = &[0xFF, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            Block::read_from(&definition, &mut reader),
            Err(StrataError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_rejects_oversized_payload_length() {
        let definition = definition();
        let header = BlockHeader {
            first_timestamp: 0,
            last_timestamp: 10,
            compressed_size: i32::MAX as usize,
            compression: CompressionType::None,
            record_counts: vec![1, 0],
        };
        let mut bytes = Vec::new();
        header.to_record().unwrap().write_framed(&mut bytes).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = &bytes[..];
        match Block::read_from(&definition, &mut reader) {
            Err(StrataError::InvalidFormat(message)) => assert!(message.contains("truncated")),
            other => panic!("unexpected {:?}", other.map(|b| b.is_some())),
        }
    }

    #[test]
    fn test_timestamp_span_rounds_outward() {
        let header = BlockHeader {
            first_timestamp: 1_500_000,
            last_timestamp: 2_000_001,
            compressed_size: 0,
            compression: CompressionType::None,
            record_counts: vec![],
        };
        let span = header.timestamp_span(TimeUnit::Milliseconds);
        assert!(span.contains(&Field::MillisecondTimestamp(1).into()));
        assert!(span.contains(&Field::MillisecondTimestamp(3).into()));
        assert!(!span.contains(&Field::MillisecondTimestamp(4).into()));
    }
}
