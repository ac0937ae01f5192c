//! Strata - Alopex Time Series Record and Block Model
//!
//! This crate provides the record model, block format and read pipeline used by the
//! Alopex time series storage engine.
//!
//! # Components
//!
//! - [`TimeSeriesDefinition`]: Named record types with typed fields and partitioning
//! - [`TimeSeriesRecord`] / [`BinaryTimeSeriesRecord`]: Full and delta-encoded records,
//!   owned or decoded lazily from a buffer
//! - [`Block`]: A compressed, time-bounded run of framed records
//! - [`iter`]: Closeable iterators that decode, filter, project and merge
//! - [`Predicate`]: Query predicates compiled to timestamp ranges and row filters
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_strata::{RecordListBuilder, RecordTypeDefinition, TimeSeriesDefinition};
//! use alopex_strata::{Block, CompressionType};
//!
//! let definition = TimeSeriesDefinition::builder("quotes")
//!     .add_record_type(
//!         RecordTypeDefinition::builder("trade")
//!             .add_decimal_field("price")
//!             .add_long_field("volume")
//!             .build(),
//!     )
//!     .build()?;
//!
//! let mut builder = RecordListBuilder::new(&definition);
//! builder
//!     .new_record("trade")?
//!     .set_timestamp_in_millis(1_700_000_000_000)?
//!     .set_decimal("price", 1055, -1)?
//!     .set_long("volume", 300)?;
//! let records = builder.build()?;
//!
//! let block = Block::encode(&definition, &records, CompressionType::Lz4)?;
//! let mut file = Vec::new();
//! block.write_to(&mut file)?;
//! ```

#![deny(missing_docs)]

pub mod block;
pub mod codec;
pub mod error;
pub mod field;
pub mod iter;
pub mod predicate;
pub mod range;
pub mod record;
pub mod schema;

pub use block::{
    Block, BlockHeader, BlockWriter, BlockWriterConfig, CompressionType, BLOCK_HEADER_RECORD_TYPE,
};
pub use error::{Result, StrataError};
pub use field::{Decimal, Field, FieldType, ImmutableField, TimeUnit};
pub use iter::{BlockIterator, CloseableIterator, RecordIterator};
pub use predicate::{Operator, Predicate, RecordFilter};
pub use range::{Range, RangeSet};
pub use record::{BinaryTimeSeriesRecord, BoxedRecord, Record, RecordListBuilder, TimeSeriesRecord};
pub use schema::{
    PartitionType, RecordTypeDefinition, TimeRange, TimeSeriesDefinition, TIMESTAMP_FIELD_NAME,
};
