//! Property-based tests for the record model.
//!
//! Uses proptest to verify field and record encoding, delta arithmetic, predicate
//! range pruning and filtering over arbitrary data.

use alopex_strata::codec::SliceReader;
use alopex_strata::iter::{FilteringRecordIterator, IteratorAdapter};
use alopex_strata::record::utils::{inflate_records, to_delta_encoded};
use alopex_strata::{
    BinaryTimeSeriesRecord, BoxedRecord, CloseableIterator, Decimal, Field, FieldType, ImmutableField,
    Operator, Predicate, Record, RecordTypeDefinition, TimeSeriesDefinition, TimeSeriesRecord,
};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Strategies
// ============================================================================

fn definition() -> TimeSeriesDefinition {
    TimeSeriesDefinition::builder("props")
        .add_record_type(
            RecordTypeDefinition::builder("row")
                .add_field("status", FieldType::Byte)
                .add_field("count", FieldType::Integer)
                .add_field("volume", FieldType::Long)
                .add_field("price", FieldType::Decimal)
                .build(),
        )
        .build()
        .unwrap()
}

fn field_strategy() -> impl Strategy<Value = Field> {
    prop_oneof![
        any::<i64>().prop_map(Field::NanosecondTimestamp),
        any::<i64>().prop_map(Field::MicrosecondTimestamp),
        any::<i64>().prop_map(Field::MillisecondTimestamp),
        any::<i64>().prop_map(Field::SecondTimestamp),
        any::<i8>().prop_map(Field::Byte),
        any::<i32>().prop_map(Field::Integer),
        any::<i64>().prop_map(Field::Long),
        (any::<i64>(), any::<i8>()).prop_map(|(m, e)| Field::Decimal(Decimal::new(m, e))),
    ]
}

/// Values that are zero about a third of the time, so presence bits vary.
fn sparse<T: Arbitrary + Default + Clone + 'static>() -> impl Strategy<Value = T> {
    prop_oneof![1 => Just(T::default()), 2 => any::<T>()]
}

fn row_strategy() -> impl Strategy<Value = TimeSeriesRecord> {
    (
        sparse::<i64>(),
        sparse::<i8>(),
        sparse::<i32>(),
        sparse::<i64>(),
        (sparse::<i64>(), -20i8..20),
        any::<bool>(),
    )
        .prop_map(|(ts, status, count, volume, (mantissa, exponent), delta)| {
            let mut record = row(ts, status, count, volume, Decimal::new(mantissa, exponent));
            record.set_delta(delta);
            record
        })
}

/// Full rows over the whole value domain, decimals included.
fn full_row_strategy() -> impl Strategy<Value = TimeSeriesRecord> {
    (
        any::<i64>(),
        any::<i8>(),
        any::<i32>(),
        any::<i64>(),
        any::<i64>(),
        any::<i8>(),
    )
        .prop_map(|(ts, status, count, volume, mantissa, exponent)| {
            row(ts, status, count, volume, Decimal::new(mantissa, exponent))
        })
}

/// A timestamp-ordered series of full rows.
fn series_strategy() -> impl Strategy<Value = Vec<TimeSeriesRecord>> {
    prop::collection::vec((1i64..1_000, 0i8..4, -50i64..50), 1..60).prop_map(|steps| {
        let mut ts = 0;
        steps
            .into_iter()
            .map(|(step, status, volume)| {
                ts += step;
                row(ts, status, 0, volume, Decimal::new(volume * 3, -1))
            })
            .collect()
    })
}

fn operator_strategy() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Eq),
        Just(Operator::Ne),
        Just(Operator::Lt),
        Just(Operator::Le),
        Just(Operator::Gt),
        Just(Operator::Ge),
    ]
}

fn leaf_strategy() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        (operator_strategy(), 0i64..60_000)
            .prop_map(|(op, ts)| Predicate::comparison("timestamp", op, ts.to_string())),
        (0i64..60_000, 0i64..60_000).prop_map(|(a, b)| {
            Predicate::between("timestamp", a.min(b).to_string(), a.max(b).to_string())
        }),
        (operator_strategy(), 0i8..4)
            .prop_map(|(op, status)| Predicate::comparison("status", op, status.to_string())),
        prop::collection::vec(0i8..4, 1..3).prop_map(|values| {
            Predicate::not_in("status", values.iter().map(|v| v.to_string()))
        }),
    ]
}

fn predicate_strategy() -> impl Strategy<Value = Predicate> {
    leaf_strategy().prop_recursive(3, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
            (inner.clone(), inner).prop_map(|(l, r)| l.or(r)),
        ]
    })
}

fn row(ts: i64, status: i8, count: i32, volume: i64, price: Decimal) -> TimeSeriesRecord {
    TimeSeriesRecord::new(
        0,
        vec![
            Field::NanosecondTimestamp(ts),
            Field::Byte(status),
            Field::Integer(count),
            Field::Long(volume),
            Field::Decimal(price),
        ],
    )
}

fn filter_stream(
    records: Vec<TimeSeriesRecord>,
    predicate: &Predicate,
    definition: &TimeSeriesDefinition,
) -> Vec<TimeSeriesRecord> {
    let source: Vec<BoxedRecord> = records
        .into_iter()
        .map(|r| Box::new(r) as BoxedRecord)
        .collect();
    FilteringRecordIterator::new(
        Box::new(IteratorAdapter::new(source)),
        predicate.to_filter(definition).unwrap(),
    )
    .collect_all()
    .unwrap()
    .iter()
    .map(|r| r.to_record().unwrap())
    .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_field_roundtrip_proptest(field in field_strategy()) {
        let mut buf = Vec::new();
        field.write_to(&mut buf).unwrap();
        prop_assert_eq!(buf.len(), field.serialized_size());

        let mut reader = SliceReader::new(&buf);
        let decoded = field.field_type().read_field(&mut reader).unwrap();
        prop_assert_eq!(decoded, field);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn test_record_roundtrip_proptest(record in row_strategy()) {
        let definition = definition();
        let mut buf = Vec::new();
        record.write_framed(&mut buf).unwrap();
        prop_assert_eq!(buf.len(), record.framed_size().unwrap());

        let buffer: Arc<[u8]> = Arc::from(buf);
        let (decoded, next) = BinaryTimeSeriesRecord::read_framed(&definition, &buffer, 0).unwrap();
        prop_assert_eq!(next, buffer.len());
        prop_assert_eq!(decoded.is_delta().unwrap(), record.is_delta().unwrap());
        prop_assert_eq!(decoded.bit_set().unwrap(), record.bit_set().unwrap());
        prop_assert_eq!(decoded.to_record().unwrap(), record);
    }

    #[test]
    fn test_delta_consistency_proptest(a in full_row_strategy(), a2 in full_row_strategy()) {
        let encoded = a2.deflate(&a).unwrap();
        let mut resolved = a.clone();
        resolved.inflate(&encoded).unwrap();
        prop_assert_eq!(resolved, a2);
    }

    #[test]
    fn test_small_decimal_deltas_stay_deltas(
        a in full_row_strategy(),
        mantissa in -999_999_999i64..999_999_999,
        exponent in -4i8..=4,
    ) {
        let mut a = a;
        a.field_mut(4).unwrap().set_decimal(mantissa, exponent).unwrap();
        let mut a2 = a.clone();
        a2.field_mut(4).unwrap().set_decimal(mantissa / 3, exponent).unwrap();

        let delta = a2.deflate(&a).unwrap();
        prop_assert!(delta.is_delta().unwrap());
        let mut resolved = a.clone();
        resolved.add(&delta).unwrap();
        prop_assert_eq!(resolved, a2);
    }

    #[test]
    fn test_delta_encoding_inflates_back_proptest(series in series_strategy()) {
        let encoded = to_delta_encoded(&series).unwrap();
        prop_assert!(!encoded[0].is_delta().unwrap());
        prop_assert_eq!(inflate_records(&encoded).unwrap(), series);
    }

    #[test]
    fn test_accepted_rows_lie_in_timestamp_ranges(
        predicate in predicate_strategy(),
        series in series_strategy(),
    ) {
        let definition = definition();
        let ranges = predicate.timestamp_ranges_for(&definition).unwrap();
        let mut filter = predicate.to_filter(&definition).unwrap();
        for record in &series {
            if filter.accept(record).unwrap() {
                let ts = ImmutableField::from(record.timestamp().unwrap());
                prop_assert!(ranges.contains(&ts), "{} accepted {} outside {:?}", predicate, *ts, ranges);
            }
        }
    }

    #[test]
    fn test_filtering_is_idempotent(
        predicate in predicate_strategy(),
        series in series_strategy(),
    ) {
        let definition = definition();
        let encoded = to_delta_encoded(&series).unwrap();
        let once = filter_stream(encoded, &predicate, &definition);
        let twice = filter_stream(once.clone(), &predicate, &definition);
        prop_assert_eq!(&once, &twice);

        // The filtered stream resolves to exactly the accepted rows.
        let mut filter = predicate.to_filter(&definition).unwrap();
        let mut expected = Vec::new();
        for record in &series {
            if filter.is_done() {
                break;
            }
            if filter.accept(record).unwrap() {
                expected.push(record.clone());
            }
        }
        prop_assert_eq!(inflate_records(&once).unwrap(), expected);
    }
}
