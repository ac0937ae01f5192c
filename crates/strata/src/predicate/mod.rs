//! Query predicates over record fields.
//!
//! A [`Predicate`] is evaluated two ways against a series definition:
//!
//! - [`Predicate::timestamp_ranges`] computes the timestamps a matching record can
//!   have, used to prune blocks and partitions. Predicates on other fields do not
//!   restrict it.
//! - [`Predicate::to_filter`] compiles a [`RecordFilter`] applied to every record.
//!
//! Every timestamp accepted by the filter lies in the timestamp ranges.
//!
//! Literals are kept as strings and parsed per field type when the predicate is
//! evaluated, so the same predicate can apply to record types that declare the
//! same field name with different types.

pub mod filter;

pub use filter::{AcceptAllFilter, AndFilter, FieldRangeFilter, OrFilter, RecordFilter};

use crate::error::{Result, StrataError};
use crate::field::{Field, FieldType, ImmutableField};
use crate::range::{Range, RangeSet};
use crate::schema::{TimeSeriesDefinition, TIMESTAMP_FIELD_NAME};
use chrono::FixedOffset;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Predicate::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Operator {
    /// The operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// The values of `field_type` that compare true against `value`.
    pub fn ranges(self, value: ImmutableField, field_type: FieldType) -> RangeSet<ImmutableField> {
        let all = field_type.all_values();
        match self {
            Self::Eq => all.sub_range_set(&Range::singleton(value)),
            Self::Ne => all.difference(&RangeSet::from_range(Range::singleton(value))),
            Self::Lt => all.sub_range_set(&Range::less_than(value)),
            Self::Le => all.sub_range_set(&Range::at_most(value)),
            Self::Gt => all.sub_range_set(&Range::greater_than(value)),
            Self::Ge => all.sub_range_set(&Range::at_least(value)),
        }
    }
}

impl FromStr for Operator {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            _ => Err(StrataError::InvalidFormat(format!("unknown operator {:?}", s))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches everything.
    Noop,
    /// `field <operator> value`.
    Comparison {
        /// Field name.
        field: String,
        /// Operator.
        operator: Operator,
        /// Literal, parsed per field type.
        value: String,
    },
    /// `field [NOT] BETWEEN min AND max`, bounds included.
    Between {
        /// Field name.
        field: String,
        /// Lower bound literal.
        min: String,
        /// Upper bound literal.
        max: String,
        /// True for `NOT BETWEEN`.
        negated: bool,
    },
    /// `field [NOT] IN (values)`.
    In {
        /// Field name.
        field: String,
        /// Value literals.
        values: Vec<String>,
        /// True for `NOT IN`.
        negated: bool,
    },
    /// Both predicates hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either predicate holds.
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// `field <operator> value`.
    pub fn comparison(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field BETWEEN min AND max`.
    pub fn between(field: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self::Between {
            field: field.into(),
            min: min.into(),
            max: max.into(),
            negated: false,
        }
    }

    /// `field NOT BETWEEN min AND max`.
    pub fn not_between(
        field: impl Into<String>,
        min: impl Into<String>,
        max: impl Into<String>,
    ) -> Self {
        Self::Between {
            field: field.into(),
            min: min.into(),
            max: max.into(),
            negated: true,
        }
    }

    /// `field IN (values)`.
    pub fn in_values<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `field NOT IN (values)`.
    pub fn not_in<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// `self AND other`.
    pub fn and(self, other: Predicate) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`.
    pub fn or(self, other: Predicate) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// The field a leaf predicate tests.
    fn leaf_field(&self) -> Option<&str> {
        match self {
            Self::Comparison { field, .. } | Self::Between { field, .. } | Self::In { field, .. } => {
                Some(field.as_str())
            }
            _ => None,
        }
    }

    /// The values of `field_type` a leaf predicate accepts.
    fn leaf_ranges(
        &self,
        field_type: FieldType,
        time_zone: &FixedOffset,
    ) -> Result<RangeSet<ImmutableField>> {
        let parse = |literal: &str| -> Result<ImmutableField> {
            Ok(field_type.parse_value(time_zone, literal)?.into())
        };
        let all = field_type.all_values();
        match self {
            Self::Comparison {
                operator, value, ..
            } => Ok(operator.ranges(parse(value.as_str())?, field_type)),
            Self::Between {
                min, max, negated, ..
            } => {
                let between = all.sub_range_set(&Range::closed(parse(min.as_str())?, parse(max.as_str())?));
                Ok(if *negated { all.difference(&between) } else { between })
            }
            Self::In {
                values, negated, ..
            } => {
                let mut points = RangeSet::new();
                for value in values {
                    points.add(Range::singleton(parse(value.as_str())?));
                }
                let points = all.intersection(&points);
                Ok(if *negated { all.difference(&points) } else { points })
            }
            _ => Ok(all),
        }
    }

    /// The timestamps a matching record can have, as values of the prototype's
    /// timestamp type.
    ///
    /// Literals of timestamp predicates are parsed in `time_zone`.
    pub fn timestamp_ranges(
        &self,
        prototype: &Field,
        time_zone: &FixedOffset,
    ) -> Result<RangeSet<ImmutableField>> {
        let field_type = prototype.field_type();
        match self {
            Self::Noop => Ok(field_type.all_values()),
            Self::And(left, right) => {
                let left = left.timestamp_ranges(prototype, time_zone)?;
                let right = right.timestamp_ranges(prototype, time_zone)?;
                Ok(left.intersection(&right))
            }
            Self::Or(left, right) => {
                let left = left.timestamp_ranges(prototype, time_zone)?;
                let right = right.timestamp_ranges(prototype, time_zone)?;
                Ok(left.union(&right))
            }
            leaf => {
                if leaf.leaf_field() == Some(TIMESTAMP_FIELD_NAME) {
                    leaf.leaf_ranges(field_type, time_zone)
                } else {
                    Ok(field_type.all_values())
                }
            }
        }
    }

    /// Timestamp ranges for the series `definition`.
    pub fn timestamp_ranges_for(
        &self,
        definition: &TimeSeriesDefinition,
    ) -> Result<RangeSet<ImmutableField>> {
        self.timestamp_ranges(&definition.timestamp_type().new_field(), definition.time_zone())
    }

    /// Compiles the predicate into a record filter for `definition`.
    ///
    /// All literals are parsed here, so malformed values fail before any record is
    /// read.
    ///
    /// # Errors
    ///
    /// Fails with `StrataError::UnknownField` for a field no record type declares
    /// and with `StrataError::Parse` for malformed literals.
    pub fn to_filter(&self, definition: &TimeSeriesDefinition) -> Result<Box<dyn RecordFilter>> {
        match self {
            Self::Noop => Ok(Box::new(AcceptAllFilter)),
            Self::And(left, right) => Ok(Box::new(AndFilter::new(
                left.to_filter(definition)?,
                right.to_filter(definition)?,
            ))),
            Self::Or(left, right) => Ok(Box::new(OrFilter::new(
                left.to_filter(definition)?,
                right.to_filter(definition)?,
            ))),
            leaf => {
                let name = leaf.leaf_field().unwrap_or_default();
                let mut targets = Vec::with_capacity(definition.number_of_record_types());
                for record_type in definition.record_types() {
                    let target = match record_type.field_index(name) {
                        Some(index) => {
                            let field_type = record_type.fields()[index].field_type;
                            Some((index, leaf.leaf_ranges(field_type, definition.time_zone())?))
                        }
                        None => None,
                    };
                    targets.push(target);
                }
                if targets.iter().all(Option::is_none) {
                    return Err(StrataError::UnknownField {
                        record_type: definition.name().to_string(),
                        field: name.to_string(),
                    });
                }
                Ok(Box::new(FieldRangeFilter::new(name, targets)))
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("TRUE"),
            Self::Comparison {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            Self::Between {
                field,
                min,
                max,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                field,
                if *negated { "NOT " } else { "" },
                min,
                max
            ),
            Self::In {
                field,
                values,
                negated,
            } => write!(
                f,
                "{} {}IN ({})",
                field,
                if *negated { "NOT " } else { "" },
                values.join(", ")
            ),
            Self::And(left, right) => write!(f, "({} AND {})", left, right),
            Self::Or(left, right) => write!(f, "({} OR {})", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TimeUnit;
    use crate::record::TimeSeriesRecord;
    use crate::schema::RecordTypeDefinition;

    fn definition() -> TimeSeriesDefinition {
        TimeSeriesDefinition::builder("test")
            .time_unit(TimeUnit::Milliseconds)
            .add_record_type(
                RecordTypeDefinition::builder("state")
                    .add_field("status", FieldType::Byte)
                    .build(),
            )
            .add_record_type(
                RecordTypeDefinition::builder("trade")
                    .add_field("price", FieldType::Decimal)
                    .add_field("status", FieldType::Integer)
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn ms(value: i64) -> ImmutableField {
        Field::MillisecondTimestamp(value).into()
    }

    #[test]
    fn test_operator_ranges() {
        let five: ImmutableField = Field::Byte(5).into();
        let ranges = Operator::Ne.ranges(five, FieldType::Byte);
        assert!(ranges.contains(&Field::Byte(i8::MIN).into()));
        assert!(ranges.contains(&Field::Byte(i8::MAX).into()));
        assert!(!ranges.contains(&five));
        assert_eq!(ranges.ranges().len(), 2);

        let ranges = Operator::Le.ranges(five, FieldType::Byte);
        assert!(ranges.contains(&five));
        assert!(!ranges.contains(&Field::Byte(6).into()));
        assert_eq!("<=".parse::<Operator>().unwrap(), Operator::Le);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_timestamp_ranges() {
        let definition = definition();
        let predicate = Predicate::comparison("timestamp", Operator::Ge, "100")
            .and(Predicate::comparison("timestamp", Operator::Lt, "200"))
            .and(Predicate::comparison("status", Operator::Eq, "1"));
        let ranges = predicate.timestamp_ranges_for(&definition).unwrap();
        assert_eq!(ranges, RangeSet::from_range(Range::closed_open(ms(100), ms(200))));

        let either = Predicate::between("timestamp", "0", "10").or(Predicate::in_values(
            "timestamp",
            ["20", "30"],
        ));
        let ranges = either.timestamp_ranges_for(&definition).unwrap();
        assert_eq!(ranges.ranges().len(), 3);
        assert!(ranges.contains(&ms(10)));
        assert!(ranges.contains(&ms(30)));
        assert!(!ranges.contains(&ms(25)));

        let negated = Predicate::not_between("timestamp", "0", "10");
        let ranges = negated.timestamp_ranges_for(&definition).unwrap();
        assert!(!ranges.contains(&ms(5)));
        assert!(ranges.contains(&ms(11)));
    }

    #[test]
    fn test_non_timestamp_leaf_spans_everything() {
        let definition = definition();
        let ranges = Predicate::comparison("status", Operator::Eq, "1")
            .timestamp_ranges_for(&definition)
            .unwrap();
        assert_eq!(ranges, FieldType::MillisecondTimestamp.all_values());
        assert_eq!(
            Predicate::Noop.timestamp_ranges_for(&definition).unwrap(),
            FieldType::MillisecondTimestamp.all_values()
        );
    }

    #[test]
    fn test_filter_parses_per_record_type() {
        let definition = definition();
        let mut filter = Predicate::comparison("status", Operator::Gt, "100")
            .to_filter(&definition)
            .unwrap();
        let state = TimeSeriesRecord::new(0, vec![Field::MillisecondTimestamp(1), Field::Byte(101)]);
        let trade = TimeSeriesRecord::new(
            1,
            vec![
                Field::MillisecondTimestamp(1),
                Field::Decimal(Default::default()),
                Field::Integer(1000),
            ],
        );
        assert!(filter.accept(&state).unwrap());
        assert!(filter.accept(&trade).unwrap());
    }

    #[test]
    fn test_filter_rejects_types_without_field() {
        let definition = definition();
        let mut filter = Predicate::not_in("price", ["1.5"]).to_filter(&definition).unwrap();
        let state = TimeSeriesRecord::new(0, vec![Field::MillisecondTimestamp(1), Field::Byte(0)]);
        assert!(!filter.accept(&state).unwrap());
    }

    #[test]
    fn test_filter_errors() {
        let definition = definition();
        assert!(matches!(
            Predicate::comparison("bid", Operator::Eq, "1").to_filter(&definition),
            Err(StrataError::UnknownField { .. })
        ));
        // 300 does not fit the byte typed `status` of the first record type.
        assert!(matches!(
            Predicate::comparison("status", Operator::Eq, "300").to_filter(&definition),
            Err(StrataError::Parse { .. })
        ));
        assert!(Predicate::comparison("timestamp", Operator::Eq, "noon")
            .timestamp_ranges_for(&definition)
            .is_err());
    }

    #[test]
    fn test_display() {
        let predicate = Predicate::comparison("price", Operator::Ge, "10")
            .or(Predicate::not_in("status", ["1", "2"]));
        assert_eq!(predicate.to_string(), "(price >= 10 OR status NOT IN (1, 2))");
    }
}
