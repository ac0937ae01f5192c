//! Ranges and range sets over totally ordered values.
//!
//! Predicates are translated into a [`RangeSet`] over the timestamp domain to prune
//! blocks and partitions, and into per-field range sets to filter records. A range
//! set is always kept normalized: its ranges are sorted, non-empty and pairwise
//! disconnected, so two sets describing the same values compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

/// A contiguous interval with independently open, closed or unbounded ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range<T> {
    lower: Bound<T>,
    upper: Bound<T>,
}

fn cmp_lower<T: Ord>(a: &Bound<T>, b: &Bound<T>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

fn cmp_upper<T: Ord>(a: &Bound<T>, b: &Bound<T>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

/// Turns the upper bound of one range into the lower bound of the adjacent gap
/// (and vice versa).
fn flip<T: Clone>(bound: &Bound<T>) -> Bound<T> {
    match bound {
        Bound::Included(v) => Bound::Excluded(v.clone()),
        Bound::Excluded(v) => Bound::Included(v.clone()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl<T: Ord + Clone> Range<T> {
    /// Creates a range from explicit bounds.
    pub fn new(lower: Bound<T>, upper: Bound<T>) -> Self {
        Self { lower, upper }
    }

    /// `[lower, upper]`
    pub fn closed(lower: T, upper: T) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    /// `[lower, upper)`
    pub fn closed_open(lower: T, upper: T) -> Self {
        Self::new(Bound::Included(lower), Bound::Excluded(upper))
    }

    /// `(lower, upper]`
    pub fn open_closed(lower: T, upper: T) -> Self {
        Self::new(Bound::Excluded(lower), Bound::Included(upper))
    }

    /// `(lower, upper)`
    pub fn open(lower: T, upper: T) -> Self {
        Self::new(Bound::Excluded(lower), Bound::Excluded(upper))
    }

    /// `[value, value]`
    pub fn singleton(value: T) -> Self {
        Self::closed(value.clone(), value)
    }

    /// `[lower, +∞)`
    pub fn at_least(lower: T) -> Self {
        Self::new(Bound::Included(lower), Bound::Unbounded)
    }

    /// `(lower, +∞)`
    pub fn greater_than(lower: T) -> Self {
        Self::new(Bound::Excluded(lower), Bound::Unbounded)
    }

    /// `(-∞, upper]`
    pub fn at_most(upper: T) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(upper))
    }

    /// `(-∞, upper)`
    pub fn less_than(upper: T) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(upper))
    }

    /// `(-∞, +∞)`
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// The lower bound.
    pub fn lower(&self) -> &Bound<T> {
        &self.lower
    }

    /// The upper bound.
    pub fn upper(&self) -> &Bound<T> {
        &self.upper
    }

    /// Returns true if no value can lie in the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(a), Bound::Included(b)) => a > b,
            (Bound::Included(a), Bound::Excluded(b))
            | (Bound::Excluded(a), Bound::Included(b))
            | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        }
    }

    /// Returns true if `value` lies in the range.
    pub fn contains(&self, value: &T) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(v) => value >= v,
            Bound::Excluded(v) => value > v,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(v) => value <= v,
            Bound::Excluded(v) => value < v,
        };
        above_lower && below_upper
    }

    /// Returns the overlap of two ranges, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Greater {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        let range = Self::new(lower, upper);
        (!range.is_empty()).then_some(range)
    }

    /// Returns true if the two ranges overlap or touch without a gap.
    pub fn is_connected(&self, other: &Self) -> bool {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            &other.lower
        } else {
            &self.lower
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Greater {
            &other.upper
        } else {
            &self.upper
        };
        match (lower, upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
            (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
            (Bound::Included(l), Bound::Included(u))
            | (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u)) => l <= u,
        }
    }

    /// The smallest range enclosing both ranges.
    pub fn span(&self, other: &Self) -> Self {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Greater {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Less {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        Self::new(lower, upper)
    }
}

fn write_bound<T: fmt::Display>(f: &mut fmt::Formatter<'_>, bound: &Bound<T>) -> fmt::Result {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => write!(f, "{}", v),
        Bound::Unbounded => write!(f, "∞"),
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(_) => write!(f, "[")?,
            Bound::Excluded(_) => write!(f, "(")?,
            Bound::Unbounded => write!(f, "(-")?,
        }
        write_bound(f, &self.lower)?;
        write!(f, "..")?;
        write_bound(f, &self.upper)?;
        match &self.upper {
            Bound::Included(_) => write!(f, "]"),
            _ => write!(f, ")"),
        }
    }
}

/// A normalized union of disjoint ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
}

impl<T: Ord + Clone> Default for RangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> RangeSet<T> {
    /// Creates an empty range set.
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Creates a range set holding a single range.
    pub fn from_range(range: Range<T>) -> Self {
        let mut set = Self::new();
        set.add(range);
        set
    }

    /// Creates a range set from any number of (possibly overlapping) ranges.
    pub fn from_ranges<I: IntoIterator<Item = Range<T>>>(ranges: I) -> Self {
        let mut set = Self::new();
        for range in ranges {
            set.add(range);
        }
        set
    }

    /// Returns the ranges in ascending order.
    pub fn ranges(&self) -> &[Range<T>] {
        &self.ranges
    }

    /// Returns true if the set contains no value.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns true if `value` lies in one of the ranges.
    pub fn contains(&self, value: &T) -> bool {
        self.ranges.iter().any(|range| range.contains(value))
    }

    /// Returns true if some value of `range` lies in the set.
    pub fn intersects(&self, range: &Range<T>) -> bool {
        self.ranges.iter().any(|r| r.intersection(range).is_some())
    }

    /// The smallest range enclosing the whole set.
    pub fn span(&self) -> Option<Range<T>> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some(first.span(last))
    }

    /// Adds `range`, coalescing it with every range it connects to.
    pub fn add(&mut self, range: Range<T>) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for existing in self.ranges.drain(..) {
            if existing.is_connected(&merged) {
                merged = merged.span(&existing);
            } else {
                kept.push(existing);
            }
        }
        let position = kept
            .iter()
            .position(|r| cmp_lower(&r.lower, &merged.lower) == Ordering::Greater)
            .unwrap_or(kept.len());
        kept.insert(position, merged);
        self.ranges = kept;
    }

    /// Returns the union of both sets.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for range in &other.ranges {
            result.add(range.clone());
        }
        result
    }

    /// Returns the values contained in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for left in &self.ranges {
            for right in &other.ranges {
                if let Some(overlap) = left.intersection(right) {
                    result.add(overlap);
                }
            }
        }
        result
    }

    /// Returns the part of the set lying inside `range`.
    pub fn sub_range_set(&self, range: &Range<T>) -> Self {
        Self::from_ranges(self.ranges.iter().filter_map(|r| r.intersection(range)))
    }

    /// Returns every value not contained in the set.
    pub fn complement(&self) -> Self {
        let mut result = Self::new();
        let mut gap_lower = Bound::Unbounded;
        for range in &self.ranges {
            if !matches!(range.lower, Bound::Unbounded) {
                result.add(Range::new(gap_lower.clone(), flip(&range.lower)));
            }
            gap_lower = flip(&range.upper);
        }
        match self.ranges.last() {
            Some(last) if matches!(last.upper, Bound::Unbounded) => {}
            _ => result.add(Range::new(gap_lower, Bound::Unbounded)),
        }
        result
    }

    /// Returns the values of this set that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.intersection(&other.complement())
    }
}

impl<T: fmt::Display> fmt::Display for RangeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", range)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = Range::closed_open(10, 20);
        assert!(range.contains(&10));
        assert!(range.contains(&19));
        assert!(!range.contains(&20));
        assert!(!range.contains(&9));
        assert!(Range::all().contains(&i64::MIN));
    }

    #[test]
    fn test_range_is_empty() {
        assert!(Range::closed_open(5, 5).is_empty());
        assert!(!Range::closed(5, 5).is_empty());
        assert!(Range::open(5, 5).is_empty());
        assert!(Range::closed(6, 5).is_empty());
    }

    #[test]
    fn test_range_intersection() {
        let a = Range::closed(0, 10);
        let b = Range::open(5, 15);
        assert_eq!(a.intersection(&b), Some(Range::open_closed(5, 10)));
        assert_eq!(Range::closed_open(0, 5).intersection(&Range::closed(5, 9)), None);
    }

    #[test]
    fn test_adjacent_ranges_coalesce() {
        let set = RangeSet::from_ranges([Range::closed_open(0, 5), Range::closed(5, 10)]);
        assert_eq!(set.ranges(), &[Range::closed(0, 10)]);
    }

    #[test]
    fn test_open_ranges_with_gap_stay_apart() {
        let set = RangeSet::from_ranges([Range::open(0, 5), Range::open(5, 10)]);
        assert_eq!(set.ranges().len(), 2);
        assert!(!set.contains(&5));
    }

    #[test]
    fn test_add_keeps_order() {
        let set = RangeSet::from_ranges([
            Range::closed(20, 30),
            Range::closed(0, 5),
            Range::closed(10, 12),
            Range::closed(4, 11),
        ]);
        assert_eq!(set.ranges(), &[Range::closed(0, 12), Range::closed(20, 30)]);
    }

    #[test]
    fn test_complement() {
        let set = RangeSet::from_range(Range::closed(5, 10));
        let complement = set.complement();
        assert_eq!(
            complement.ranges(),
            &[Range::less_than(5), Range::greater_than(10)]
        );
        assert_eq!(complement.complement(), set);
        assert_eq!(RangeSet::<i32>::new().complement().ranges(), &[Range::all()]);
        assert!(RangeSet::from_range(Range::<i32>::all()).complement().is_empty());
    }

    #[test]
    fn test_intersection_and_difference() {
        let a = RangeSet::from_ranges([Range::closed(0, 10), Range::closed(20, 30)]);
        let b = RangeSet::from_range(Range::closed(5, 25));
        assert_eq!(
            a.intersection(&b).ranges(),
            &[Range::closed(5, 10), Range::closed(20, 25)]
        );
        assert_eq!(
            a.difference(&b).ranges(),
            &[Range::closed_open(0, 5), Range::open_closed(25, 30)]
        );
    }

    #[test]
    fn test_sub_range_set_and_span() {
        let set = RangeSet::from_ranges([Range::closed(0, 10), Range::closed(20, 30)]);
        let sub = set.sub_range_set(&Range::closed_open(8, 22));
        assert_eq!(sub.ranges(), &[Range::closed(8, 10), Range::closed_open(20, 22)]);
        assert_eq!(set.span(), Some(Range::closed(0, 30)));
        assert!(set.intersects(&Range::closed(10, 11)));
        assert!(!set.intersects(&Range::open(10, 20)));
    }

    #[test]
    fn test_display() {
        let set = RangeSet::from_ranges([Range::closed_open(1, 3), Range::greater_than(7)]);
        assert_eq!(set.to_string(), "{[1..3), (7..∞)}");
    }
}
