use itertools::Itertools;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// highest job array index LSF accepts, bounds the size of any array
pub const MAX_ARRAY_INDEX: i64 = 2_147_483_646;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Index range is empty")]
    Empty,
    #[error("Invalid array specification item '{item}' in '{spec}'")]
    InvalidItem { item: String, spec: String },
    #[error("Array index {index} in '{spec}' is invalid, indices start at 1")]
    NonPositive { index: i64, spec: String },
    #[error("Array index {index} in '{spec}' exceeds the maximum of {MAX_ARRAY_INDEX}")]
    TooLarge { index: i64, spec: String },
    #[error("Range '{item}' in '{spec}' ends before it starts")]
    Reversed { item: String, spec: String },
}

/// A job array index specification such as `13,15,18-21`
///
/// Only the inclusive bounds of each item are kept, merged into sorted
/// disjoint intervals. Indices are produced on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRange {
    spec: String,
    intervals: Vec<(i64, i64)>,
}

fn parse_bound(bound: &str) -> Option<i64> {
    if bound.is_empty() || !bound.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    bound.parse().ok()
}

impl IndexRange {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        if input.trim().is_empty() {
            return Err(RangeError::Empty);
        }

        let items = input.split(',').map(str::trim).collect_vec();
        let spec = items.iter().join(",");

        let invalid = |item: &str| RangeError::InvalidItem {
            item: item.to_string(),
            spec: spec.clone(),
        };
        let mut intervals = Vec::with_capacity(items.len());

        for &item in &items {
            let bounds = item
                .split('-')
                .map(|bound| parse_bound(bound).ok_or_else(|| invalid(item)))
                .collect::<Result<Vec<_>, _>>()?;

            let (first, last) = match bounds.as_slice() {
                [single] => (*single, *single),
                [first, last] => (*first, *last),
                _ => return Err(invalid(item)),
            };

            if let Some(&index) = [first, last].iter().find(|index| **index < 1) {
                return Err(RangeError::NonPositive {
                    index,
                    spec: spec.clone(),
                });
            }

            if let Some(&index) = [first, last].iter().find(|index| **index > MAX_ARRAY_INDEX) {
                return Err(RangeError::TooLarge {
                    index,
                    spec: spec.clone(),
                });
            }

            if last < first {
                return Err(RangeError::Reversed {
                    item: item.to_string(),
                    spec: spec.clone(),
                });
            }

            intervals.push((first, last));
        }

        let intervals = intervals
            .into_iter()
            .sorted()
            .coalesce(|(a_first, a_last), (b_first, b_last)| {
                if b_first <= a_last + 1 {
                    Ok((a_first, a_last.max(b_last)))
                } else {
                    Err(((a_first, a_last), (b_first, b_last)))
                }
            })
            .collect_vec();

        Ok(Self { spec, intervals })
    }

    /// sorted and de-duplicated indices covered by the specification
    pub fn indices(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals
            .iter()
            .flat_map(|&(first, last)| first..=last)
    }

    /// number of distinct indices
    pub fn len(&self) -> u64 {
        self.intervals
            .iter()
            .map(|&(first, last)| (last - first + 1) as u64)
            .sum()
    }

    /// the specification as it is handed to the scheduler
    pub fn as_str(&self) -> &str {
        &self.spec
    }
}

impl FromStr for IndexRange {
    type Err = RangeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}
