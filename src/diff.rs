//! Structural comparison of heterogeneous configuration documents.
//!
//! Used to verify convergence: after a reconciliation, the document the
//! backend reports should equal the one we intended to write.
//!
//! # Rules
//!
//! | Value kind | Comparison |
//! |------------|------------|
//! | object | key sets first (missing / unexpected keys), then values per key |
//! | array | element-wise in order, unless the path is declared unordered |
//! | number | numeric-type agnostic (`0` equals `0.0`), integers exact |
//! | other scalars | by value |
//!
//! Every discrepancy is collected; the comparison never stops at the first
//! mismatch.

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::{Error, Result};

/// What went wrong at a given path.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscrepancyKind {
    /// Key or element present in `expected` only.
    Missing {
        /// Expected value
        expected: Value,
    },
    /// Key or element present in `actual` only.
    Unexpected {
        /// Actual value
        actual: Value,
    },
    /// Values are of different JSON kinds.
    TypeMismatch {
        /// Expected value
        expected: Value,
        /// Actual value
        actual: Value,
    },
    /// Same kind, different value.
    ValueMismatch {
        /// Expected value
        expected: Value,
        /// Actual value
        actual: Value,
    },
}

/// A single difference between two documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    /// Dotted path, with `[i]` for array indices and `[*]` for unordered arrays.
    pub path: String,
    /// Nature of the difference.
    pub kind: DiscrepancyKind,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiscrepancyKind::Missing { expected } => {
                write!(f, "{}: missing, expected {expected}", self.path)
            }
            DiscrepancyKind::Unexpected { actual } => {
                write!(f, "{}: unexpected {actual}", self.path)
            }
            DiscrepancyKind::TypeMismatch { expected, actual } => write!(
                f,
                "{}: type differs, expected {expected}, got {actual}",
                self.path
            ),
            DiscrepancyKind::ValueMismatch { expected, actual } => {
                write!(f, "{}: expected {expected}, got {actual}", self.path)
            }
        }
    }
}

/// Aggregated discrepancy report carried by [`Error::StructuralMismatch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MismatchReport {
    /// Every discrepancy, in traversal order.
    pub discrepancies: Vec<Discrepancy>,
}

impl MismatchReport {
    /// Number of discrepancies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.discrepancies.len()
    }

    /// `true` when the documents matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Paths of all discrepancies.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.discrepancies.iter().map(|d| d.path.as_str())
    }
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} discrepancies", self.discrepancies.len())?;
        for d in &self.discrepancies {
            write!(f, "; {d}")?;
        }
        Ok(())
    }
}

/// Configurable document comparator.
///
/// ```
/// # use keymaster::diff::MapDiff;
/// # use serde_json::json;
/// let expected = json!({"names": ["a", "b"]});
/// let actual = json!({"names": ["b", "a"]});
/// let diff = MapDiff::new().unordered("names");
/// assert!(diff.compare_values(&expected, &actual).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapDiff {
    unordered: HashSet<String>,
    allow_extra_keys: bool,
}

impl MapDiff {
    /// Comparator with every array ordered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the array at `path` (dotted, e.g. `"data.policies"`) as a multiset.
    #[must_use]
    pub fn unordered(mut self, path: impl Into<String>) -> Self {
        self.unordered.insert(path.into());
        self
    }

    /// Ignore keys present only in `actual`.
    ///
    /// Backends often report defaulted fields that were never written; this
    /// keeps a convergence check focused on what was intended.
    #[must_use]
    pub fn allow_extra_keys(mut self) -> Self {
        self.allow_extra_keys = true;
        self
    }

    /// Compare two maps; `Err(StructuralMismatch)` lists every difference.
    pub fn diff(&self, expected: &Map<String, Value>, actual: &Map<String, Value>) -> Result<()> {
        let mut report = MismatchReport::default();
        self.walk_object("", expected, actual, &mut report);
        if report.is_empty() {
            Ok(())
        } else {
            Err(Error::StructuralMismatch(report))
        }
    }

    /// Compare two arbitrary values and return the report.
    #[must_use]
    pub fn compare_values(&self, expected: &Value, actual: &Value) -> MismatchReport {
        let mut report = MismatchReport::default();
        self.walk("", expected, actual, &mut report);
        report
    }

    fn walk(&self, path: &str, expected: &Value, actual: &Value, report: &mut MismatchReport) {
        match (expected, actual) {
            (Value::Object(e), Value::Object(a)) => self.walk_object(path, e, a, report),
            (Value::Array(e), Value::Array(a)) => {
                if self.unordered.contains(path) {
                    walk_unordered(path, e, a, report);
                } else {
                    self.walk_ordered(path, e, a, report);
                }
            }
            (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Null, Value::Null) => {
                if !scalars_equal(expected, actual) {
                    report.discrepancies.push(Discrepancy {
                        path: display_path(path),
                        kind: DiscrepancyKind::ValueMismatch {
                            expected: expected.clone(),
                            actual: actual.clone(),
                        },
                    });
                }
            }
            _ => report.discrepancies.push(Discrepancy {
                path: display_path(path),
                kind: DiscrepancyKind::TypeMismatch {
                    expected: expected.clone(),
                    actual: actual.clone(),
                },
            }),
        }
    }

    fn walk_object(
        &self,
        path: &str,
        expected: &Map<String, Value>,
        actual: &Map<String, Value>,
        report: &mut MismatchReport,
    ) {
        for (key, e) in expected {
            let child = join(path, key);
            match actual.get(key) {
                Some(a) => self.walk(&child, e, a, report),
                None => report.discrepancies.push(Discrepancy {
                    path: child,
                    kind: DiscrepancyKind::Missing { expected: e.clone() },
                }),
            }
        }
        if self.allow_extra_keys {
            return;
        }
        for (key, a) in actual {
            if !expected.contains_key(key) {
                report.discrepancies.push(Discrepancy {
                    path: join(path, key),
                    kind: DiscrepancyKind::Unexpected { actual: a.clone() },
                });
            }
        }
    }

    fn walk_ordered(
        &self,
        path: &str,
        expected: &[Value],
        actual: &[Value],
        report: &mut MismatchReport,
    ) {
        for i in 0..expected.len().max(actual.len()) {
            let child = format!("{path}[{i}]");
            match (expected.get(i), actual.get(i)) {
                (Some(e), Some(a)) => self.walk(&child, e, a, report),
                (Some(e), None) => report.discrepancies.push(Discrepancy {
                    path: child,
                    kind: DiscrepancyKind::Missing { expected: e.clone() },
                }),
                (None, Some(a)) => report.discrepancies.push(Discrepancy {
                    path: child,
                    kind: DiscrepancyKind::Unexpected { actual: a.clone() },
                }),
                (None, None) => {}
            }
        }
    }
}

/// Compare two documents with every array treated as ordered.
pub fn map_diff(expected: &Map<String, Value>, actual: &Map<String, Value>) -> Result<()> {
    MapDiff::new().diff(expected, actual)
}

fn walk_unordered(path: &str, expected: &[Value], actual: &[Value], report: &mut MismatchReport) {
    let child = format!("{path}[*]");
    let mut unmatched: Vec<&Value> = actual.iter().collect();
    for e in expected {
        if let Some(pos) = unmatched.iter().position(|a| values_equal(e, a)) {
            unmatched.remove(pos);
        } else {
            report.discrepancies.push(Discrepancy {
                path: child.clone(),
                kind: DiscrepancyKind::Missing { expected: e.clone() },
            });
        }
    }
    for a in unmatched {
        report.discrepancies.push(Discrepancy {
            path: child.clone(),
            kind: DiscrepancyKind::Unexpected { actual: a.clone() },
        });
    }
}

/// Deep equality with numeric-type-agnostic number comparison.
#[must_use]
pub fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            e.len() == a.len()
                && e.iter()
                    .all(|(k, v)| a.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::Array(e), Value::Array(a)) => {
            e.len() == a.len() && e.iter().zip(a).all(|(x, y)| values_equal(x, y))
        }
        _ => scalars_equal(expected, actual),
    }
}

fn scalars_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => numbers_equal(e, a),
        _ => expected == actual,
    }
}

/// Integers compare exactly; a float equals an integer only when it is
/// integral, in range and converts to exactly that integer.
#[allow(clippy::float_cmp)]
fn numbers_equal(expected: &Number, actual: &Number) -> bool {
    match (integer(expected), integer(actual)) {
        (Some(x), Some(y)) => x == y,
        (Some(i), None) => actual.as_f64().is_some_and(|f| integral_float(f) == Some(i)),
        (None, Some(i)) => expected.as_f64().is_some_and(|f| integral_float(f) == Some(i)),
        (None, None) => match (expected.as_f64(), actual.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Exact integer value of `f`, if it has one within the `i64`/`u64` range.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn integral_float(f: f64) -> Option<i128> {
    // [-2^63, 2^64)
    const MIN: f64 = -9_223_372_036_854_775_808.0;
    const MAX: f64 = 18_446_744_073_709_551_616.0;
    if f.is_finite() && f.fract() == 0.0 && (MIN..MAX).contains(&f) {
        Some(f as i128)
    } else {
        None
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn identical_documents_match() {
        let doc = obj(json!({"a": 1, "b": ["x", "y"], "c": {"d": true}}));
        assert!(map_diff(&doc, &doc).is_ok());
    }

    #[test]
    fn integer_zero_equals_float_zero() {
        let expected = obj(json!({"token_ttl": 0}));
        let actual = obj(json!({"token_ttl": 0.0}));
        assert!(map_diff(&expected, &actual).is_ok());
    }

    #[test]
    fn reports_missing_and_unexpected_keys() {
        let expected = obj(json!({"a": 1, "b": 2}));
        let actual = obj(json!({"b": 2, "c": 3}));

        let Err(Error::StructuralMismatch(report)) = map_diff(&expected, &actual) else {
            panic!("expected mismatch");
        };

        assert_eq!(report.len(), 2);
        assert!(matches!(report.discrepancies[0].kind, DiscrepancyKind::Missing { .. }));
        assert_eq!(report.discrepancies[0].path, "a");
        assert!(matches!(report.discrepancies[1].kind, DiscrepancyKind::Unexpected { .. }));
        assert_eq!(report.discrepancies[1].path, "c");
    }

    #[test]
    fn collects_every_discrepancy() {
        // GIVEN: three independent differences at different depths
        let expected = obj(json!({"a": 1, "b": {"c": "x"}, "d": [1, 2]}));
        let actual = obj(json!({"a": 2, "b": {"c": "y"}, "d": [1, 3]}));

        // WHEN: diff
        let err = map_diff(&expected, &actual).unwrap_err();

        // THEN: all three are reported with their paths
        let Error::StructuralMismatch(report) = err else {
            panic!("wrong error");
        };
        let paths: Vec<_> = report.paths().collect();
        assert_eq!(paths, vec!["a", "b.c", "d[1]"]);
    }

    #[test]
    fn extra_keys_can_be_ignored() {
        let expected = obj(json!({"a": 1}));
        let actual = obj(json!({"a": 1, "ocsp_enabled": false}));
        assert!(map_diff(&expected, &actual).is_err());
        assert!(MapDiff::new().allow_extra_keys().diff(&expected, &actual).is_ok());
    }

    #[test]
    fn arrays_are_ordered_by_default() {
        let expected = obj(json!({"p": ["a", "b"]}));
        let actual = obj(json!({"p": ["b", "a"]}));
        assert!(map_diff(&expected, &actual).is_err());
    }

    #[test]
    fn unordered_paths_compare_as_multisets() {
        let expected = obj(json!({"p": ["a", "b", "a"]}));
        let same = obj(json!({"p": ["a", "a", "b"]}));
        let fewer = obj(json!({"p": ["a", "b"]}));

        let diff = MapDiff::new().unordered("p");
        assert!(diff.diff(&expected, &same).is_ok());

        let Err(Error::StructuralMismatch(report)) = diff.diff(&expected, &fewer) else {
            panic!("expected mismatch");
        };
        assert_eq!(report.len(), 1);
        assert_eq!(report.discrepancies[0].path, "p[*]");
    }

    #[test]
    fn length_difference_reports_extra_elements() {
        let expected = obj(json!({"p": ["a"]}));
        let actual = obj(json!({"p": ["a", "b"]}));
        let Err(Error::StructuralMismatch(report)) = map_diff(&expected, &actual) else {
            panic!("expected mismatch");
        };
        assert_eq!(
            report.discrepancies,
            vec![Discrepancy {
                path: "p[1]".to_string(),
                kind: DiscrepancyKind::Unexpected { actual: json!("b") },
            }]
        );
    }

    #[test]
    fn type_mismatch_is_reported() {
        let expected = obj(json!({"bound_cidrs": []}));
        let actual = obj(json!({"bound_cidrs": null}));
        let Err(Error::StructuralMismatch(report)) = map_diff(&expected, &actual) else {
            panic!("expected mismatch");
        };
        assert!(matches!(report.discrepancies[0].kind, DiscrepancyKind::TypeMismatch { .. }));
    }

    #[test]
    fn report_display_lists_paths() {
        let expected = obj(json!({"a": "x"}));
        let actual = obj(json!({"a": "y"}));
        let err = map_diff(&expected, &actual).unwrap_err().to_string();
        assert!(err.contains("1 discrepancies"), "{err}");
        assert!(err.contains(r#"a: expected "x", got "y""#), "{err}");
    }

    #[test]
    fn integral_float_equals_integer() {
        let diff = MapDiff::new();
        assert!(diff.compare_values(&json!({"t": 0}), &json!({"t": 0.0})).is_empty());
        assert!(diff.compare_values(&json!({"t": 3600.0}), &json!({"t": 3600u64})).is_empty());
        assert!(!diff.compare_values(&json!({"t": 3}), &json!({"t": 3.5})).is_empty());
    }

    #[test]
    fn large_integers_are_not_rounded_through_floats() {
        // GIVEN: an integer above 2^53 and the nearest float
        let expected = json!({"token_ttl": 9_007_199_254_740_993_i64});
        let actual = json!({"token_ttl": 9_007_199_254_740_992.0});

        // WHEN: compare
        let report = MapDiff::new().compare_values(&expected, &actual);

        // THEN: the difference is reported
        assert_eq!(report.paths().collect::<Vec<_>>(), vec!["token_ttl"]);
    }

    #[test]
    fn out_of_range_float_never_equals_integer() {
        let report = MapDiff::new().compare_values(&json!(u64::MAX), &json!(1.0e30));
        assert!(!report.is_empty());
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            any::<f64>()
                .prop_filter("finite, non-integral", |f| f.is_finite() && f.fract() != 0.0)
                .prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        /// A document never differs from itself.
        #[test]
        fn diff_of_self_is_empty(v in arb_value()) {
            prop_assert!(MapDiff::new().compare_values(&v, &v).is_empty());
        }

        /// Distinct documents always produce a discrepancy.
        #[test]
        fn diff_of_distinct_reports_something(a in arb_value(), b in arb_value()) {
            prop_assume!(a != b);
            prop_assert!(!MapDiff::new().compare_values(&a, &b).is_empty());
        }
    }
}
