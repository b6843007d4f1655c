//! Reference range evaluation.
//!
//! Pure classification of raw result fields against their declared ranges.
//! The evaluator has no knowledge of workflow state; the result lifecycle
//! re-runs it in full on every field mutation instead of patching flags
//! incrementally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::enums::FieldFlag;
use crate::models::test_result::ReferenceRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub per_field: BTreeMap<String, FieldFlag>,
    pub is_abnormal: bool,
    pub is_critical: bool,
}

/// Classify every result field against its reference range.
///
/// - No matching range, or a value that does not parse as a number →
///   `Unknown`, never counted toward abnormal.
/// - Outside `[min, max]` → `Abnormal`.
/// - Deviation beyond the bound exceeding half the range width escalates the
///   overall result to critical.
pub fn evaluate(
    test_type: &str,
    results: &BTreeMap<String, String>,
    ranges: &BTreeMap<String, ReferenceRange>,
) -> Evaluation {
    let mut per_field = BTreeMap::new();
    let mut is_abnormal = false;
    let mut is_critical = false;

    for (field, raw) in results {
        let flag = match (ranges.get(field), parse_value(raw)) {
            (Some(range), Some(value)) => classify(field, value, range, &mut is_critical),
            _ => FieldFlag::Unknown,
        };
        if flag == FieldFlag::Abnormal {
            is_abnormal = true;
        }
        per_field.insert(field.clone(), flag);
    }

    debug!(
        "evaluated {test_type}: {} fields, abnormal={is_abnormal}, critical={is_critical}",
        per_field.len()
    );

    Evaluation {
        per_field,
        is_abnormal,
        is_critical,
    }
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn classify(
    field: &str,
    value: f64,
    range: &ReferenceRange,
    is_critical: &mut bool,
) -> FieldFlag {
    // A range with min above max cannot classify anything.
    if range.min > range.max {
        return FieldFlag::Unknown;
    }

    if value >= range.min && value <= range.max {
        return FieldFlag::Normal;
    }

    let half_width = (range.max - range.min) / 2.0;
    let deviation = if value > range.max {
        value - range.max
    } else {
        range.min - value
    };
    if deviation > half_width {
        debug!("field {field} critically out of range: {value} vs [{}, {}]", range.min, range.max);
        *is_critical = true;
    }

    FieldFlag::Abnormal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64) -> ReferenceRange {
        ReferenceRange {
            min,
            max,
            unit: Some("g/dL".into()),
        }
    }

    fn single(field: &str, value: &str, r: ReferenceRange) -> Evaluation {
        let results = BTreeMap::from([(field.to_string(), value.to_string())]);
        let ranges = BTreeMap::from([(field.to_string(), r)]);
        evaluate("cbc", &results, &ranges)
    }

    #[test]
    fn in_range_value_is_normal() {
        let eval = single("hemoglobin", "13.2", range(12.0, 15.5));
        assert_eq!(eval.per_field["hemoglobin"], FieldFlag::Normal);
        assert!(!eval.is_abnormal);
        assert!(!eval.is_critical);
    }

    #[test]
    fn boundary_values_are_normal() {
        assert!(!single("hgb", "12.0", range(12.0, 15.5)).is_abnormal);
        assert!(!single("hgb", "15.5", range(12.0, 15.5)).is_abnormal);
    }

    #[test]
    fn out_of_range_value_is_abnormal() {
        let eval = single("hemoglobin", "16.0", range(12.0, 15.5));
        assert_eq!(eval.per_field["hemoglobin"], FieldFlag::Abnormal);
        assert!(eval.is_abnormal);
        assert!(!eval.is_critical);
    }

    #[test]
    fn deviation_beyond_half_width_is_critical() {
        // Half width of [12.0, 15.5] is 1.75, so the critical threshold is
        // 17.25 on the high side; 20.0 clears it.
        let eval = single("hemoglobin", "20.0", range(12.0, 15.5));
        assert!(eval.is_abnormal);
        assert!(eval.is_critical);
    }

    #[test]
    fn deviation_at_exactly_half_width_is_not_critical() {
        let eval = single("hemoglobin", "17.25", range(12.0, 15.5));
        assert!(eval.is_abnormal);
        assert!(!eval.is_critical);
    }

    #[test]
    fn low_side_critical_escalation() {
        // Threshold below min: 12.0 - 1.75 = 10.25.
        let eval = single("hemoglobin", "9.0", range(12.0, 15.5));
        assert!(eval.is_abnormal);
        assert!(eval.is_critical);
    }

    #[test]
    fn field_without_range_is_unknown() {
        let results = BTreeMap::from([("color".to_string(), "yellow".to_string())]);
        let eval = evaluate("urinalysis", &results, &BTreeMap::new());
        assert_eq!(eval.per_field["color"], FieldFlag::Unknown);
        assert!(!eval.is_abnormal);
    }

    #[test]
    fn non_numeric_value_is_unknown() {
        let eval = single("hemoglobin", "hemolyzed", range(12.0, 15.5));
        assert_eq!(eval.per_field["hemoglobin"], FieldFlag::Unknown);
        assert!(!eval.is_abnormal);
    }

    #[test]
    fn inverted_range_is_unknown() {
        let eval = single("hemoglobin", "13.0", range(15.5, 12.0));
        assert_eq!(eval.per_field["hemoglobin"], FieldFlag::Unknown);
        assert!(!eval.is_abnormal);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let results = BTreeMap::from([
            ("hemoglobin".to_string(), "20.0".to_string()),
            ("wbc".to_string(), "7.1".to_string()),
            ("note".to_string(), "slightly hemolyzed".to_string()),
        ]);
        let ranges = BTreeMap::from([
            ("hemoglobin".to_string(), range(12.0, 15.5)),
            ("wbc".to_string(), range(4.0, 11.0)),
        ]);

        let first = evaluate("cbc", &results, &ranges);
        let second = evaluate("cbc", &results, &ranges);
        assert_eq!(first, second);
        assert!(first.is_abnormal);
        assert!(first.is_critical);
        assert_eq!(first.per_field["wbc"], FieldFlag::Normal);
        assert_eq!(first.per_field["note"], FieldFlag::Unknown);
    }
}
