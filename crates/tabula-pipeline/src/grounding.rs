//! Numeric grounding of generated narrative.
//!
//! Every number in the narrative must be traceable to the executed result:
//! a cell, a metric, a supporting-query output or a statistic the interpreter
//! computed. Numbers that only appear in the question do not count, so
//! echoing a threshold back as a finding is flagged. Ungrounded numbers are
//! reported, never removed.

use once_cell::sync::Lazy;
use regex::Regex;
use tabula_types::{ExecutionResult, Insights, InterpretationResult, Value};
use tracing::warn;

/// Relative tolerance for a number to count as grounded.
pub const TOLERANCE: f64 = 0.10;
/// Confidence removed per ungrounded number.
const PENALTY: f64 = 0.1;
const MIN_CONFIDENCE: f64 = 0.1;

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\b\d[\d,]*(?:\.\d+)?%?").expect("number pattern is valid")
});

/// A numeric token found in text.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericToken {
    pub text: String,
    pub value: f64,
    pub percent: bool,
}

/// Every numeric token in `text`. Thousands separators are accepted.
pub fn extract_numbers(text: &str) -> Vec<NumericToken> {
    NUMBER
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let percent = raw.ends_with('%');
            let cleaned: String = raw
                .trim_end_matches('%')
                .trim_end_matches(',')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.parse::<f64>().ok().map(|value| NumericToken {
                text: raw.trim_end_matches(',').to_string(),
                value,
                percent,
            })
        })
        .collect()
}

/// Numbers a narrative may legitimately mention.
#[derive(Debug, Default)]
pub struct Reference {
    values: Vec<f64>,
}

impl Reference {
    pub fn build(execution: &ExecutionResult, interpretation: &InterpretationResult) -> Self {
        let mut values = execution.numbers();

        // Numbers embedded in text cells, such as "Q3 2024".
        let text_cells = execution
            .rows
            .iter()
            .flatten()
            .chain(
                execution
                    .intermediate_results
                    .values()
                    .flat_map(|o| o.rows.iter().flatten()),
            )
            .filter_map(|v| match v {
                Value::Text(s) => Some(s.as_str()),
                _ => None,
            });
        for text in text_cells {
            values.extend(extract_numbers(text).into_iter().map(|t| t.value));
        }

        for c in &interpretation.top_contributors {
            values.push(c.share * 100.0);
        }
        for o in &interpretation.outliers {
            values.push(o.value);
            values.push(o.z_score.abs());
        }
        for t in &interpretation.trends {
            values.push(t.start_value);
            values.push(t.end_value);
            values.extend(t.change_pct.map(f64::abs));
        }
        for c in &interpretation.correlations {
            values.push(c.coefficient.abs());
        }

        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether `token` matches a reference value within tolerance.
    ///
    /// Percentages also match their fraction, so `45%` is grounded by `0.45`.
    pub fn grounds(&self, token: &NumericToken) -> bool {
        let mut candidates = vec![token.value, token.value.abs()];
        if token.percent {
            candidates.push(token.value / 100.0);
        }
        candidates
            .iter()
            .any(|c| self.values.iter().any(|r| within_tolerance(*c, *r)))
    }
}

fn within_tolerance(claimed: f64, actual: f64) -> bool {
    if actual == 0.0 {
        return claimed == 0.0;
    }
    ((claimed - actual) / actual).abs() <= TOLERANCE
}

/// Check every number in the narrative and record the ones that are not
/// grounded. Confidence drops per miss and sufficiency drops one level.
pub fn apply(insights: &mut Insights, reference: &Reference) {
    let mut warnings = Vec::new();
    for text in insights.narrative() {
        for token in extract_numbers(text) {
            if !reference.grounds(&token) {
                warnings.push(format!("ungrounded number '{}' in: {}", token.text, text));
            }
        }
    }
    if warnings.is_empty() {
        return;
    }

    warn!(count = warnings.len(), "narrative contains ungrounded numbers");
    let penalty = PENALTY * warnings.len() as f64;
    insights.confidence = (insights.confidence - penalty).max(MIN_CONFIDENCE);
    insights.data_sufficiency = insights.data_sufficiency.degrade();
    insights.grounding_warnings.extend(warnings);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{Contributor, DataSufficiency, Provenance, QueryOutcome};

    fn execution() -> ExecutionResult {
        ExecutionResult::from_outcome(
            QueryOutcome::ok(
                vec!["region".into(), "sales".into()],
                vec![
                    vec![Value::text("East"), Value::Int(1200)],
                    vec![Value::text("Q3 2024"), Value::Float(800.5)],
                ],
            ),
            1,
        )
    }

    fn insights(text: &str) -> Insights {
        Insights {
            direct_answer: text.to_string(),
            what_data_shows: vec![],
            why_it_happened: vec![],
            business_implications: vec![],
            confidence: 0.8,
            data_sufficiency: DataSufficiency::Sufficient,
            grounding_warnings: vec![],
            generated_by: Provenance::Model,
        }
    }

    #[test]
    fn test_extract_numbers() {
        let tokens = extract_numbers("Sales hit 1,200 units, up 12.5% from -3 last year.");
        let values: Vec<f64> = tokens.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![1200.0, 12.5, -3.0]);
        assert!(tokens[1].percent);
        assert_eq!(tokens[0].text, "1,200");
    }

    #[test]
    fn test_grounded_within_tolerance() {
        let reference = Reference::build(&execution(), &InterpretationResult::default());
        let mut ins = insights("East sold about 1,150 while Q3 2024 reached 800.");
        apply(&mut ins, &reference);
        assert!(ins.grounding_warnings.is_empty());
        assert_eq!(ins.confidence, 0.8);
    }

    #[test]
    fn test_ungrounded_number_warns_without_blocking() {
        let reference = Reference::build(&execution(), &InterpretationResult::default());
        let mut ins = insights("East sold 5000 units.");
        apply(&mut ins, &reference);

        assert_eq!(ins.grounding_warnings.len(), 1);
        assert!(ins.grounding_warnings[0].contains("5000"));
        assert!((ins.confidence - 0.7).abs() < 1e-9);
        assert_eq!(ins.data_sufficiency, DataSufficiency::Partial);
        assert_eq!(ins.direct_answer, "East sold 5000 units.");
    }

    #[test]
    fn test_interpreter_statistics_are_references() {
        let interpretation = InterpretationResult {
            top_contributors: vec![Contributor {
                column: "sales".into(),
                labels: vec!["East".into()],
                share: 0.6,
            }],
            ..Default::default()
        };
        let reference = Reference::build(&execution(), &interpretation);
        let mut ins = insights("East holds 60% of sales.");
        apply(&mut ins, &reference);
        assert!(ins.grounding_warnings.is_empty());
    }

    #[test]
    fn test_zero_must_match_exactly() {
        assert!(within_tolerance(0.0, 0.0));
        assert!(!within_tolerance(0.05, 0.0));
        assert!(within_tolerance(105.0, 100.0));
        assert!(!within_tolerance(111.0, 100.0));
    }
}
