//! Keyword rules behind the deterministic paths of intent classification
//! and requirement extraction.
//!
//! Both functions are total: any question and any schema yield a value.

use tabula_types::{
    AggregateFunction, Aggregation, IntentCategory, IntentResult, Provenance, QueryRequirements,
    SchemaProfile, SemanticType, SortSpec,
};

/// Keyword lists, checked in order. A trailing `*` matches any word with that prefix.
const INTENT_RULES: &[(IntentCategory, &[&str])] = &[
    (
        IntentCategory::Trend,
        &[
            "trend*", "over time", "monthly", "weekly", "daily", "yearly", "quarterly",
            "per month", "by month", "by year", "by week", "by day", "growth", "timeline",
            "time series",
        ],
    ),
    (
        IntentCategory::Diagnostic,
        &["why", "cause*", "reason*", "driver*", "explain*"],
    ),
    (
        IntentCategory::Comparative,
        &["vs", "versus", "compar*", "difference between", "against"],
    ),
    (
        IntentCategory::Predictive,
        &["predict*", "forecast*", "projection", "next month", "next year", "will"],
    ),
    (
        IntentCategory::Prescriptive,
        &["should", "recommend*", "optimi*", "how can we", "improve"],
    ),
    (
        IntentCategory::Distribution,
        &["distribution", "spread", "histogram", "range of", "variance"],
    ),
    (
        IntentCategory::Correlation,
        &["correlat*", "relationship between", "associated with", "related to"],
    ),
];

const AGGREGATE_RULES: &[(AggregateFunction, &[&str])] = &[
    (AggregateFunction::Sum, &["total", "sum", "overall"]),
    (AggregateFunction::Avg, &["average", "avg", "mean"]),
    (AggregateFunction::Count, &["count", "how many", "number of"]),
    (AggregateFunction::Max, &["maximum", "max", "highest value", "largest value"]),
    (AggregateFunction::Min, &["minimum", "min", "lowest value", "smallest value"]),
];

const GROUPING_WORDS: &[&str] = &["by", "per", "each", "across"];
const DESCENDING_WORDS: &[&str] = &["top", "highest", "most", "largest", "best", "biggest"];
const ASCENDING_WORDS: &[&str] = &["bottom", "lowest", "least", "smallest", "worst"];

/// Classify by keyword. Defaults to Descriptive.
pub fn classify_intent(question: &str) -> IntentResult {
    let text = normalize(question);
    let category = INTENT_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| mentions(&text, k)))
        .map(|(category, _)| *category)
        .unwrap_or(IntentCategory::Descriptive);

    let mut intent = IntentResult::new(category, 0.5);
    intent.required_operations = match category {
        IntentCategory::Trend => vec!["aggregate".into(), "group_by_time".into()],
        IntentCategory::Comparative => vec!["aggregate".into(), "group_by".into()],
        IntentCategory::Correlation => vec!["correlate".into()],
        IntentCategory::Distribution => vec!["bucket".into()],
        _ => vec!["aggregate".into()],
    };
    intent.classified_by = Provenance::Rules;
    intent
}

/// Requirements from the columns the question names.
///
/// Uses columns literally present in the question, or the first numeric
/// column when none are, and infers the aggregate from keywords. Groups only
/// by columns the question names, or by time for trend questions.
pub fn extract_requirements(
    question: &str,
    intent: &IntentResult,
    schema: &SchemaProfile,
) -> QueryRequirements {
    let text = normalize(question);
    let words: Vec<&str> = text.split_whitespace().collect();

    let mentioned: Vec<&str> = schema
        .columns
        .keys()
        .map(|s| s.as_str())
        .filter(|name| mentions_column(&text, name))
        .collect();
    let is_numeric = |name: &str| schema.semantic_type(name) == Some(SemanticType::Numeric);
    let first_numeric = schema.columns_of(SemanticType::Numeric).first().copied();

    let function = AGGREGATE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| mentions(&text, k)))
        .map(|(f, _)| *f);

    let mut group_by: Vec<String> = Vec::new();
    if GROUPING_WORDS.iter().any(|w| words.contains(w)) {
        group_by.extend(
            mentioned
                .iter()
                .copied()
                .filter(|c| !is_numeric(*c))
                .map(|c| c.to_string()),
        );
    }
    if intent.category == IntentCategory::Trend {
        let time_column = mentioned
            .iter()
            .copied()
            .find(|c| schema.semantic_type(c) == Some(SemanticType::Datetime))
            .or_else(|| schema.columns_of(SemanticType::Datetime).first().copied());
        if let Some(column) = time_column {
            if !group_by.iter().any(|g| g == column) {
                group_by.insert(0, column.to_string());
            }
        }
    }

    let numeric_mentioned: Vec<String> = mentioned
        .iter()
        .copied()
        .filter(|c| is_numeric(*c))
        .map(|c| c.to_string())
        .collect();
    let targets: Vec<String> = if !numeric_mentioned.is_empty() {
        numeric_mentioned
    } else {
        let needs_measure = match function {
            Some(AggregateFunction::Count) => false,
            Some(_) => true,
            None => mentioned.is_empty() || !group_by.is_empty(),
        };
        match first_numeric {
            Some(column) if needs_measure => vec![column.to_string()],
            _ => Vec::new(),
        }
    };

    let aggregations: Vec<Aggregation> = match function {
        Some(AggregateFunction::Count) if targets.is_empty() => {
            vec![Aggregation::new(AggregateFunction::Count, None)]
        }
        Some(f) => targets
            .iter()
            .map(|t| Aggregation::new(f, Some(t.clone())))
            .collect(),
        None if !group_by.is_empty() => targets
            .iter()
            .map(|t| Aggregation::new(AggregateFunction::Sum, Some(t.clone())))
            .collect(),
        None => Vec::new(),
    };

    let mut required_columns: Vec<String> = Vec::new();
    for column in group_by
        .iter()
        .chain(targets.iter())
        .map(|s| s.as_str())
        .chain(mentioned.iter().copied())
    {
        if !required_columns.iter().any(|c| c == column) {
            required_columns.push(column.to_string());
        }
    }

    let descending = DESCENDING_WORDS.iter().any(|w| words.contains(w));
    let ascending = ASCENDING_WORDS.iter().any(|w| words.contains(w));
    let time_first = intent.category == IntentCategory::Trend
        && group_by
            .first()
            .is_some_and(|g| schema.semantic_type(g) == Some(SemanticType::Datetime));

    let sort_by = if time_first {
        group_by.first().map(|g| SortSpec {
            column: g.clone(),
            descending: false,
        })
    } else if descending || ascending {
        let column = aggregations
            .first()
            .map(|a| a.alias())
            .or_else(|| targets.first().cloned());
        column.map(|column| SortSpec {
            column,
            descending: descending && !ascending,
        })
    } else {
        None
    };

    let limit = words
        .windows(2)
        .find(|w| w[0] == "top" || w[0] == "bottom")
        .and_then(|w| w[1].parse::<usize>().ok());

    QueryRequirements {
        required_columns,
        filters: Vec::new(),
        aggregations,
        group_by_columns: group_by,
        time_range: None,
        sort_by,
        limit,
        validation_errors: Vec::new(),
        derived_by: Provenance::Rules,
    }
}

/// Lowercase, punctuation to spaces, padded with a space on each side.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn mentions(text: &str, keyword: &str) -> bool {
    match keyword.strip_suffix('*') {
        Some(stem) => text.contains(&format!(" {}", stem)),
        None => text.contains(&format!(" {} ", keyword)),
    }
}

fn mentions_column(text: &str, column: &str) -> bool {
    let name = normalize(column);
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    mentions(text, name) || mentions(text, &format!("{}s", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tabula_types::ColumnProfile;

    fn column(name: &str, ty: SemanticType) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            semantic_type: ty,
            declared_type: None,
            missing_pct: 0.0,
            unique_count: 4,
            sample_values: vec![],
            min: None,
            max: None,
            avg: None,
            stddev: None,
            earliest: None,
            latest: None,
        }
    }

    fn schema(columns: &[(&str, SemanticType)]) -> SchemaProfile {
        let mut map = IndexMap::new();
        for (name, ty) in columns {
            map.insert(name.to_string(), column(name, *ty));
        }
        SchemaProfile {
            columns: map,
            row_count: 10,
            derived_relationships: vec![],
            quality_score: 1.0,
        }
    }

    fn descriptive() -> IntentResult {
        IntentResult::new(IntentCategory::Descriptive, 0.9)
    }

    #[test]
    fn test_intent_keywords() {
        assert_eq!(classify_intent("Show sales over time").category, IntentCategory::Trend);
        assert_eq!(classify_intent("Why did revenue drop?").category, IntentCategory::Diagnostic);
        assert_eq!(classify_intent("East vs West").category, IntentCategory::Comparative);
        assert_eq!(classify_intent("Compare regions").category, IntentCategory::Comparative);
        assert_eq!(classify_intent("list the orders").category, IntentCategory::Descriptive);
    }

    #[test]
    fn test_rule_intent_is_marked() {
        let intent = classify_intent("monthly trend of sales");
        assert_eq!(intent.classified_by, Provenance::Rules);
        assert!(intent.needs_time_dimension);
    }

    #[test]
    fn test_total_sales_never_invents_grouping() {
        let schema = schema(&[("Sales", SemanticType::Numeric), ("Notes", SemanticType::Text)]);
        let req = extract_requirements("total sales", &descriptive(), &schema);
        assert!(req.group_by_columns.is_empty());
        assert_eq!(req.required_columns, vec!["Sales"]);
        assert_eq!(
            req.aggregations,
            vec![Aggregation::new(AggregateFunction::Sum, Some("Sales".into()))]
        );
    }

    #[test]
    fn test_group_by_named_column() {
        let schema = schema(&[
            ("region", SemanticType::Categorical),
            ("sales", SemanticType::Numeric),
        ]);
        let req = extract_requirements("average sales by region", &descriptive(), &schema);
        assert_eq!(req.group_by_columns, vec!["region"]);
        assert_eq!(req.aggregations[0].function, AggregateFunction::Avg);
    }

    #[test]
    fn test_first_numeric_when_nothing_named() {
        let schema = schema(&[
            ("region", SemanticType::Categorical),
            ("revenue", SemanticType::Numeric),
            ("cost", SemanticType::Numeric),
        ]);
        let req = extract_requirements("what is the sum", &descriptive(), &schema);
        assert_eq!(req.required_columns, vec!["revenue"]);
        assert!(req.group_by_columns.is_empty());
    }

    #[test]
    fn test_count_without_measure() {
        let schema = schema(&[("region", SemanticType::Categorical)]);
        let req = extract_requirements("how many orders per region", &descriptive(), &schema);
        assert_eq!(req.group_by_columns, vec!["region"]);
        assert_eq!(req.aggregations, vec![Aggregation::new(AggregateFunction::Count, None)]);
    }

    #[test]
    fn test_trend_groups_by_time() {
        let schema = schema(&[
            ("order_date", SemanticType::Datetime),
            ("sales", SemanticType::Numeric),
        ]);
        let intent = classify_intent("sales over time");
        let req = extract_requirements("sales over time", &intent, &schema);
        assert_eq!(req.group_by_columns, vec!["order_date"]);
        assert_eq!(req.sort_by.as_ref().map(|s| s.column.as_str()), Some("order_date"));
    }

    #[test]
    fn test_top_n() {
        let schema = schema(&[
            ("product", SemanticType::Categorical),
            ("sales", SemanticType::Numeric),
        ]);
        let req = extract_requirements("top 3 products by sales", &descriptive(), &schema);
        assert_eq!(req.limit, Some(3));
        let sort = req.sort_by.unwrap();
        assert_eq!(sort.column, "sum_sales");
        assert!(sort.descending);
    }
}
