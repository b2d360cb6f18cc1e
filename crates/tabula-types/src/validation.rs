//! Plan validation - make sure generated output is safe to run.
//!
//! These checks are deterministic and cheap. They run before anything is
//! handed to the query engine.

use crate::{AnalysisPlan, QueryRequirements, SchemaProfile};
use thiserror::Error;

/// Statements a generated query must never contain.
pub const FORBIDDEN_KEYWORDS: [&str; 6] = ["DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE"];

/// Modules an embedded snippet may not import or reference.
const FORBIDDEN_MODULES: [&str; 3] = ["os", "sys", "subprocess"];

/// Calls an embedded snippet may not make.
const FORBIDDEN_CALLS: [&str; 3] = ["eval(", "exec(", "open("];

/// Validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("forbidden keyword in SQL: {0}")]
    ForbiddenKeyword(&'static str),

    #[error("empty SQL query")]
    EmptySql,

    #[error("dangerous code in snippet: {0}")]
    DangerousCode(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// Reject SQL containing a forbidden keyword anywhere, in any case, then
/// reject empty SQL.
pub fn check_sql_safety(sql: &str) -> Result<(), ValidationError> {
    let upper = sql.to_ascii_uppercase();
    if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| upper.contains(*k)) {
        return Err(ValidationError::ForbiddenKeyword(*keyword));
    }
    if sql.trim().trim_end_matches(';').trim().is_empty() {
        return Err(ValidationError::EmptySql);
    }
    Ok(())
}

/// Screen an embedded post-processing snippet. It is never executed.
pub fn check_snippet(code: &str) -> Result<(), ValidationError> {
    let identifiers = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty());
    for token in identifiers {
        if FORBIDDEN_MODULES.contains(&token) {
            return Err(ValidationError::DangerousCode(token.to_string()));
        }
    }
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(call) = FORBIDDEN_CALLS.iter().find(|c| compact.contains(*c)) {
        return Err(ValidationError::DangerousCode(call.to_string()));
    }
    Ok(())
}

/// Validate a plan: forbidden keywords, then non-empty SQL, then the
/// embedded snippet. Stops at the first failure.
pub fn validate_plan(plan: &AnalysisPlan) -> Result<(), ValidationError> {
    check_sql_safety(&plan.sql_query)?;
    for supporting in &plan.supporting_queries {
        check_sql_safety(&supporting.sql)?;
    }
    if let Some(code) = &plan.python_code {
        check_snippet(code)?;
    }
    Ok(())
}

/// Drop every column reference that does not exist in `schema`.
///
/// Surviving references are rewritten to the canonical column name; dropped
/// ones are recorded in `validation_errors`.
pub fn ground_requirements(req: &mut QueryRequirements, schema: &SchemaProfile) {
    let mut errors = Vec::new();
    let resolve = |name: &str, errors: &mut Vec<String>| -> Option<String> {
        match schema.resolve_column(name) {
            Some(canonical) => Some(canonical.to_string()),
            None => {
                errors.push(ValidationError::UnknownColumn(name.to_string()).to_string());
                None
            }
        }
    };

    let mut required = Vec::new();
    for column in &req.required_columns {
        if let Some(c) = resolve(column, &mut errors) {
            if !required.contains(&c) {
                required.push(c);
            }
        }
    }
    req.required_columns = required;

    let mut group_by = Vec::new();
    for column in &req.group_by_columns {
        if let Some(c) = resolve(column, &mut errors) {
            if !group_by.contains(&c) {
                group_by.push(c);
            }
        }
    }
    req.group_by_columns = group_by;

    let filters = std::mem::take(&mut req.filters);
    req.filters = filters
        .into_iter()
        .filter_map(|mut f| {
            let c = resolve(&f.column, &mut errors)?;
            f.column = c;
            Some(f)
        })
        .collect();

    let aggregations = std::mem::take(&mut req.aggregations);
    req.aggregations = aggregations
        .into_iter()
        .filter_map(|mut agg| {
            if let Some(column) = &agg.column {
                agg.column = Some(resolve(column, &mut errors)?);
            }
            Some(agg)
        })
        .collect();

    if let Some(mut range) = req.time_range.take() {
        if let Some(c) = resolve(&range.column, &mut errors) {
            range.column = c;
            req.time_range = Some(range);
        }
    }

    // Sorting may target an aggregate alias instead of a column.
    if let Some(mut sort) = req.sort_by.take() {
        let alias = req
            .aggregations
            .iter()
            .map(|a| a.alias())
            .find(|a| a.eq_ignore_ascii_case(&sort.column));
        if let Some(alias) = alias {
            sort.column = alias;
            req.sort_by = Some(sort);
        } else if let Some(c) = resolve(&sort.column, &mut errors) {
            sort.column = c;
            req.sort_by = Some(sort);
        }
    }

    req.validation_errors.extend(errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AggregateFunction, Aggregation, ColumnProfile, SemanticType, SortSpec, SupportingQuery,
    };
    use indexmap::IndexMap;

    fn schema(names: &[&str]) -> SchemaProfile {
        let mut columns = IndexMap::new();
        for name in names {
            columns.insert(
                name.to_string(),
                ColumnProfile {
                    name: name.to_string(),
                    semantic_type: SemanticType::Numeric,
                    declared_type: None,
                    missing_pct: 0.0,
                    unique_count: 1,
                    sample_values: vec![],
                    min: None,
                    max: None,
                    avg: None,
                    stddev: None,
                    earliest: None,
                    latest: None,
                },
            );
        }
        SchemaProfile {
            columns,
            row_count: 1,
            derived_relationships: vec![],
            quality_score: 1.0,
        }
    }

    #[test]
    fn test_forbidden_keywords_any_case() {
        for sql in [
            "drop table data",
            "SELECT 1; DELETE FROM data",
            "insert into data values (1)",
            "UpDaTe data SET x = 1",
            "alter table data add column y",
            "truncate data",
        ] {
            assert!(matches!(
                check_sql_safety(sql),
                Err(ValidationError::ForbiddenKeyword(_))
            ));
        }
        assert!(check_sql_safety("SELECT SUM(sales) FROM data").is_ok());
    }

    #[test]
    fn test_keyword_checked_before_emptiness() {
        assert_eq!(check_sql_safety("  ;  "), Err(ValidationError::EmptySql));
        assert_eq!(
            check_sql_safety("drop"),
            Err(ValidationError::ForbiddenKeyword("DROP"))
        );
    }

    #[test]
    fn test_snippet_screening() {
        assert!(check_snippet("import os\nos.listdir('.')").is_err());
        assert!(check_snippet("from subprocess import run").is_err());
        assert!(check_snippet("x = eval ('1+1')").is_err());
        assert!(check_snippet("f = open('a.txt')").is_err());
        assert!(check_snippet("df['cost'] = df['sales'] * 0.2").is_ok());
        // Substrings of longer identifiers are fine
        assert!(check_snippet("positions = sysadmin_count").is_ok());
    }

    #[test]
    fn test_validate_plan_short_circuits() {
        let mut plan = AnalysisPlan::draft("DELETE FROM data", vec![]);
        plan.python_code = Some("import os".into());
        assert!(matches!(
            validate_plan(&plan),
            Err(ValidationError::ForbiddenKeyword("DELETE"))
        ));

        let mut plan = AnalysisPlan::draft("SELECT 1", vec![]);
        plan.supporting_queries.push(SupportingQuery {
            name: "cleanup".into(),
            sql: "DROP TABLE data".into(),
        });
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn test_ground_requirements_strips_unknown() {
        let schema = schema(&["Sales", "Region"]);
        let mut req = QueryRequirements {
            required_columns: vec!["sales".into(), "revenue".into()],
            group_by_columns: vec!["region".into(), "country".into()],
            aggregations: vec![
                Aggregation::new(AggregateFunction::Sum, Some("sales".into())),
                Aggregation::new(AggregateFunction::Avg, Some("profit".into())),
            ],
            sort_by: Some(SortSpec {
                column: "sum_sales".into(),
                descending: true,
            }),
            ..Default::default()
        };

        ground_requirements(&mut req, &schema);

        assert_eq!(req.required_columns, vec!["Sales"]);
        assert_eq!(req.group_by_columns, vec!["Region"]);
        assert_eq!(req.aggregations.len(), 1);
        assert_eq!(req.sort_by.as_ref().map(|s| s.column.as_str()), Some("sum_sales"));
        assert_eq!(req.validation_errors.len(), 3);
    }
}
