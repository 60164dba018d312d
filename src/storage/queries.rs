//! SQL query builders.
//!
//! Generates PostgreSQL statements for the submissions table. Execution is
//! left to the host's driver; nested enrichment objects are JSONB columns
//! addressed with `->>`.

use super::filter::{Aggregate, Condition, Field, FieldValue, Filter, GroupKey, Pagination, SortKey};
use super::models::SubmissionPatch;

pub const SUBMISSIONS_TABLE: &str = "submissions";

/// A statement plus its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

/// Get the insertable columns of the submissions table, in bind order.
pub fn get_submission_columns() -> Vec<&'static str> {
    vec![
        // Contact
        "fname",
        "lname",
        "email",
        "phone",
        "state",
        "age",
        "beneficiary",
        // Technical
        "ip_address",
        "user_agent",
        "geolocation",
        "browser_info",
        "os_info",
        "device_info",
        // Provenance
        "trusted_form_cert_url",
        "case_type",
        "ownerid",
        "campaign",
        "offer_url",
        "referrer",
        "submission_date",
        // Workflow
        "status",
        "quality_score",
    ]
}

/// SQL expression for a field.
pub fn column_expr(field: Field) -> &'static str {
    match field {
        Field::GeoCountry => "geolocation->>'country'",
        Field::GeoRegion => "geolocation->>'region'",
        Field::GeoCity => "geolocation->>'city'",
        Field::GeoZip => "geolocation->>'zip'",
        Field::GeoLatitude => "(geolocation->>'latitude')::float8",
        Field::GeoLongitude => "(geolocation->>'longitude')::float8",
        Field::BrowserFamily => "browser_info->>'family'",
        Field::OsFamily => "os_info->>'family'",
        Field::DeviceType => "device_info->>'type'",
        other => other.name(),
    }
}

fn group_expr(key: &GroupKey) -> &'static str {
    match key {
        GroupKey::Field(field) => column_expr(*field),
        GroupKey::SubmissionDay => "DATE(submission_date)",
    }
}

/// Build INSERT for one submission, returning the generated id.
pub fn build_submission_insert() -> String {
    let columns = get_submission_columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    format!(
        "INSERT INTO {} ({}, created_at, updated_at) VALUES ({}, NOW(), NOW()) RETURNING id",
        SUBMISSIONS_TABLE,
        columns.join(", "),
        placeholders.join(", ")
    )
}

struct WhereBuilder {
    params: Vec<FieldValue>,
}

impl WhereBuilder {
    fn bind(&mut self, value: &FieldValue) -> String {
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Eq(field, FieldValue::Null) => format!("{} IS NULL", column_expr(*field)),
            Condition::Eq(field, value) => format!("{} = {}", column_expr(*field), self.bind(value)),
            Condition::NotEq(field, value) => {
                format!("{} != {}", column_expr(*field), self.bind(value))
            }
            Condition::In(_, values) if values.is_empty() => "FALSE".to_string(),
            Condition::In(field, values) => {
                let placeholders: Vec<String> = values.iter().map(|v| self.bind(v)).collect();
                format!("{} IN ({})", column_expr(*field), placeholders.join(", "))
            }
            Condition::Gte(field, value) => {
                format!("{} >= {}", column_expr(*field), self.bind(value))
            }
            Condition::Lte(field, value) => {
                format!("{} <= {}", column_expr(*field), self.bind(value))
            }
            Condition::ContainsCi(field, needle) => {
                let pattern = FieldValue::Text(format!("%{}%", escape_like(needle)));
                format!("{} ILIKE {}", column_expr(*field), self.bind(&pattern))
            }
            Condition::AnyOf(inner) if inner.is_empty() => "FALSE".to_string(),
            Condition::AnyOf(inner) => {
                let parts: Vec<String> = inner.iter().map(|c| self.condition(c)).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }

    fn clause(&mut self, filter: &Filter) -> String {
        if filter.conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = filter.conditions.iter().map(|c| self.condition(c)).collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn order_clause(sort: &[SortKey]) -> String {
    let mut parts: Vec<String> = sort
        .iter()
        .map(|k| format!("{} {}", column_expr(k.field), k.direction.as_sql()))
        .collect();
    parts.push("id ASC".to_string());
    format!(" ORDER BY {}", parts.join(", "))
}

/// Build SELECT for `find_many`.
pub fn build_select(filter: &Filter, sort: &[SortKey], pagination: Option<Pagination>) -> BuiltQuery {
    let mut builder = WhereBuilder { params: Vec::new() };
    let mut sql = format!("SELECT * FROM {}", SUBMISSIONS_TABLE);
    sql.push_str(&builder.clause(filter));
    sql.push_str(&order_clause(sort));
    if let Some(p) = pagination {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", p.limit, p.offset));
    }
    BuiltQuery {
        sql,
        params: builder.params,
    }
}

/// Build COUNT(*).
pub fn build_count(filter: &Filter) -> BuiltQuery {
    let mut builder = WhereBuilder { params: Vec::new() };
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        SUBMISSIONS_TABLE,
        builder.clause(filter)
    );
    BuiltQuery {
        sql,
        params: builder.params,
    }
}

/// Build a GROUP BY aggregate. Output columns are the group keys followed by
/// `count` and, when requested, `avg_quality`.
pub fn build_group_query(filter: &Filter, group_by: &[GroupKey], aggregates: &[Aggregate]) -> BuiltQuery {
    let mut builder = WhereBuilder { params: Vec::new() };
    let keys: Vec<&str> = group_by.iter().map(group_expr).collect();

    let mut select: Vec<String> = keys
        .iter()
        .enumerate()
        .map(|(i, expr)| format!("{} AS k{}", expr, i))
        .collect();
    select.push("COUNT(id) AS count".to_string());
    if aggregates.contains(&Aggregate::AvgQualityScore) {
        select.push("AVG(quality_score) AS avg_quality".to_string());
    }

    let mut sql = format!("SELECT {} FROM {}", select.join(", "), SUBMISSIONS_TABLE);
    sql.push_str(&builder.clause(filter));
    if !keys.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", keys.join(", ")));
    }
    BuiltQuery {
        sql,
        params: builder.params,
    }
}

/// Build UPDATE for a patch. Returns `None` when the patch sets nothing.
pub fn build_update(filter: &Filter, patch: &SubmissionPatch) -> Option<BuiltQuery> {
    let mut builder = WhereBuilder { params: Vec::new() };
    let mut sets = Vec::new();

    if let Some(status) = patch.status {
        sets.push(format!("status = {}", builder.bind(&status.as_str().into())));
    }
    if let Some(score) = patch.quality_score {
        sets.push(format!("quality_score = {}", builder.bind(&i64::from(score).into())));
    }
    if let Some(campaign) = &patch.campaign {
        sets.push(format!("campaign = {}", builder.bind(&campaign.as_str().into())));
    }
    if let Some(case_type) = &patch.case_type {
        sets.push(format!("case_type = {}", builder.bind(&case_type.as_str().into())));
    }
    if let Some(ownerid) = &patch.ownerid {
        sets.push(format!("ownerid = {}", builder.bind(&ownerid.as_str().into())));
    }
    if sets.is_empty() {
        return None;
    }
    sets.push("updated_at = NOW()".to_string());

    let mut sql = format!("UPDATE {} SET {}", SUBMISSIONS_TABLE, sets.join(", "));
    sql.push_str(&builder.clause(filter));
    Some(BuiltQuery {
        sql,
        params: builder.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::Status;

    #[test]
    fn test_submission_insert_query() {
        let query = build_submission_insert();
        assert!(query.starts_with("INSERT INTO submissions"));
        assert!(query.contains("$22"));
        assert!(query.ends_with("RETURNING id"));
    }

    #[test]
    fn test_column_count() {
        assert_eq!(get_submission_columns().len(), 22);
    }

    #[test]
    fn test_select_with_search_and_nested_fields() {
        let filter = Filter::all()
            .and(Condition::AnyOf(vec![
                Condition::ContainsCi(Field::FirstName, "ann".to_string()),
                Condition::ContainsCi(Field::GeoCity, "ann".to_string()),
            ]))
            .and(Condition::Eq(Field::GeoCountry, "US".into()));
        let query = build_select(
            &filter,
            &[SortKey::desc(Field::SubmissionDate)],
            Some(Pagination::page(2, 20)),
        );
        assert_eq!(
            query.sql,
            "SELECT * FROM submissions WHERE (fname ILIKE $1 OR geolocation->>'city' ILIKE $2) \
             AND geolocation->>'country' = $3 ORDER BY submission_date DESC, id ASC LIMIT 20 OFFSET 20"
        );
        assert_eq!(query.params.len(), 3);
        assert_eq!(query.params[0].as_str(), Some("%ann%"));
    }

    #[test]
    fn test_like_pattern_is_escaped() {
        let filter = Filter::all().and(Condition::ContainsCi(Field::Email, "50%_off".to_string()));
        let query = build_count(&filter);
        assert_eq!(query.params[0].as_str(), Some("%50\\%\\_off%"));
    }

    #[test]
    fn test_group_query() {
        let query = build_group_query(
            &Filter::all(),
            &[GroupKey::SubmissionDay],
            &[Aggregate::Count],
        );
        assert_eq!(
            query.sql,
            "SELECT DATE(submission_date) AS k0, COUNT(id) AS count FROM submissions GROUP BY DATE(submission_date)"
        );
    }

    #[test]
    fn test_update_query() {
        let query = build_update(&Filter::all().ids(&[1, 2]), &SubmissionPatch::status(Status::Rejected))
            .expect("non-empty patch");
        assert_eq!(
            query.sql,
            "UPDATE submissions SET status = $1, updated_at = NOW() WHERE id IN ($2, $3)"
        );
        assert!(build_update(&Filter::all(), &SubmissionPatch::default()).is_none());
    }
}
