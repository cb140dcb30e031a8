use serde_json::Value;
use uuid::Uuid;

use super::{validate_field_name, Document, StoreError, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value exactly.
    Eq(String, Value),
    /// Case-insensitive substring match on a string field.
    Contains(String, String),
    /// Inclusive numeric range; either bound may be open.
    Range { field: String, min: Option<f64>, max: Option<f64> },
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(field.into(), value.into())
    }

    pub fn field(&self) -> &str {
        match self {
            Condition::Eq(field, _) | Condition::Contains(field, _) => field,
            Condition::Range { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Condition::Eq(field, expected) => doc.get(field).map_or(false, |v| values_equal(v, expected)),
            Condition::Contains(field, needle) => doc
                .get(field)
                .and_then(Value::as_str)
                .map_or(false, |s| s.to_lowercase().contains(&needle.to_lowercase())),
            Condition::Range { field, min, max } => match doc.get(field).and_then(Value::as_f64) {
                Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                None => false,
            },
        }
    }
}

/// Selection over a collection: an optional id plus conjunctive conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocFilter {
    pub id: Option<Uuid>,
    pub conditions: Vec<Condition>,
}

impl DocFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self { id: Some(id), conditions: vec![] }
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::eq(field, value))
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for condition in &self.conditions {
            validate_field_name(condition.field())?;
        }
        Ok(())
    }

    pub fn matches(&self, id: &Uuid, doc: &Document) -> bool {
        self.id.map_or(true, |wanted| &wanted == id) && self.conditions.iter().all(|c| c.matches(doc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }

    /// Parse `"price desc, title"` style sort strings. Unknown directions sort ascending.
    pub fn parse_list(raw: &str) -> Vec<SortKey> {
        let mut out = Vec::new();
        for part in raw.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let dir = it.next().unwrap_or("asc");
                let direction = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                out.push(SortKey { field: col.to_string(), direction });
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl FindOptions {
    pub fn sorted(sort: Vec<SortKey>) -> Self {
        Self { sort, ..Default::default() }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for key in &self.sort {
            if key.field != ID_FIELD {
                validate_field_name(&key.field)?;
            }
        }
        Ok(())
    }
}

/// Numbers compare by value so `1` and `1.0` are equal, as in the JSONB backend.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering used when sorting documents: missing/null first, then booleans,
/// numbers, strings; other kinds compare equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn parse_sort_list() {
        let keys = SortKey::parse_list("price desc, title ,  createdAt ASC");
        assert_eq!(
            keys,
            vec![SortKey::desc("price"), SortKey::asc("title"), SortKey::asc("createdAt")]
        );
        assert!(SortKey::parse_list(" , ").is_empty());
    }

    #[test]
    fn conditions_match_documents() {
        let course = doc(json!({"title": "Rust for Pythonistas", "price": 49.5, "category": "dev"}));

        assert!(Condition::eq("category", "dev").matches(&course));
        assert!(!Condition::eq("category", "Dev").matches(&course));
        assert!(!Condition::eq("missing", "dev").matches(&course));
        assert!(Condition::Contains("title".into(), "RUST".into()).matches(&course));
        assert!(!Condition::Contains("price".into(), "49".into()).matches(&course));
        assert!(Condition::Range { field: "price".into(), min: Some(10.0), max: Some(49.5) }.matches(&course));
        assert!(!Condition::Range { field: "price".into(), min: Some(50.0), max: None }.matches(&course));
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn filter_checks_id_and_conditions() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let d = doc(json!({"enrolled_by": "a@x.com"}));
        let filter = DocFilter::by_id(id).with_eq("enrolled_by", "a@x.com");

        assert!(filter.matches(&id, &d));
        assert!(!filter.matches(&other, &d));
        assert!(!DocFilter::by_id(id).with_eq("enrolled_by", "b@x.com").matches(&id, &d));
    }

    #[test]
    fn invalid_field_names_are_rejected() {
        let filter = DocFilter::new().with_eq("title'; DROP TABLE courses; --", "x");
        assert!(matches!(filter.validate(), Err(StoreError::InvalidField(_))));

        let options = FindOptions::sorted(vec![SortKey::asc("price desc")]);
        assert!(options.validate().is_err());
        assert!(FindOptions::sorted(vec![SortKey::asc(ID_FIELD)]).validate().is_ok());
    }

    #[test]
    fn compare_orders_missing_first() {
        use std::cmp::Ordering;
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
    }
}
