//! Query description and in-process evaluation
//!
//! Queries are equality filters, an optional ancestor, and ordering.
//! Fetch options add a limit plus either a projection or keys-only results.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{BenchError, BenchResult};
use crate::model::{Entity, Key, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub ancestor: Option<Key>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
}

impl Query {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ancestor: None,
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::KIND)
    }

    pub fn filter(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            property: property.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn ancestor(mut self, key: Key) -> Self {
        self.ancestor = Some(key);
        self
    }

    pub fn order(mut self, property: &str) -> Self {
        self.order.push(Order {
            property: property.to_string(),
            direction: Direction::Ascending,
        });
        self
    }

    pub fn order_desc(mut self, property: &str) -> Self {
        self.order.push(Order {
            property: property.to_string(),
            direction: Direction::Descending,
        });
        self
    }

    /// Whether a record satisfies the kind, ancestor and every filter
    pub fn matches(&self, record: &Record) -> bool {
        if record.kind() != self.kind {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !record.key.has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|f| property_equals(record.get(&f.property), &f.value))
    }

    /// Compare two records by this query's ordering
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for order in &self.order {
            let ord = compare_values(a.get(&order.property), b.get(&order.property));
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Evaluate against an in-memory set of records
    pub fn evaluate<'a, I>(&self, records: I, options: &FetchOptions) -> BenchResult<Vec<Record>>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        options.validate()?;

        let mut matched: Vec<&Record> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .filter(|r| options.projection.iter().all(|p| r.get(p).is_some()))
            .collect();

        if !self.order.is_empty() {
            // Stable, so equal records keep key order
            matched.sort_by(|a, b| self.compare(a, b));
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }

        Ok(matched.into_iter().map(|r| options.shape(r)).collect())
    }

    /// Number of matching records, capped by `limit`
    pub fn count<'a, I>(&self, records: I, limit: Option<usize>) -> usize
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let count = records.into_iter().filter(|r| self.matches(r)).count();
        match limit {
            Some(limit) => count.min(limit),
            None => count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub limit: Option<usize>,
    /// Properties to return; records lacking any of them are skipped
    pub projection: Vec<String>,
    pub keys_only: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, properties: &[&str]) -> Self {
        self.projection = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.keys_only && !self.projection.is_empty() {
            return Err(BenchError::InvalidQuery(
                "keys_only and projection are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Cut a full record down to what these options return
    pub fn shape(&self, record: &Record) -> Record {
        if self.keys_only {
            return Record::new(record.key.clone(), Map::new());
        }
        if self.projection.is_empty() {
            return record.clone();
        }
        let properties = self
            .projection
            .iter()
            .filter_map(|p| record.get(p).map(|v| (p.clone(), v.clone())))
            .collect();
        Record::new(record.key.clone(), properties)
    }
}

/// Equality as the datastore applies it: a repeated property matches when
/// any element equals the value
pub fn property_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => false,
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|v| v == expected),
        Some(value) => numbers_equal(value, expected).unwrap_or(value == expected),
    }
}

fn numbers_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(x.as_f64()? == y.as_f64()?),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SomeData;
    use serde_json::json;

    fn record(id: i64, props: Value) -> Record {
        let key = Key::with_id("SomeData", id).child_of(SomeData::parent_key());
        Record::new(key, props.as_object().cloned().unwrap())
    }

    fn sample() -> Vec<Record> {
        vec![
            record(1, json!({"prop0": "c", "prop1": "x", "flag": true})),
            record(2, json!({"prop0": "a", "prop1": "y", "flag": false})),
            record(3, json!({"prop0": "b", "flag": true})),
            record(4, json!({"prop1": "z", "flag": true})),
        ]
    }

    #[test]
    fn test_equality_filter_and_ancestor() {
        let records = sample();
        let query = Query::for_entity::<SomeData>()
            .filter("flag", true)
            .ancestor(SomeData::parent_key());

        assert_eq!(query.count(&records, None), 3);
        assert_eq!(query.count(&records, Some(2)), 2);

        let other_parent = Query::new("SomeData").ancestor(Key::named("SomeData", "other"));
        assert_eq!(other_parent.count(&records, None), 0);
    }

    #[test]
    fn test_kind_must_match() {
        let records = sample();
        assert_eq!(Query::new("Something").count(&records, None), 0);
    }

    #[test]
    fn test_order_puts_missing_first() {
        let records = sample();
        let results = Query::new("SomeData")
            .order("prop0")
            .evaluate(&records, &FetchOptions::new())
            .unwrap();
        let ids: Vec<String> = results.iter().map(|r| r.key.path()).collect();
        assert_eq!(
            ids,
            vec![
                "SomeData:default/SomeData:4",
                "SomeData:default/SomeData:2",
                "SomeData:default/SomeData:3",
                "SomeData:default/SomeData:1",
            ]
        );

        let desc = Query::new("SomeData")
            .order_desc("prop0")
            .evaluate(&records, &FetchOptions::new().limit(1))
            .unwrap();
        assert_eq!(desc[0].get("prop0"), Some(&json!("c")));
    }

    #[test]
    fn test_projection_drops_records_missing_properties() {
        let records = sample();
        let results = Query::new("SomeData")
            .filter("flag", true)
            .order("prop0")
            .evaluate(&records, &FetchOptions::new().projection(&["prop0", "prop1"]))
            .unwrap();

        // Only record 1 has both prop0 and prop1 among flagged records
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].properties.len(), 2);
        assert!(results[0].get("flag").is_none());
    }

    #[test]
    fn test_keys_only() {
        let records = sample();
        let results = Query::new("SomeData")
            .evaluate(&records, &FetchOptions::new().keys_only())
            .unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.properties.is_empty()));

        let bad = FetchOptions::new().keys_only().projection(&["prop0"]);
        assert!(Query::new("SomeData").evaluate(&records, &bad).is_err());
    }

    #[test]
    fn test_repeated_property_equality() {
        let tags = json!(["a", "b"]);
        assert!(property_equals(Some(&tags), &json!("b")));
        assert!(!property_equals(Some(&tags), &json!("c")));
        assert!(property_equals(Some(&tags), &json!(["a", "b"])));
        assert!(property_equals(Some(&json!(2)), &json!(2.0)));
        assert!(!property_equals(None, &json!(null)));
    }

    #[test]
    fn test_compare_values_ranks_types() {
        assert_eq!(compare_values(None, Some(&json!(null))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(false)), Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(10)), Some(&json!(9.5))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(1)), Some(&json!("a"))), Ordering::Less);
    }
}
