//! Ordering and pagination options for `list`.
//!
//! # Invariants
//! - Direction is `DESC` only when spelled `desc` in any case; everything
//!   else sorts ascending.
//! - Non-positive or non-numeric `limit` falls back to the model page size;
//!   non-positive or non-numeric `offset` becomes 0.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Parses the compact `field:dir,field:dir` form.
///
/// Terms that do not split into exactly two parts are skipped.
pub fn parse_order(text: &str) -> Vec<OrderBy> {
    text.split(',')
        .filter_map(|term| {
            let parts: Vec<&str> = term.split(':').collect();
            match parts.as_slice() {
                [field, direction] if !field.trim().is_empty() => {
                    Some(OrderBy::new(field.trim(), Direction::parse(direction.trim())))
                }
                _ => None,
            }
        })
        .collect()
}

/// Options accepted by `list`.
///
/// Deserializes from JSON where `order` is either `[["id", "desc"], ...]` or
/// `"id:desc,..."`, and `limit`/`offset` are numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawListOptions")]
pub struct ListOptions {
    pub order: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy::new(field, direction));
        self
    }

    /// Appends terms parsed from the `field:dir` string form.
    pub fn order_str(mut self, text: &str) -> Self {
        self.order.extend(parse_order(text));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Effective `(offset, limit)` after defaulting.
    pub fn page(&self, default_limit: u32) -> (u64, u64) {
        let offset = match self.offset {
            Some(offset) if offset > 0 => offset.unsigned_abs(),
            _ => 0,
        };
        let limit = match self.limit {
            Some(limit) if limit > 0 => limit.unsigned_abs(),
            _ => u64::from(default_limit),
        };
        (offset, limit)
    }
}

#[derive(Deserialize)]
struct RawListOptions {
    #[serde(default)]
    order: Option<RawOrder>,
    #[serde(default)]
    limit: Option<Value>,
    #[serde(default)]
    offset: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrder {
    Text(String),
    Terms(Vec<Vec<String>>),
}

impl From<RawListOptions> for ListOptions {
    fn from(raw: RawListOptions) -> Self {
        let order = match raw.order {
            Some(RawOrder::Text(text)) => parse_order(&text),
            Some(RawOrder::Terms(terms)) => terms
                .into_iter()
                .filter_map(|term| {
                    let mut parts = term.into_iter();
                    let field = parts.next()?;
                    let direction = parts.next().map_or(Direction::Asc, |d| Direction::parse(&d));
                    Some(OrderBy::new(field, direction))
                })
                .collect(),
            None => Vec::new(),
        };
        Self {
            order,
            limit: raw.limit.as_ref().and_then(lenient_int),
            offset: raw.offset.as_ref().and_then(lenient_int),
        }
    }
}

fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|float| float.is_finite())
            .map(|float| float.trunc() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_order, Direction, ListOptions, OrderBy};
    use serde_json::json;

    #[test]
    fn direction_defaults_to_ascending() {
        assert_eq!(Direction::parse("DESC"), Direction::Desc);
        assert_eq!(Direction::parse("desc"), Direction::Desc);
        assert_eq!(Direction::parse("down"), Direction::Asc);
        assert_eq!(Direction::parse(""), Direction::Asc);
    }

    #[test]
    fn string_order_matches_pair_order() {
        let from_text: ListOptions =
            serde_json::from_value(json!({"order": "id:desc"})).expect("text order");
        let from_pairs: ListOptions =
            serde_json::from_value(json!({"order": [["id", "desc"]]})).expect("pair order");
        assert_eq!(from_text.order, from_pairs.order);
        assert_eq!(from_text.order, vec![OrderBy::new("id", Direction::Desc)]);
    }

    #[test]
    fn parse_order_skips_malformed_terms() {
        let order = parse_order("id:asc,broken,a:b:c,created_at:DESC");
        assert_eq!(
            order,
            vec![
                OrderBy::new("id", Direction::Asc),
                OrderBy::new("created_at", Direction::Desc),
            ]
        );
    }

    #[test]
    fn page_defaults_for_missing_or_non_positive_values() {
        assert_eq!(ListOptions::new().page(20), (0, 20));
        assert_eq!(ListOptions::new().offset(-3).limit(-1).page(20), (0, 20));
        assert_eq!(ListOptions::new().offset(10).limit(5).page(20), (10, 5));
    }

    #[test]
    fn zero_limit_falls_back_to_page_size() {
        assert_eq!(ListOptions::new().limit(0).page(20), (0, 20));
    }

    #[test]
    fn lenient_numbers_from_json() {
        let options: ListOptions =
            serde_json::from_value(json!({"limit": "5", "offset": 2.9})).expect("options");
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.offset, Some(2));

        let options: ListOptions =
            serde_json::from_value(json!({"limit": "many"})).expect("options");
        assert_eq!(options.page(7), (0, 7));

        let options: ListOptions = serde_json::from_value(json!({})).expect("empty options");
        assert_eq!(options, ListOptions::default());
    }
}
