// Compile selectors into SQL predicates over a queue table

use crate::entry::to_micros;
use crate::selector::Selector;
use rusqlite::types::Value;

/// Column a boundary predicate constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    CreationTime,
}

impl Column {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::CreationTime => "creation_time",
        }
    }
}

/// Upper end of a boundary predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upper {
    Inclusive(i64), // <=
    Exclusive(i64), // <
    Open,
}

/// Store-evaluable form of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `low <= column` plus the upper bound
    Range { column: Column, low: i64, upper: Upper },
    /// `matches(pattern, entry)`, evaluated by the registered regex function
    Matches(String),
}

impl From<&Selector> for Predicate {
    fn from(selector: &Selector) -> Self {
        match selector {
            Selector::IdPoint(id) => Predicate::Range {
                column: Column::Id,
                low: *id,
                upper: Upper::Inclusive(*id),
            },
            Selector::IdRange { low, high } => Predicate::Range {
                column: Column::Id,
                low: *low,
                upper: Upper::Inclusive(*high),
            },
            Selector::TimeRange { from, until } => Predicate::Range {
                column: Column::CreationTime,
                low: to_micros(*from),
                upper: until.map_or(Upper::Open, |t| Upper::Exclusive(to_micros(t))),
            },
            Selector::RelativeTimeFrom(from) => Predicate::Range {
                column: Column::CreationTime,
                low: to_micros(*from),
                upper: Upper::Open,
            },
            Selector::Pattern(pattern) => Predicate::Matches(pattern.clone()),
        }
    }
}

impl Predicate {
    /// WHERE-clause fragment with anonymous `?` placeholders, plus its parameters
    ///
    /// Fragments are parenthesized so they can be joined with `OR`/`AND`.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        match self {
            Predicate::Range { column, low, upper } => {
                let column = column.to_sql();
                match upper {
                    Upper::Inclusive(high) if high == low => {
                        (format!("({} = ?)", column), vec![Value::Integer(*low)])
                    }
                    Upper::Inclusive(high) => (
                        format!("({} >= ? AND {} <= ?)", column, column),
                        vec![Value::Integer(*low), Value::Integer(*high)],
                    ),
                    Upper::Exclusive(high) => (
                        format!("({} >= ? AND {} < ?)", column, column),
                        vec![Value::Integer(*low), Value::Integer(*high)],
                    ),
                    Upper::Open => (format!("({} >= ?)", column), vec![Value::Integer(*low)]),
                }
            }
            Predicate::Matches(pattern) => ("(matches(?, entry))".to_string(), vec![Value::Text(pattern.clone())]),
        }
    }
}

/// Join predicates into a single `OR` clause; `None` when there is nothing to join
pub fn any_of(predicates: &[Predicate]) -> Option<(String, Vec<Value>)> {
    if predicates.is_empty() {
        return None;
    }
    let mut clauses = Vec::with_capacity(predicates.len());
    let mut params = Vec::new();
    for predicate in predicates {
        let (sql, mut values) = predicate.to_sql();
        clauses.push(sql);
        params.append(&mut values);
    }
    Some((clauses.join(" OR "), params))
}
