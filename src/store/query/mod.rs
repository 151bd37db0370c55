use serde_json::Value;
use std::cmp::Ordering;

use crate::models::{parse_timestamp, scalar_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gte,
    Lte,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gte => "gte",
            Self::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: Op,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// A select against one table: conjunctive filters, an optional sort and an
/// optional row cap applied after sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    fn filter(mut self, column: &str, op: Op, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, Op::Eq, value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, Op::Gte, value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, Op::Lte, value)
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query-string pairs: `select=*`, `col=op.value`, `order=col.dir`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for f in &self.filters {
            params.push((f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)));
        }
        if let Some(order) = &self.order {
            let dir = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Whether a row satisfies every filter. Missing or null columns never match.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| {
            let Some(cell) = row.get(&f.column).and_then(scalar_string) else {
                return false;
            };
            let ord = compare_cells(&cell, &f.value);
            match f.op {
                Op::Eq => ord == Ordering::Equal,
                Op::Gte => ord != Ordering::Less,
                Op::Lte => ord != Ordering::Greater,
            }
        })
    }

    /// Filter, stable-sort and cap rows the way the store would.
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut out: Vec<Value> = rows.iter().filter(|r| self.matches(r)).cloned().collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare_columns(a, b, &order.column);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Numeric comparison when both sides are numbers, instant comparison when
/// both are timestamps, string comparison otherwise.
pub(crate) fn compare_cells(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (parse_timestamp(a), parse_timestamp(b)) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

fn compare_columns(a: &Value, b: &Value, column: &str) -> Ordering {
    let left = a.get(column).and_then(scalar_string);
    let right = b.get(column).and_then(scalar_string);
    match (left, right) {
        (Some(x), Some(y)) => compare_cells(&x, &y),
        // Nulls sort last, like PostgreSQL's default for ascending order
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
