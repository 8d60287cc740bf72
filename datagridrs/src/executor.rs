use std::future::Future;
use std::time::{Duration, Instant};

#[cfg(feature = "duckdb")]
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value};

use crate::backends::BackendConnection;
use crate::error::{DatagridError, Result};

/// Point in time after which no more database work is started for a request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: tokio::time::Instant,
}

impl Deadline {
    pub fn after_ms(ms: u64) -> Self {
        Self {
            at: tokio::time::Instant::now() + Duration::from_millis(ms),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(tokio::time::Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The lesser of `cap_ms` and the time left.
    pub fn budget(&self, cap_ms: u64) -> Duration {
        let remaining = self.remaining();
        if cap_ms == 0 {
            return remaining;
        }
        remaining.min(Duration::from_millis(cap_ms))
    }
}

/// Await `fut`, failing with [`DatagridError::Timeout`] once `budget` elapses.
pub async fn with_timeout<T, F>(budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(DatagridError::Timeout(budget.as_millis() as u64)),
    }
}

/// Execute `sql` on `conn` within `budget`, logging the elapsed time.
pub async fn run_sql(
    conn: &dyn BackendConnection,
    sql: &str,
    budget: Duration,
) -> Result<QueryResult> {
    let start = Instant::now();
    tracing::debug!(sql = %sql, budget_ms = budget.as_millis() as u64, "executing statement");
    let result = with_timeout(budget, conn.execute_sql(sql)).await;
    match &result {
        Ok(rows) => tracing::debug!(
            ms = start.elapsed().as_millis() as u64,
            rows = rows.rows.len(),
            "statement finished"
        ),
        Err(e) => tracing::warn!(
            ms = start.elapsed().as_millis() as u64,
            error = %e,
            "statement failed"
        ),
    }
    result
}

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    /// Read the single numeric cell of a `COUNT(*)` result.
    pub fn scalar_count(&self) -> Result<u64> {
        let row = self
            .rows
            .first()
            .ok_or_else(|| DatagridError::Execution("count returned no rows".to_string()))?;
        let value = row
            .values()
            .next()
            .ok_or_else(|| DatagridError::Execution("count returned no columns".to_string()))?;
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| DatagridError::Execution(format!("invalid count value {n}"))),
            Value::String(s) => s
                .parse::<u64>()
                .map_err(|e| DatagridError::Execution(format!("invalid count value {s}: {e}"))),
            other => Err(DatagridError::Execution(format!(
                "invalid count value {other}"
            ))),
        }
    }
}

#[cfg(feature = "duckdb")]
pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(i.to_string()),
        },
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        // Kept as text so the row formatter sees the exact digits.
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Timestamp(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(d) => Value::from(d),
        DuckValue::Time64(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::String(format!("{months} months {days} days {nanos} nanos")),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(duck_value_to_json).collect())
        }
        DuckValue::Enum(s) => Value::String(s),
        DuckValue::Struct(fields) => {
            let mut map = Map::new();
            for (key, val) in fields.iter() {
                map.insert(key.clone(), duck_value_to_json(val.clone()));
            }
            Value::Object(map)
        }
        DuckValue::Map(entries) => Value::Array(
            entries
                .iter()
                .map(|(k, v)| {
                    Value::Array(vec![
                        duck_value_to_json(k.clone()),
                        duck_value_to_json(v.clone()),
                    ])
                })
                .collect(),
        ),
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}
