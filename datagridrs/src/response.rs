//! Wire response of a table request and per-row decoration.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{ActionLink, ColumnDescriptor};
use crate::engine::StageFailure;
use crate::query_builder::columns::{is_row_index_column, ACTION_COLUMN};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").unwrap());

pub const ROW_ATTR_KEY: &str = "_row_attr";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub draw: i64,
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Diagnostics>,
}

impl TableResponse {
    /// The zeroed response every failure degrades to.
    pub fn empty(draw: i64) -> Self {
        Self {
            draw,
            ..Default::default()
        }
    }
}

/// Optional debug channel; only attached when the engine runs in debug mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub connection: Option<String>,
    pub failures: Vec<StageFailure>,
    /// Client column references that were ignored.
    pub dropped: Vec<String>,
    /// True when the declared connection failed its probe and another served.
    #[serde(default)]
    pub fell_back: bool,
    /// Connections that failed the probe before one answered, in probe order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_failures: Vec<ProbeFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub connection: String,
    pub message: String,
}

/// Adds the pseudo-columns and row attributes clients render.
pub struct RowDecorator<'a> {
    descriptor: &'a ColumnDescriptor,
    start: u64,
}

impl<'a> RowDecorator<'a> {
    pub fn new(descriptor: &'a ColumnDescriptor, start: u64) -> Self {
        Self { descriptor, start }
    }

    pub fn decorate(&self, rows: &mut [Map<String, Value>]) {
        let index_columns: Vec<&str> = self
            .descriptor
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| is_row_index_column(c))
            .collect();
        let wants_action = self.descriptor.exposes(ACTION_COLUMN);

        for (i, row) in rows.iter_mut().enumerate() {
            let ordinal = self.start + i as u64 + 1;
            for column in &index_columns {
                row.insert(column.to_string(), Value::from(ordinal));
            }
            if wants_action {
                let html = render_actions(&self.descriptor.actions, row);
                row.insert(ACTION_COLUMN.to_string(), Value::String(html));
            }
            if let Some(id) = row.get(&self.descriptor.identifier).filter(|v| !v.is_null()) {
                let mut attrs = Map::new();
                attrs.insert("data-id".to_string(), Value::String(cell_text(id)));
                row.insert(ROW_ATTR_KEY.to_string(), Value::Object(attrs));
            }
        }
    }
}

fn render_actions(actions: &[ActionLink], row: &Map<String, Value>) -> String {
    actions
        .iter()
        .map(|action| {
            let href = PLACEHOLDER.replace_all(&action.href, |caps: &Captures| {
                row.get(&caps[1]).map(cell_text).unwrap_or_default()
            });
            let class = action
                .class
                .as_deref()
                .map(|c| format!(" class=\"{}\"", escape_html(c)))
                .unwrap_or_default();
            format!(
                "<a href=\"{}\"{}>{}</a>",
                escape_html(&href),
                class,
                escape_html(&action.label)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
