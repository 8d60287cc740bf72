//! Decoding of DataTables-style table requests.
//!
//! GET query strings and POST form bodies arrive as already URL-decoded
//! key/value pairs in bracket notation (`columns[0][search][value]=x`).
//! POST JSON bodies are flattened into the same pairs, so every transport
//! goes through [`RequestParams::from_pairs`] and decodes identically.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{DatagridError, Result};
use crate::sql_ast::SortDirection;

/// Keys that never become dynamic filters.
pub const RESERVED_KEYS: &[&str] = &[
    "draw", "start", "length", "search", "columns", "order", "difta", "_token", "_", "page",
];

/// Column indices above this are ignored to bound allocation.
const MAX_COLUMNS: usize = 512;
const MAX_ORDER_SPECS: usize = 64;
const MAX_JSON_DEPTH: usize = 8;
const DEFAULT_LENGTH: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParam {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnParam {
    pub data: String,
    pub name: String,
    pub searchable: bool,
    pub orderable: bool,
    pub search: SearchParam,
}

impl Default for ColumnParam {
    fn default() -> Self {
        Self {
            data: String::new(),
            name: String::new(),
            searchable: true,
            orderable: true,
            search: SearchParam::default(),
        }
    }
}

impl ColumnParam {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Server-side column reference: `name` when given, else `data`.
    pub fn column_ref(&self) -> &str {
        if self.name.trim().is_empty() {
            self.data.trim()
        } else {
            self.name.trim()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderParam {
    pub column: usize,
    pub dir: SortDirection,
}

/// Identifies the logical table a request targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableHint {
    pub name: String,
    pub source: String,
}

/// One observation of a dynamic filter key. Repeated keys produce several
/// entries; `field[]` keys produce a single multi-valued entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub field: String,
    pub values: Vec<String>,
    pub multi: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub draw: i64,
    pub start: u64,
    /// Page size; `-1` means all rows.
    pub length: i64,
    pub search: SearchParam,
    pub columns: Vec<ColumnParam>,
    pub order: Vec<OrderParam>,
    pub difta: Option<TableHint>,
    pub filters: Vec<FilterEntry>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            draw: 0,
            start: 0,
            length: DEFAULT_LENGTH,
            search: SearchParam::default(),
            columns: Vec::new(),
            order: Vec::new(),
            difta: None,
            filters: Vec::new(),
        }
    }
}

impl RequestParams {
    /// Decode URL-decoded key/value pairs from a query string or form body.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = RequestParams::default();
        let mut columns: BTreeMap<usize, ColumnParam> = BTreeMap::new();
        let mut order: BTreeMap<usize, (Option<usize>, SortDirection)> = BTreeMap::new();

        for (key, value) in pairs {
            let value = value.as_ref();
            let path = key_path(key.as_ref());
            let Some((&root, rest)) = path.split_first() else {
                continue;
            };
            match (root, rest) {
                ("draw", []) => params.draw = value.trim().parse().unwrap_or(0),
                ("start", []) => params.start = value.trim().parse::<i64>().unwrap_or(0).max(0) as u64,
                ("length", []) => {
                    params.length = value.trim().parse().unwrap_or(DEFAULT_LENGTH);
                }
                ("search", ["value"]) => params.search.value = value.to_string(),
                ("columns", [idx, field @ ..]) => {
                    let Some(idx) = parse_index(idx, MAX_COLUMNS) else {
                        continue;
                    };
                    let column = columns.entry(idx).or_default();
                    match field {
                        ["data"] => column.data = value.to_string(),
                        ["name"] => column.name = value.to_string(),
                        ["searchable"] => column.searchable = parse_bool(value, true),
                        ["orderable"] => column.orderable = parse_bool(value, true),
                        ["search", "value"] => column.search.value = value.to_string(),
                        _ => {}
                    }
                }
                ("order", [idx, field]) => {
                    let Some(idx) = parse_index(idx, MAX_ORDER_SPECS) else {
                        continue;
                    };
                    let entry = order.entry(idx).or_insert((None, SortDirection::Asc));
                    match *field {
                        "column" => entry.0 = value.trim().parse().ok(),
                        "dir" => entry.1 = SortDirection::parse(value),
                        _ => {}
                    }
                }
                ("difta", [field]) => {
                    let hint = params.difta.get_or_insert_with(TableHint::default);
                    match *field {
                        "name" => hint.name = value.to_string(),
                        "source" => hint.source = value.to_string(),
                        _ => {}
                    }
                }
                (root, _) if RESERVED_KEYS.contains(&root) => {}
                (field, []) => params.filters.push(FilterEntry {
                    field: field.to_string(),
                    values: vec![value.to_string()],
                    multi: false,
                }),
                (field, [_]) => {
                    // `field[]=a&field[]=b` (or indexed `field[0]=a`) builds one set, placed
                    // where its first value was seen.
                    match params
                        .filters
                        .iter_mut()
                        .find(|f| f.multi && f.field == field)
                    {
                        Some(entry) => entry.values.push(value.to_string()),
                        None => params.filters.push(FilterEntry {
                            field: field.to_string(),
                            values: vec![value.to_string()],
                            multi: true,
                        }),
                    }
                }
                _ => {}
            }
        }

        if let Some(max_idx) = columns.keys().next_back().copied() {
            params.columns = (0..=max_idx)
                .map(|idx| columns.remove(&idx).unwrap_or_default())
                .collect();
        }
        params.order = order
            .into_values()
            .filter_map(|(column, dir)| column.map(|column| OrderParam { column, dir }))
            .collect();
        params
    }

    /// Decode a POST JSON body by flattening it into bracket-notation pairs.
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body.as_object().ok_or_else(|| {
            DatagridError::Validation("request body must be a JSON object".to_string())
        })?;
        let mut pairs = Vec::new();
        for (key, value) in object {
            flatten_json(key.clone(), value, 0, &mut pairs);
        }
        Ok(Self::from_pairs(pairs))
    }

    pub fn global_search(&self) -> &str {
        self.search.value.trim()
    }

    /// Column reference for a request column index.
    pub fn column_ref(&self, index: usize) -> Option<&str> {
        self.columns
            .get(index)
            .map(ColumnParam::column_ref)
            .filter(|c| !c.is_empty())
    }

    /// Logical table the request names, if any.
    pub fn table_name(&self) -> Option<&str> {
        self.difta
            .as_ref()
            .map(|hint| hint.name.trim())
            .filter(|name| !name.is_empty())
    }
}

/// Split `a[b][c]` into `["a", "b", "c"]`. Keys without brackets yield one segment.
fn key_path(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else {
        return vec![key];
    };
    let mut path = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                path.push(&stripped[..close]);
                rest = &stripped[close + 1..];
            }
            None => break,
        }
    }
    path
}

fn parse_index(raw: &str, max: usize) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|idx| *idx < max)
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => true,
        "false" | "0" | "off" | "no" => false,
        _ => default,
    }
}

fn flatten_json(prefix: String, value: &Value, depth: usize, out: &mut Vec<(String, String)>) {
    if depth > MAX_JSON_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten_json(format!("{prefix}[{key}]"), inner, depth + 1, out);
            }
        }
        Value::Array(items) => {
            // Arrays of objects keep their index (`columns[0][data]`),
            // arrays of scalars become sets (`status[]`).
            for (idx, inner) in items.iter().enumerate() {
                let key = if inner.is_object() || inner.is_array() {
                    format!("{prefix}[{idx}]")
                } else {
                    format!("{prefix}[]")
                };
                flatten_json(key, inner, depth + 1, out);
            }
        }
        Value::Null => out.push((prefix, String::new())),
        Value::String(s) => out.push((prefix, s.clone())),
        other => out.push((prefix, other.to_string())),
    }
}
