//! Declarative description of a logical table exposed to list views.
//!
//! A [`ColumnDescriptor`] is built once at bootstrap (from YAML or code) and
//! shared read-only between requests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A bound model object that knows its own table and connection.
pub trait TableModel: Send + Sync + fmt::Debug {
    fn table(&self) -> &str;
    fn connection(&self) -> Option<&str> {
        None
    }
}

/// Where the base relation of a logical table comes from.
#[derive(Clone)]
pub enum TableSource {
    Model(Arc<dyn TableModel>),
    RawSql { sql: String, alias: String },
    Named(String),
}

impl TableSource {
    /// Name the base relation is referenced by in qualified column names.
    pub fn relation_name(&self) -> &str {
        match self {
            TableSource::Model(model) => model.table(),
            TableSource::RawSql { alias, .. } => alias,
            TableSource::Named(name) => name,
        }
    }
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Model(model) => f.debug_tuple("Model").field(model).finish(),
            TableSource::RawSql { alias, .. } => {
                f.debug_struct("RawSql").field("alias", alias).finish()
            }
            TableSource::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl Serialize for TableSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Raw<'a> {
            sql: &'a str,
            alias: &'a str,
        }
        match self {
            TableSource::Model(model) => serializer.serialize_str(model.table()),
            TableSource::Named(name) => serializer.serialize_str(name),
            TableSource::RawSql { sql, alias } => Raw { sql, alias }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TableSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(TableSource::Named(s)),
            other => {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Full {
                    Table { table: String },
                    Sql { sql: String, alias: String },
                }
                let full = Full::deserialize(other).map_err(de::Error::custom)?;
                Ok(match full {
                    Full::Table { table } => TableSource::Named(table),
                    Full::Sql { sql, alias } => TableSource::RawSql { sql, alias },
                })
            }
        }
    }
}

/// Comparison used by a static condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionOp {
    #[default]
    #[serde(rename = "=", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "<>", alias = "neq")]
    Neq,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in", alias = "not in")]
    NotIn,
}

/// Server-declared filter applied to every request (tenant scoping and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticCondition {
    pub field: String,
    #[serde(default)]
    pub op: ConditionOp,
    pub value: Value,
}

impl StaticCondition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: ConditionOp::Eq,
            value: value.into(),
        }
    }

    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    /// `1,234.56`
    #[default]
    Comma,
    /// `1.234,56`
    Dot,
    /// `1 234,56`
    Space,
    /// `1234.56`
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Grouped thousands with fixed decimals.
    #[default]
    Number,
    /// Fixed decimals, no grouping.
    Decimal,
    /// Grouped number with a trailing `%`.
    Percent,
    /// Grouped number prefixed with the rule's `symbol`.
    Currency,
}

/// Per-field display formatting applied after fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRule {
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default)]
    pub separator: SeparatorStyle,
    #[serde(default)]
    pub kind: FormatKind,
    pub symbol: Option<String>,
}

fn default_decimals() -> u32 {
    2
}

impl Default for FormatRule {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            separator: SeparatorStyle::default(),
            kind: FormatKind::default(),
            symbol: None,
        }
    }
}

/// Row action rendered into the `action` pseudo-column. `href` may contain
/// `{column}` placeholders that are filled from the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLink {
    pub label: String,
    pub href: String,
    pub class: Option<String>,
}

fn default_identifier() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Logical table name requests refer to.
    pub name: String,
    pub source: TableSource,
    /// Explicitly declared connection.
    pub connection: Option<String>,
    /// Descriptor-level fallback used when nothing more specific is declared.
    pub default_connection: Option<String>,
    /// Whitelist of columns eligible for search, order and display, in display order.
    /// May include pseudo-columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// `"left_table.left_column" -> "right_table.right_column"`.
    #[serde(default)]
    pub joins: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<StaticCondition>,
    #[serde(default)]
    pub formats: BTreeMap<String, FormatRule>,
    /// Hidden identifier column used for default sort and row attributes.
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default)]
    pub actions: Vec<ActionLink>,
    pub description: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, source: TableSource) -> Self {
        Self {
            name: name.into(),
            source,
            connection: None,
            default_connection: None,
            columns: Vec::new(),
            joins: BTreeMap::new(),
            conditions: Vec::new(),
            formats: BTreeMap::new(),
            identifier: default_identifier(),
            actions: Vec::new(),
            description: None,
        }
    }

    /// Descriptor over a plain table whose logical name equals the table name.
    pub fn table(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), TableSource::Named(name))
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_join(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.joins.insert(left.into(), right.into());
        self
    }

    pub fn with_condition(mut self, condition: StaticCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_format(mut self, field: impl Into<String>, rule: FormatRule) -> Self {
        self.formats.insert(field.into(), rule);
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn with_action(mut self, action: ActionLink) -> Self {
        self.actions.push(action);
        self
    }

    pub fn relation_name(&self) -> &str {
        self.source.relation_name()
    }

    pub fn exposes(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}
