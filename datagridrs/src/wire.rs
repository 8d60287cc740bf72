//! Client-side table configuration.
//!
//! [`encode`] turns a descriptor plus transport options into the object a
//! DataTables-compatible widget is initialised with. GET and POST configs
//! differ only in the request method and the CSRF header; the request
//! parameters the widget sends decode to the same [`crate::RequestParams`].

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::descriptor::ColumnDescriptor;
use crate::error::{DatagridError, Result};
use crate::query_builder::columns::{is_pseudo_column, is_safe_identifier, row_key};
use crate::sql_ast::SortDirection;

static ELEMENT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Default)]
pub struct AjaxOptions {
    pub url: String,
    pub transport: Transport,
    /// Sent as `X-CSRF-TOKEN` on POST.
    pub csrf_token: Option<String>,
    /// Echoed back as `difta[source]`.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub processing: bool,
    pub server_side: bool,
    pub ajax: AjaxConfig,
    pub columns: Vec<ClientColumn>,
    /// `[[column_index, "desc"]]`.
    pub order: Vec<(usize, SortDirection)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AjaxConfig {
    pub url: String,
    #[serde(rename = "type")]
    pub method: Transport,
    pub headers: BTreeMap<String, String>,
    pub data_type: String,
    pub data: AjaxData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AjaxData {
    pub difta: TableRefData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRefData {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientColumn {
    pub data: String,
    pub name: String,
    pub orderable: bool,
    pub searchable: bool,
    pub visible: bool,
}

/// Build the client configuration for `descriptor`.
///
/// Column names that are not safe identifiers never reach the output. The
/// hidden identifier column is appended when not already listed and is the
/// default sort, descending.
pub fn encode(descriptor: &ColumnDescriptor, ajax: &AjaxOptions) -> ClientConfig {
    let base = descriptor.relation_name();
    let mut columns = Vec::with_capacity(descriptor.columns.len() + 1);

    for name in &descriptor.columns {
        let name = name.trim();
        if !is_safe_identifier(name) {
            tracing::warn!(table = %descriptor.name, column = %name, "dropping unsafe column from client config");
            continue;
        }
        let real = !is_pseudo_column(name);
        columns.push(ClientColumn {
            data: if real { row_key(base, name) } else { name.to_string() },
            name: name.to_string(),
            orderable: real,
            searchable: real,
            visible: true,
        });
    }

    let identifier = descriptor.identifier.trim();
    let mut order = Vec::new();
    if is_safe_identifier(identifier) && !is_pseudo_column(identifier) {
        let position = match columns.iter().position(|c| c.name == identifier) {
            Some(position) => position,
            None => {
                columns.push(ClientColumn {
                    data: row_key(base, identifier),
                    name: identifier.to_string(),
                    orderable: true,
                    searchable: false,
                    visible: false,
                });
                columns.len() - 1
            }
        };
        order.push((position, SortDirection::Desc));
    } else {
        tracing::warn!(table = %descriptor.name, identifier = %identifier, "identifier column unusable for default order");
    }

    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    headers.insert("X-Requested-With".to_string(), "XMLHttpRequest".to_string());
    if ajax.transport == Transport::Post {
        if let Some(token) = &ajax.csrf_token {
            headers.insert("X-CSRF-TOKEN".to_string(), token.clone());
        }
    }

    ClientConfig {
        processing: true,
        server_side: true,
        ajax: AjaxConfig {
            url: ajax.url.clone(),
            method: ajax.transport,
            headers,
            data_type: "json".to_string(),
            data: AjaxData {
                difta: TableRefData {
                    name: descriptor.name.clone(),
                    source: ajax.source.clone().unwrap_or_default(),
                },
            },
        },
        columns,
        order,
    }
}

impl ClientConfig {
    /// JSON safe to embed inside an inline `<script>` element.
    pub fn to_json(&self) -> Result<String> {
        let raw = serde_json::to_string(self)?;
        Ok(escape_for_script(&raw))
    }

    /// Widget initialisation snippet for the table element `element_id`.
    pub fn to_script(&self, element_id: &str) -> Result<String> {
        if !ELEMENT_ID.is_match(element_id) {
            return Err(DatagridError::Validation(format!(
                "invalid table element id '{}'",
                escape_for_script(element_id)
            )));
        }
        Ok(format!(
            "jQuery(function ($) {{ $('#{element_id}').DataTable({}); }});",
            self.to_json()?
        ))
    }
}

/// Replace characters that could end a script block or string context with
/// JSON `\u` escapes. The result is still valid JSON.
pub fn escape_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\'' => out.push_str("\\u0027"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}
