pub mod backends;
pub mod config;
pub mod descriptor;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
pub mod pagination;
pub mod query_builder;
pub mod registry;
pub mod request;
pub mod response;
pub mod schema;
pub mod service;
pub mod sql_ast;
pub mod validation;
pub mod wire;

use std::path::Path;

use crate::error::Result;
use crate::registry::TableRegistry;

/// Load table descriptors from disk and validate them against the live schema.
pub async fn load_and_validate<P: AsRef<Path>>(
    descriptor_dir: P,
    validator: &crate::validation::Validator,
) -> Result<TableRegistry> {
    let registry = TableRegistry::load_from_dir(descriptor_dir)?;
    validator.validate_registry(&registry).await?;
    Ok(registry)
}

pub use crate::validation::Validator;
pub use backends::{BackendConnection, ConnectionManager};
pub use config::DatagridConfig;
pub use descriptor::{ColumnDescriptor, StaticCondition, TableSource};
pub use engine::{QueryEngine, Stage, StageError, StageFailure};
pub use error::{DatagridError, Result as DatagridResult};
pub use request::RequestParams;
pub use response::TableResponse;
pub use service::DataTableService;
pub use wire::{AjaxOptions, ClientConfig, Transport};
