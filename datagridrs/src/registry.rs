use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glob::glob;

use crate::descriptor::ColumnDescriptor;
use crate::error::{DatagridError, Result};

/// Descriptors keyed by logical table name.
#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    pub tables: HashMap<String, ColumnDescriptor>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(descriptors: Vec<ColumnDescriptor>) -> Self {
        let mut registry = TableRegistry::new();
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }

    /// Load every `*.yml` / `*.yaml` descriptor in `dir`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(DatagridError::Validation(format!(
                "descriptor directory not found: {}",
                dir.display()
            )));
        }
        let mut registry = TableRegistry::new();
        for pattern in ["*.yml", "*.yaml"] {
            for entry in glob(&format!("{}/{pattern}", dir.display()))
                .map_err(|e| DatagridError::Other(e.into()))?
                .flatten()
            {
                registry.load_file(&entry)?;
            }
        }
        tracing::debug!(dir = %dir.display(), tables = registry.tables.len(), "loaded table descriptors");
        Ok(registry)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let descriptor: ColumnDescriptor = serde_yaml::from_str(&contents).map_err(|e| {
            DatagridError::Config(format!("{}: {e}", path.display()))
        })?;
        if let Some(previous) = self.tables.get(&descriptor.name) {
            return Err(DatagridError::Validation(format!(
                "duplicate table descriptor '{}' in {}",
                previous.name,
                path.display()
            )));
        }
        self.insert(descriptor);
        Ok(())
    }

    pub fn insert(&mut self, descriptor: ColumnDescriptor) {
        self.tables.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
