//! Live table shape as reported by a backend.

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    /// Schema that only knows column names, e.g. one derived from a zero-row result.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names
                .into_iter()
                .map(|name| ColumnSchema {
                    name: name.into(),
                    data_type: String::new(),
                    nullable: true,
                })
                .collect(),
            primary_keys: Vec::new(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
