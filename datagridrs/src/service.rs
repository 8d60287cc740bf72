use crate::backends::ConnectionManager;
use crate::engine::QueryEngine;
use crate::registry::TableRegistry;
use crate::request::RequestParams;
use crate::response::TableResponse;
use crate::wire::{encode, AjaxOptions, ClientConfig};

/// Entry point an HTTP layer calls for list-view requests.
pub struct DataTableService {
    registry: TableRegistry,
    connections: ConnectionManager,
}

impl DataTableService {
    pub fn new(registry: TableRegistry, connections: ConnectionManager) -> Self {
        Self {
            registry,
            connections,
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Serve a request for the table named by `difta[name]`.
    pub async fn handle(&self, request: &RequestParams) -> TableResponse {
        match request.table_name() {
            Some(name) => self.handle_table(name, request).await,
            None => {
                tracing::warn!(draw = request.draw, "table request without difta[name]");
                TableResponse::empty(request.draw)
            }
        }
    }

    pub async fn handle_table(&self, name: &str, request: &RequestParams) -> TableResponse {
        let Some(descriptor) = self.registry.get(name) else {
            tracing::warn!(table = %name, "unknown table requested");
            return TableResponse::empty(request.draw);
        };
        QueryEngine::new(&self.connections)
            .run(descriptor, request)
            .await
    }

    /// Client configuration for a registered table.
    pub fn client_config(&self, name: &str, ajax: &AjaxOptions) -> Option<ClientConfig> {
        self.registry.get(name).map(|d| encode(d, ajax))
    }
}
