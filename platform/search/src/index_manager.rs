//! Index lifecycle: make sure the schema is in place before any write.

use std::sync::Arc;

use serde_json::Value;

use crate::client::{CreateIndexOutcome, SearchIndexApi};
use crate::schema::{index_body, IndexSettings, INDEX_NAME};
use crate::{SearchError, SearchResult};

/// Lifecycle states of the managed index.
///
/// `Unknown → Checking → {Exists | Creating} → Ready`, with `SchemaError`
/// terminal. A service must not take writes unless the manager is `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unknown,
    Checking,
    Exists,
    Creating,
    Ready,
    SchemaError,
}

/// Ensures the product index exists with the required schema.
pub struct IndexManager {
    api: Arc<dyn SearchIndexApi>,
    settings: IndexSettings,
    index_name: String,
    state: IndexState,
}

impl IndexManager {
    pub fn new(api: Arc<dyn SearchIndexApi>, settings: IndexSettings) -> Self {
        Self {
            api,
            settings,
            index_name: INDEX_NAME.to_string(),
            state: IndexState::Unknown,
        }
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The create-index request body this manager would apply.
    pub fn schema(&self) -> Value {
        index_body(&self.settings)
    }

    /// Idempotent: create the index if it is missing, succeed if it is
    /// already there. Check-then-create is not atomic across instances,
    /// so a creation conflict is treated as success.
    pub async fn ensure_index(&mut self) -> SearchResult<()> {
        self.state = IndexState::Checking;

        let exists = match self.api.index_exists(&self.index_name).await {
            Ok(exists) => exists,
            Err(e) => {
                self.state = IndexState::SchemaError;
                return Err(e);
            }
        };

        if exists {
            self.state = IndexState::Exists;
            tracing::debug!(index = %self.index_name, "Index already present");
            self.state = IndexState::Ready;
            return Ok(());
        }

        self.state = IndexState::Creating;
        match self
            .api
            .create_index(&self.index_name, &self.schema())
            .await
        {
            Ok(CreateIndexOutcome::Created) => {
                tracing::info!(index = %self.index_name, "Index created");
                self.state = IndexState::Ready;
                Ok(())
            }
            Ok(CreateIndexOutcome::AlreadyExists) => {
                tracing::info!(
                    index = %self.index_name,
                    "Index created concurrently by another instance"
                );
                self.state = IndexState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = IndexState::SchemaError;
                Err(SearchError::Schema(e.to_string()))
            }
        }
    }

    /// Destructive: delete and recreate the index, discarding every
    /// document. Only for explicit operator action (reindex-from-scratch);
    /// never called implicitly.
    pub async fn recreate_index(&mut self) -> SearchResult<()> {
        tracing::warn!(index = %self.index_name, "Recreating index, all documents discarded");

        if let Err(e) = self.api.delete_index(&self.index_name).await {
            self.state = IndexState::SchemaError;
            return Err(e);
        }

        self.state = IndexState::Creating;
        match self
            .api
            .create_index(&self.index_name, &self.schema())
            .await
        {
            Ok(_) => {
                self.state = IndexState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = IndexState::SchemaError;
                Err(SearchError::Schema(e.to_string()))
            }
        }
    }
}
