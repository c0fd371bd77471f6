//! The contract a plugin implements to register operations.

use async_trait::async_trait;

use crate::manifest::PluginManifest;
use crate::operation::PluginOperation;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;

    /// Builds the operations this plugin contributes. An `Err` or an empty
    /// vec aborts registration and rolls back anything this call staged.
    async fn register(&self) -> Result<Vec<PluginOperation>, String>;
}
