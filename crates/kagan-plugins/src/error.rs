//! Registration-time failures (§4.14). These happen at boot, when plugins
//! are loaded, not per-request — request-time failures go through
//! [`kagan_protocol::ProtocolError`] instead.

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin id '{0}' does not match ^[a-z][a-z0-9_.-]{{2,63}}$")]
    InvalidManifestId(String),
    #[error("plugin '{plugin_id}' registered zero operations")]
    ZeroOperations { plugin_id: String },
    #[error("plugin '{plugin_id}' register() failed: {message}")]
    RegistrationFailed { plugin_id: String, message: String },
    #[error("operation ({capability}, {method}) is already registered by plugin '{existing_plugin_id}'")]
    DuplicateOperation {
        capability: String,
        method: String,
        existing_plugin_id: String,
    },
    #[error("plugin id '{0}' is already registered")]
    DuplicateManifest(String),
}
