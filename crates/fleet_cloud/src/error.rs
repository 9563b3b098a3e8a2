//! Provider error types.

/// Errors that can occur while talking to the cloud provider.
///
/// All of these are transient from the reconciler's point of view: the poll
/// is abandoned and the previous world state stays in place.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The inventory listing failed.
    #[error("inventory request failed: {0}")]
    Inventory(String),

    /// Metrics for one instance could not be fetched.
    #[error("metrics unavailable for {instance_id}: {reason}")]
    Metrics {
        /// The instance whose metrics were requested.
        instance_id: String,
        /// Provider-specific reason.
        reason: String,
    },

    /// Reading a local inventory source failed.
    #[error("failed to read inventory source: {0}")]
    Io(#[from] std::io::Error),

    /// A local inventory source was not valid JSON.
    #[error("failed to parse inventory: {0}")]
    Parse(#[from] serde_json::Error),
}
