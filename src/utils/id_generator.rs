//! Identifier generation for nodes, correlation flows, and hub requests.

use uuid::Uuid;

/// Generates the opaque identifiers used across the worker.
///
/// All identifiers are v4 UUIDs rendered as strings; the distinct methods
/// exist so call sites document which kind of identifier they mint.
#[derive(Clone, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Identifier for a node registered without an explicit id.
    #[must_use]
    pub fn generate_node_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Correlation identifier threaded through one logical flow of data.
    #[must_use]
    pub fn generate_correlation_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Identifier correlating a hub request with its reply.
    #[must_use]
    pub fn generate_request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
