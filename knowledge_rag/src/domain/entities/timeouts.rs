use std::time::Duration;

/// Upper bounds on the calls to the embeddings model and to the vector index.
/// Each call gets its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub embedding: Duration,
    pub vector_index: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding: Duration::from_secs(30),
            vector_index: Duration::from_secs(10),
        }
    }
}
