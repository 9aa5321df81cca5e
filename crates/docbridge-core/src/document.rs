//! Documents: a payload plus the identity it was stored under.

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, Payload};

/// A persisted record built from exactly one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    body: Payload,
}

impl Document {
    /// Wrap a payload under the given identity.
    ///
    /// Zero-length bodies are valid.
    pub fn new(id: DocumentId, body: Payload) -> Self {
        Self { id, body }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn body(&self) -> &Payload {
        &self.body
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Split into identity and body.
    pub fn into_parts(self) -> (DocumentId, Payload) {
        (self.id, self.body)
    }
}
