//! Request/response header.

use serde::{Deserialize, Serialize};

/// Header sent in front of every request and response body.
///
/// The caller assigns `seq`; the server echoes it back unchanged so that
/// responses written out of order can still be matched to their requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Target operation, e.g. `"Arith.Multiply"`.
    pub service_method: String,
    /// Sequence number chosen by the caller.
    pub seq: u64,
    /// Error text, set only on failed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Header {
    /// Create a request header.
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: None,
        }
    }

    /// Turn this header into an error response header.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether this header carries an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
