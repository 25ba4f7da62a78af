//! Session identity and the serialized event stream
//!
//! Both asynchronous sources the session listens to, identity-state changes
//! and live-query snapshot deliveries, are funneled into one
//! [`SessionEvent`] channel consumed by a single loop. That keeps view
//! state under exactly one writer and guarantees identity resolution is
//! observed before any subscription activity.

use serde::{Deserialize, Serialize};

use crate::readings::ReadingDocument;

/// Opaque identifier of the authenticated session principal
///
/// Issued once per session by the auth collaborator; immutable once set and
/// cleared only on sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event on the session's serialized stream
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The auth collaborator reported the current identity state.
    /// `None` means no principal is signed in.
    IdentityChanged(Option<Identity>),
    /// The live query delivered a full snapshot of its result set,
    /// superseding all prior data.
    Snapshot(Vec<ReadingDocument>),
    /// The live feed failed; data already displayed stays in place.
    SubscriptionError(String),
}
