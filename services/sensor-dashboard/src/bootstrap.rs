//! Identity bootstrap
//!
//! Resolves the session principal exactly once: if the auth collaborator
//! reports an existing identity it is recorded, otherwise a single sign-in
//! attempt is made with the configured credential token, or anonymously
//! when none is configured. Sign-in failure is terminal for the session and
//! never retried automatically.

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::AuthBackend;
use crate::error::Result;
use crate::events::Identity;

/// Tracks bootstrap progress and drives the one sign-in attempt
pub struct IdentityBootstrapper {
    auth: Arc<dyn AuthBackend>,
    credential_token: Option<String>,
    sign_in_attempted: bool,
    identity: Option<Identity>,
}

impl IdentityBootstrapper {
    pub fn new(auth: Arc<dyn AuthBackend>, credential_token: Option<String>) -> Self {
        Self {
            auth,
            credential_token,
            sign_in_attempted: false,
            identity: None,
        }
    }

    /// Identity resolved so far
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Whether an identity has been resolved
    pub fn is_complete(&self) -> bool {
        self.identity.is_some()
    }

    /// React to an identity-state notification from the auth collaborator.
    ///
    /// Returns the ready identity, or `None` when no principal is signed in
    /// and no further sign-in will be attempted. Completing bootstrap again
    /// with the same identity is a no-op.
    pub async fn handle_identity_change(
        &mut self,
        observed: Option<Identity>,
    ) -> Result<Option<Identity>> {
        if let Some(identity) = observed {
            if self.identity.as_ref() != Some(&identity) {
                info!("identity resolved: {}", identity);
            }
            self.identity = Some(identity.clone());
            return Ok(Some(identity));
        }

        if self.identity.take().is_some() {
            // Previously resolved principal was signed out.
            info!("identity revoked");
            return Ok(None);
        }

        if self.sign_in_attempted {
            debug!("sign-in already attempted, waiting for identity state");
            return Ok(None);
        }
        self.sign_in_attempted = true;

        let identity = match &self.credential_token {
            Some(token) => {
                debug!("signing in with credential token");
                self.auth.sign_in_with_token(token).await?
            }
            None => {
                debug!("no credential token configured, signing in anonymously");
                self.auth.sign_in_anonymously().await?
            }
        };

        info!("signed in as {}", identity);
        self.identity = Some(identity.clone());
        Ok(Some(identity))
    }
}
