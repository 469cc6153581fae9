//! # Session
//!
//! The authentication boundary. Whoever signs the user in (a login screen,
//! a token exchange) publishes the identity here; everything else only
//! observes it.
//!
//! ```text
//!   sign_in("u1", "owner@example.com")
//!        │
//!        ▼
//!   AccessPolicy ── email in admin list? ──► Identity { is_admin }
//!        │
//!        ▼
//!   watch::Sender<Option<Identity>> ──► coordinator session watcher
//!                                   ──► catalog service admin checks
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use till_core::{CoreError, CoreResult, Identity};

/// Derives admin rights from a list of e-mail addresses.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admin_emails: Vec<String>,
}

impl AccessPolicy {
    pub fn new(admin_emails: Vec<String>) -> Self {
        AccessPolicy {
            admin_emails: admin_emails
                .into_iter()
                .map(|e| e.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        match email {
            Some(email) => {
                let email = email.trim().to_lowercase();
                self.admin_emails.iter().any(|a| *a == email)
            }
            None => false,
        }
    }

    /// Builds the identity for an authenticated user.
    pub fn identity(&self, uid: impl Into<String>, email: Option<String>) -> Identity {
        let is_admin = self.is_admin(email.as_deref());
        Identity::new(uid, email).with_admin(is_admin)
    }
}

/// Current identity, shared and observable. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Session {
    tx: Arc<watch::Sender<Option<Identity>>>,
    policy: Arc<AccessPolicy>,
}

impl Session {
    pub fn new(policy: AccessPolicy) -> Self {
        let (tx, _rx) = watch::channel(None);
        Session {
            tx: Arc::new(tx),
            policy: Arc::new(policy),
        }
    }

    /// Signs a user in, deriving admin rights from the policy.
    pub fn sign_in(&self, uid: impl Into<String>, email: Option<String>) -> Identity {
        let identity = self.policy.identity(uid, email);
        info!(uid = %identity.uid, is_admin = identity.is_admin, "Signed in");
        self.tx.send_replace(Some(identity.clone()));
        identity
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Signed out");
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Observes sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// The signed-in identity, or `Unauthorized` naming `action`.
    pub fn require_user(&self, action: &str) -> CoreResult<Identity> {
        self.current().ok_or_else(|| CoreError::unauthorized(action))
    }

    /// The signed-in identity if it is an administrator.
    pub fn require_admin(&self, action: &str) -> CoreResult<Identity> {
        match self.current() {
            Some(identity) if identity.is_admin => Ok(identity),
            _ => Err(CoreError::unauthorized(action)),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(AccessPolicy::default())
    }
}
