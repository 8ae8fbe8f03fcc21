//! Session store
//!
//! Holds at most one [`Session`]. `None` means unauthenticated. Every
//! mutation is written through to the persistence port; persistence
//! failures are logged and never change the in-memory outcome.

use crate::coordinator::RenewedAccess;
use crate::persistence::{MemoryPersistence, SessionPersistence};
use crate::session::Session;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Single source of truth for "is the caller authenticated"
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    persistence: Arc<dyn SessionPersistence>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store backed by `persistence`
    #[must_use]
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            current: RwLock::new(None),
            persistence,
        }
    }

    /// Store with process-local persistence
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    /// Restore the persisted session, if its access token has not expired.
    ///
    /// An expired or unreadable stored session is discarded and removed from
    /// the port; the user signs in again.
    #[must_use]
    pub fn restore(persistence: Arc<dyn SessionPersistence>, now: DateTime<Utc>) -> Self {
        let store = Self::new(persistence);

        match store.persistence.load() {
            Ok(Some(session)) if !session.is_access_expired(now) => {
                tracing::info!("Restored persisted session");
                *store.current.write() = Some(session);
            }
            Ok(Some(_)) => {
                tracing::info!("Persisted session has expired, discarding");
                store.clear_persisted();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Failed to load persisted session: {}", e);
                store.clear_persisted();
            }
        }

        store
    }

    /// Current session
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// Check if a session is present
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the session (login)
    pub fn set(&self, session: Session) {
        if let Err(e) = self.persistence.save(&session) {
            tracing::warn!("Failed to persist session: {}", e);
        }
        *self.current.write() = Some(session);
    }

    /// Drop the session (logout, unrecoverable renewal failure)
    pub fn clear(&self) {
        *self.current.write() = None;
        self.clear_persisted();
    }

    /// Drop the session only if its access token is still `access`.
    ///
    /// A login that replaced the session in the meantime is kept. Returns
    /// whether the session was cleared.
    pub fn clear_if_current(&self, access: &str) -> bool {
        {
            let mut current = self.current.write();
            match current.as_ref() {
                Some(session) if session.access_token() == access => *current = None,
                _ => {
                    tracing::debug!("Session replaced since the rejection, keeping it");
                    return false;
                }
            }
        }
        self.clear_persisted();
        true
    }

    /// Apply a successful renewal.
    ///
    /// Only applies while the session that was renewed is still current: a
    /// logout or a new login during renewal wins. Returns the new session.
    pub fn replace_access(&self, renewed_from: &str, renewed: RenewedAccess) -> Option<Session> {
        let next = {
            let mut current = self.current.write();
            let session = current.as_ref()?;
            if session.refresh_token() != renewed_from {
                tracing::debug!("Session changed during renewal, dropping renewed token");
                return None;
            }
            let next = session.renewed(renewed);
            *current = Some(next.clone());
            next
        };

        if let Err(e) = self.persistence.save(&next) {
            tracing::warn!("Failed to persist renewed session: {}", e);
        }
        Some(next)
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.persistence.clear() {
            tracing::warn!("Failed to clear persisted session: {}", e);
        }
    }
}
