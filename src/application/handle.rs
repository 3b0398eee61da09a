//! # Transport Handle Provider
//!
//! The single place long-lived callbacks look up the live session.
//! The connection supervisor swaps the session atomically on every (re)connect,
//! so nothing ever closes over a stale handle.

use std::sync::{Arc, RwLock};

use crate::domain::errors::DeliveryError;
use crate::domain::traits::ChatSession;

#[derive(Clone, Default)]
pub struct TransportHandleProvider {
    current: Arc<RwLock<Option<Arc<dyn ChatSession>>>>,
}

impl TransportHandleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<Arc<dyn ChatSession>> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// The live session, or `NotConnected` (retryable) when there is none.
    pub fn require(&self) -> Result<Arc<dyn ChatSession>, DeliveryError> {
        self.current().ok_or(DeliveryError::NotConnected)
    }

    pub(crate) fn replace(&self, session: Option<Arc<dyn ChatSession>>) {
        if let Ok(mut guard) = self.current.write() {
            *guard = session;
        }
    }
}
