//! Choosing the session a separately uploaded heart-rate batch belongs to.
//!
//! Without an explicit reference the linker picks the numerically highest
//! stored session id. That is only correct when one user uploads a MANTIS
//! file and then its heart-rate file in immediate succession; concurrent
//! users can end up linked to each other's sessions. Callers that know the
//! session should pass [`LinkTarget::Explicit`].

use mantis_core::error::{IngestError, Result};
use tracing::{debug, info};

use crate::store::SessionStore;

/// Which session a heart-rate batch should attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkTarget {
    /// Most recently created session (highest id).
    #[default]
    MostRecent,
    /// A session the caller named.
    Explicit(i64),
}

impl From<Option<i64>> for LinkTarget {
    fn from(id: Option<i64>) -> Self {
        id.map_or(LinkTarget::MostRecent, LinkTarget::Explicit)
    }
}

pub struct SessionLinker<'a> {
    store: &'a SessionStore,
}

impl<'a> SessionLinker<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    /// Resolve `target` to a stored session id.
    pub fn resolve(&self, target: LinkTarget) -> Result<i64> {
        match target {
            LinkTarget::Explicit(id) => {
                if self.store.session_exists(id)? {
                    debug!("Linking heart-rate data to requested session {}", id);
                    Ok(id)
                } else {
                    Err(IngestError::UnknownSession(id))
                }
            }
            LinkTarget::MostRecent => {
                let id = self
                    .store
                    .latest_session_id()?
                    .ok_or(IngestError::NoSessionAvailable)?;
                info!("Linking heart-rate data to most recent session {}", id);
                Ok(id)
            }
        }
    }
}
