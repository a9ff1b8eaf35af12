//! Local identity management
//!
//! The identity is just the display name announced while advertising and
//! stamped on outgoing messages. A user-chosen name saved in the
//! [`IdentityStore`] always wins; without one, a fresh `User-NNNN` name is
//! minted on every radio reset. The random name is a fallback default, not a
//! privacy feature.

use std::fmt;
use std::sync::{Arc, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PeerConnectError, StorageError};

/// Prefix used for generated display names
pub const GENERATED_NAME_PREFIX: &str = "User-";

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// The display name this device currently presents to peers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    generated: bool,
}

impl Identity {
    /// Identity taken from a user-chosen name
    pub fn named<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            generated: false,
        }
    }

    /// Fresh `User-NNNN` identity with a four digit suffix
    pub fn generate() -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
        Self {
            name: format!("{}{}", GENERATED_NAME_PREFIX, suffix),
            generated: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the name was minted rather than chosen by the user
    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ----------------------------------------------------------------------------
// Identity Store
// ----------------------------------------------------------------------------

/// Persistent home of the user-chosen display name
pub trait IdentityStore: Send + Sync {
    /// The saved name, if any
    fn get_saved_name(&self) -> Result<Option<String>, StorageError>;

    /// Persist a user-chosen name
    fn save_name(&self, name: &str) -> Result<(), StorageError>;

    /// Whether a non-empty name has been saved
    fn has_identity(&self) -> Result<bool, StorageError> {
        Ok(self
            .get_saved_name()?
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false))
    }
}

/// In-memory identity store for tests and history-less operation
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    name: RwLock<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name<T: Into<String>>(name: T) -> Self {
        Self {
            name: RwLock::new(Some(name.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get_saved_name(&self) -> Result<Option<String>, StorageError> {
        self.name
            .read()
            .map(|name| name.clone())
            .map_err(|_| StorageError::unavailable("identity store lock poisoned"))
    }

    fn save_name(&self, name: &str) -> Result<(), StorageError> {
        let mut slot = self
            .name
            .write()
            .map_err(|_| StorageError::unavailable("identity store lock poisoned"))?;
        *slot = Some(name.to_string());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Identity Manager
// ----------------------------------------------------------------------------

/// Resolves and rotates the active identity
pub struct IdentityManager {
    store: Arc<dyn IdentityStore>,
    current: Identity,
}

impl IdentityManager {
    /// Create a manager and resolve the initial identity
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        let current = Self::resolve(store.as_ref());
        Self { store, current }
    }

    pub fn current(&self) -> &Identity {
        &self.current
    }

    /// Replace the active identity wholesale; called on every radio reset
    ///
    /// A generated name never repeats the one it replaces.
    pub fn rotate(&mut self) -> &Identity {
        let mut next = Self::resolve(self.store.as_ref());
        while next.is_generated() && next.name() == self.current.name() {
            next = Identity::generate();
        }
        self.current = next;
        debug!("Active identity is now {}", self.current);
        &self.current
    }

    /// Save a user-chosen name; it becomes active at the next rotation
    pub fn set_name(&mut self, name: &str) -> crate::errors::Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PeerConnectError::invalid_name("display name must not be empty"));
        }
        self.store.save_name(name)?;
        Ok(())
    }

    fn resolve(store: &dyn IdentityStore) -> Identity {
        match store.get_saved_name() {
            Ok(Some(name)) if !name.trim().is_empty() => Identity::named(name.trim()),
            Ok(_) => Identity::generate(),
            Err(e) => {
                warn!("Identity store unavailable, using generated name: {}", e);
                Identity::generate()
            }
        }
    }
}
