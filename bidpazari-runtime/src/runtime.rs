use std::sync::Arc;

use crate::mailer::{LoggingMailer, Mailer};
use crate::password::{PasswordHasher, Sha256PasswordHasher};
use crate::registry::Registry;
use crate::store::{InMemoryStore, Store};

/// The explicit, per-process value bundling every collaborator the
/// dispatcher and transports need. Passed down by reference/`Arc` rather
/// than reached for as a global singleton -- tests build a fresh one per
/// case, and nothing in this crate reads process-wide mutable statics.
pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub registry: Arc<Registry>,
}

impl Runtime {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        password_hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Runtime {
            store,
            mailer,
            password_hasher,
            registry: Arc::new(Registry::new()),
        }
    }
}

impl Default for Runtime {
    /// Convenience for tests and standalone runs: in-memory store, a
    /// mailer that only logs, salted-SHA256 password hashing.
    fn default() -> Self {
        Runtime::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(LoggingMailer),
            Arc::new(Sha256PasswordHasher),
        )
    }
}
