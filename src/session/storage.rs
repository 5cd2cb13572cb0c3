use std::sync::Mutex;

use crate::auth::SessionToken;

/// The scoped key-value area a client keeps its session in: written on
/// login, read at startup, cleared on logout or failed recovery.
pub trait SessionStorage: Send + Sync {
    fn read(&self) -> Option<SessionToken>;
    fn write(&self, session: &SessionToken);
    fn clear(&self);
}

/// Process-local storage, for tests and non-browser hosts.
#[derive(Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<SessionToken>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn read(&self) -> Option<SessionToken> {
        self.slot.lock().expect("session slot").clone()
    }

    fn write(&self, session: &SessionToken) {
        *self.slot.lock().expect("session slot") = Some(session.clone());
    }

    fn clear(&self) {
        *self.slot.lock().expect("session slot") = None;
    }
}
