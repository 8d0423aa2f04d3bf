mod core;
mod state;

use indexmap::IndexMap;
pub use state::{ExecutionRequest, SessionDescriptor, SessionOptions};

use crate::id::SessionName;

/// The sessions known to the coordinator.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: IndexMap<SessionName, SessionDescriptor>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }
}
