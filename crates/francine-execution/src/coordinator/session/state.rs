use crate::id::{ExecutionName, SessionName};
use crate::protocol::{ResourceDescriptor, SessionMessage};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub owner: Option<String>,
    pub resources: Vec<ResourceDescriptor>,
    pub producer: String,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub session: SessionName,
    pub owner: Option<String>,
    /// The number of producing units to render.
    pub parallel: u64,
    /// An update applied to the session before rendering.
    pub update: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub name: SessionName,
    pub owner: Option<String>,
    pub resources: Vec<ResourceDescriptor>,
    pub producer: String,
    pub format: String,
    /// The execution that is running for the session, if any.
    pub running: Option<ExecutionName>,
    pub updates: Vec<serde_json::Value>,
    pub executions: Vec<ExecutionName>,
}

impl SessionDescriptor {
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    pub fn message(&self) -> SessionMessage {
        SessionMessage {
            name: self.name.clone(),
            producer: self.producer.clone(),
            format: self.format.clone(),
            resources: self.resources.clone(),
            updates: self.updates.clone(),
        }
    }
}
