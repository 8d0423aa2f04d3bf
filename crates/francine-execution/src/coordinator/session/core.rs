use log::info;

use crate::coordinator::session::state::{ExecutionRequest, SessionDescriptor, SessionOptions};
use crate::coordinator::session::SessionManager;
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{ExecutionName, SessionName};

impl SessionManager {
    pub fn create_session(&mut self, name: SessionName, options: SessionOptions) -> &SessionDescriptor {
        let SessionOptions {
            owner,
            resources,
            producer,
            format,
        } = options;
        info!(
            "session {name} created with {} resource(s) for producer {producer}",
            resources.len()
        );
        let (index, _) = self.sessions.insert_full(
            name.clone(),
            SessionDescriptor {
                name,
                owner,
                resources,
                producer,
                format,
                running: None,
                updates: vec![],
                executions: vec![],
            },
        );
        &self.sessions[index]
    }

    pub fn get(&self, name: &SessionName) -> Option<&SessionDescriptor> {
        self.sessions.get(name)
    }

    /// Removes the session unless it has a running execution.
    pub fn delete_session(
        &mut self,
        name: &SessionName,
        owner: Option<&str>,
    ) -> ExecutionResult<SessionDescriptor> {
        let session = self.authorize(name, owner)?;
        if let Some(execution) = &session.running {
            return Err(ExecutionError::invalid(format!(
                "session {name} has running execution {execution}"
            )));
        }
        let session = self
            .sessions
            .shift_remove(name)
            .ok_or_else(|| ExecutionError::invalid(format!("no such session: {name}")))?;
        info!("session {name} deleted");
        Ok(session)
    }

    /// Marks the session as running the execution after validating the request.
    /// A rejected request leaves the session untouched.
    pub fn begin_execution(
        &mut self,
        request: &ExecutionRequest,
        execution: ExecutionName,
    ) -> ExecutionResult<&SessionDescriptor> {
        let session = self.authorize(&request.session, request.owner.as_deref())?;
        if let Some(running) = &session.running {
            return Err(ExecutionError::invalid(format!(
                "session {} already has running execution {running}",
                request.session
            )));
        }
        if request.parallel == 0 {
            return Err(ExecutionError::invalid(
                "parallel must be a positive number",
            ));
        }
        let session = self
            .sessions
            .get_mut(&request.session)
            .ok_or_else(|| ExecutionError::internal("session disappeared"))?;
        if let Some(update) = &request.update {
            session.updates.push(update.clone());
        }
        session.executions.push(execution.clone());
        session.running = Some(execution);
        Ok(session)
    }

    /// Clears the running flag if the execution is the one running for the session.
    pub fn end_execution(&mut self, name: &SessionName, execution: &ExecutionName) {
        if let Some(session) = self.sessions.get_mut(name) {
            if session.running.as_ref() == Some(execution) {
                session.running = None;
            }
        }
    }

    fn authorize(&self, name: &SessionName, owner: Option<&str>) -> ExecutionResult<&SessionDescriptor> {
        let session = self
            .sessions
            .get(name)
            .ok_or_else(|| ExecutionError::invalid(format!("no such session: {name}")))?;
        match &session.owner {
            Some(expected) if Some(expected.as_str()) != owner => Err(ExecutionError::invalid(
                format!("not allowed to access session {name}"),
            )),
            _ => Ok(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::ResourceDescriptor;

    fn manager() -> SessionManager {
        let mut manager = SessionManager::new();
        manager.create_session(
            SessionName::from("s1"),
            SessionOptions {
                owner: Some("alice".to_string()),
                resources: vec![ResourceDescriptor {
                    kind: "url".to_string(),
                    location: "http://example.com/scene.tar".to_string(),
                }],
                producer: "ao".to_string(),
                format: "png".to_string(),
            },
        );
        manager
    }

    fn request(owner: &str, parallel: u64) -> ExecutionRequest {
        ExecutionRequest {
            session: SessionName::from("s1"),
            owner: Some(owner.to_string()),
            parallel,
            update: Some(json!({"camera": [0, 0, 1]})),
        }
    }

    #[test]
    fn test_begin_execution() -> ExecutionResult<()> {
        let mut manager = manager();
        let session = manager.begin_execution(&request("alice", 4), ExecutionName::from("e1"))?;
        assert_eq!(session.running, Some(ExecutionName::from("e1")));
        assert_eq!(session.updates.len(), 1);
        assert!(session.has_resources());
        assert_eq!(session.message().updates, vec![json!({"camera": [0, 0, 1]})]);
        Ok(())
    }

    #[test]
    fn test_at_most_one_running_execution() -> ExecutionResult<()> {
        let mut manager = manager();
        manager.begin_execution(&request("alice", 4), ExecutionName::from("e1"))?;
        let result = manager.begin_execution(&request("alice", 4), ExecutionName::from("e2"));
        assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        let session = manager.get(&SessionName::from("s1"));
        assert_eq!(session.map(|x| x.updates.len()), Some(1));
        assert_eq!(session.map(|x| x.executions.len()), Some(1));

        // Only the running execution clears the flag.
        manager.end_execution(&SessionName::from("s1"), &ExecutionName::from("e2"));
        assert!(manager
            .begin_execution(&request("alice", 4), ExecutionName::from("e3"))
            .is_err());
        manager.end_execution(&SessionName::from("s1"), &ExecutionName::from("e1"));
        manager.begin_execution(&request("alice", 4), ExecutionName::from("e3"))?;
        Ok(())
    }

    #[test]
    fn test_invalid_execution_requests() {
        let mut manager = manager();
        let mut unknown = request("alice", 4);
        unknown.session = SessionName::from("s2");
        for request in [unknown, request("bob", 4), request("alice", 0)] {
            let result = manager.begin_execution(&request, ExecutionName::from("e1"));
            assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        }
        let session = manager.get(&SessionName::from("s1"));
        assert_eq!(session.and_then(|x| x.running.clone()), None);
    }

    #[test]
    fn test_delete_session() -> ExecutionResult<()> {
        let mut manager = manager();
        let name = SessionName::from("s1");
        manager.begin_execution(&request("alice", 4), ExecutionName::from("e1"))?;
        assert!(manager.delete_session(&name, Some("alice")).is_err());
        manager.end_execution(&name, &ExecutionName::from("e1"));
        assert!(manager.delete_session(&name, Some("bob")).is_err());
        let session = manager.delete_session(&name, Some("alice"))?;
        assert_eq!(session.executions, vec![ExecutionName::from("e1")]);
        assert!(manager.get(&name).is_none());
        Ok(())
    }
}
