//! The JSON messages exchanged between the coordinator and the workers.

use serde::{Deserialize, Deserializer, Serialize};

use crate::id::{ExecutionName, SessionName, TaskName, WorkerName};
use crate::task::TaskKind;

pub mod method {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const RUN: &str = "run";
    pub const FINISH: &str = "finish";
    pub const FAILED: &str = "failed";
    pub const DELETE_CACHE: &str = "deleteCache";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingParams {
    pub worker_name: WorkerName,
    pub master: CoordinatorAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLog {
    pub from: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongParams {
    pub worker_name: WorkerName,
    #[serde(default)]
    pub logs: Vec<WorkerLog>,
    #[serde(default)]
    pub cached_session_names: Vec<SessionName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishKind {
    Task,
    Fetching,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishParams {
    #[serde(rename = "type")]
    pub kind: FinishKind,
    pub worker_name: WorkerName,
    /// Workers send either `taskName` or the whole `task` they ran.
    #[serde(alias = "task", deserialize_with = "deserialize_task_name")]
    pub task_name: TaskName,
    /// The elapsed time in milliseconds.
    pub elapsed_time: u64,
    #[serde(default)]
    pub weight: Option<u64>,
    #[serde(default)]
    pub cached_session_names: Option<Vec<SessionName>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskReference {
    Name(TaskName),
    Task { name: TaskName },
}

fn deserialize_task_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TaskName, D::Error> {
    match TaskReference::deserialize(deserializer)? {
        TaskReference::Name(name) | TaskReference::Task { name } => Ok(name),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedParams {
    pub task_name: TaskName,
    pub worker_name: WorkerName,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCacheParams {
    pub session_name: SessionName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerAddress {
    pub host: String,
    pub port: u16,
    pub resource_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceSourceMessage {
    Original,
    Worker { worker: WorkerAddress },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceInputMessage {
    pub task_name: TaskName,
    pub weight: u64,
    pub worker: WorkerAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub name: SessionName,
    pub producer: String,
    pub format: String,
    pub resources: Vec<ResourceDescriptor>,
    pub updates: Vec<serde_json::Value>,
}

/// The parameters of the `run` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    pub name: TaskName,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub execution_name: ExecutionName,
    pub session: SessionMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResourceSourceMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ReduceInputMessage>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_finish_params_wire_format() -> serde_json::Result<()> {
        let params: FinishParams = serde_json::from_value(json!({
            "type": "FETCHING",
            "workerName": "worker-a",
            "taskName": "execution1-task1",
            "elapsedTime": 1200,
        }))?;
        assert_eq!(params.kind, FinishKind::Fetching);
        assert_eq!(params.worker_name, WorkerName::from("worker-a"));
        assert_eq!(params.task_name, TaskName::from("execution1-task1"));
        assert_eq!(params.weight, None);
        assert_eq!(params.cached_session_names, None);
        Ok(())
    }

    #[test]
    fn test_finish_params_with_task_object() -> serde_json::Result<()> {
        let params: FinishParams = serde_json::from_value(json!({
            "type": "TASK",
            "workerName": "worker-a",
            "task": {
                "name": "execution1-task2",
                "type": "PRODUCING",
                "executionName": "execution1",
            },
            "elapsedTime": 800,
            "weight": 4,
            "cachedSessionNames": ["session1"],
        }))?;
        assert_eq!(params.kind, FinishKind::Task);
        assert_eq!(params.task_name, TaskName::from("execution1-task2"));
        assert_eq!(params.weight, Some(4));
        assert_eq!(
            params.cached_session_names,
            Some(vec![SessionName::from("session1")])
        );
        Ok(())
    }

    #[test]
    fn test_task_message_wire_format() -> serde_json::Result<()> {
        let message = TaskMessage {
            name: TaskName::from("execution1-task1"),
            kind: TaskKind::Producing,
            execution_name: ExecutionName::from("execution1"),
            session: SessionMessage {
                name: SessionName::from("session1"),
                producer: "mallie".to_string(),
                format: "png".to_string(),
                resources: vec![],
                updates: vec![],
            },
            seed: Some(3),
            source: Some(ResourceSourceMessage::Worker {
                worker: WorkerAddress {
                    host: "10.0.0.2".to_string(),
                    port: 5000,
                    resource_port: 9000,
                },
            }),
            inputs: vec![],
        };
        let value = serde_json::to_value(&message)?;
        assert_eq!(
            value,
            json!({
                "name": "execution1-task1",
                "type": "PRODUCING",
                "executionName": "execution1",
                "session": {
                    "name": "session1",
                    "producer": "mallie",
                    "format": "png",
                    "resources": [],
                    "updates": [],
                },
                "seed": 3,
                "source": {
                    "type": "WORKER",
                    "worker": {"host": "10.0.0.2", "port": 5000, "resourcePort": 9000},
                },
            })
        );
        Ok(())
    }
}
