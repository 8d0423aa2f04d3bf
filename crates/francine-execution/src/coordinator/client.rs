use std::sync::Arc;

use francine_common::config::AppConfig;
use francine_server::actor::{ActorHandle, ActorSystem};
use tokio::sync::oneshot;

use crate::cluster::{ClusterProvider, StaticClusterProvider};
use crate::coordinator::actor::{CoordinatorActor, CoordinatorActorOptions};
use crate::coordinator::execution::ExecutionSnapshot;
use crate::coordinator::session::{ExecutionRequest, SessionOptions};
use crate::coordinator::state::ClusterSnapshot;
use crate::coordinator::{CoordinatorEvent, CoordinatorOptions};
use crate::error::ExecutionResult;
use crate::id::{ExecutionName, SessionName};
use crate::protocol::{FailedParams, FinishParams, PongParams};
use crate::transport::{RpcTransportOptions, RpcWorkerTransport, WorkerTransport};

/// A cloneable handle to the coordinator actor.
#[derive(Clone)]
pub struct Coordinator {
    handle: ActorHandle<CoordinatorActor>,
    transport: Arc<dyn WorkerTransport>,
}

impl Coordinator {
    pub fn new(
        system: &mut ActorSystem,
        options: CoordinatorOptions,
        transport: Arc<dyn WorkerTransport>,
        provider: Arc<dyn ClusterProvider>,
    ) -> Self {
        let handle = system.spawn::<CoordinatorActor>(CoordinatorActorOptions {
            options,
            transport: Arc::clone(&transport),
            provider,
        });
        Self { handle, transport }
    }

    /// Starts a coordinator that talks to the statically configured workers over RPC.
    pub fn from_config(system: &mut ActorSystem, config: &AppConfig) -> ExecutionResult<Self> {
        let options = CoordinatorOptions::try_from(config)?;
        let transport = Arc::new(RpcWorkerTransport::new(RpcTransportOptions::from(
            &config.rpc,
        )));
        let provider = Arc::new(StaticClusterProvider::from_config(&config.cluster.workers));
        Ok(Self::new(system, options, transport, provider))
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> CoordinatorEvent,
    ) -> ExecutionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.handle.send(event(tx)).await?;
        Ok(rx.await?)
    }

    pub async fn create_session(&self, options: SessionOptions) -> ExecutionResult<SessionName> {
        self.request(|result| CoordinatorEvent::CreateSession { options, result })
            .await?
    }

    pub async fn delete_session(
        &self,
        name: SessionName,
        owner: Option<String>,
    ) -> ExecutionResult<()> {
        self.request(|result| CoordinatorEvent::DeleteSession {
            name,
            owner,
            result,
        })
        .await?
    }

    pub async fn create_execution(
        &self,
        request: ExecutionRequest,
    ) -> ExecutionResult<ExecutionSnapshot> {
        self.request(|result| CoordinatorEvent::CreateExecution { request, result })
            .await?
    }

    pub async fn get_execution(&self, name: ExecutionName) -> ExecutionResult<ExecutionSnapshot> {
        self.request(|result| CoordinatorEvent::GetExecution { name, result })
            .await?
    }

    /// Downloads the final artifact of a finished execution from the worker holding it.
    pub async fn fetch_result(&self, name: ExecutionName) -> ExecutionResult<Vec<u8>> {
        let (worker, task) = self
            .request(|result| CoordinatorEvent::ResolveResult { name, result })
            .await??;
        self.transport.fetch_result(&worker, &task).await
    }

    pub async fn observe_cluster(&self) -> ExecutionResult<ClusterSnapshot> {
        self.request(|result| CoordinatorEvent::ObserveCluster { result })
            .await
    }

    pub async fn report_pong(&self, params: PongParams) -> ExecutionResult<()> {
        Ok(self.handle.send(params.into()).await?)
    }

    pub async fn report_finish(&self, params: FinishParams) -> ExecutionResult<()> {
        Ok(self.handle.send(params.into()).await?)
    }

    pub async fn report_failed(&self, params: FailedParams) -> ExecutionResult<()> {
        Ok(self.handle.send(params.into()).await?)
    }

    pub async fn shutdown(&self) -> ExecutionResult<()> {
        Ok(self.handle.send(CoordinatorEvent::Shutdown).await?)
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use francine_common::config::StaticWorkerConfig;
    use tokio::sync::mpsc;

    use super::*;
    use crate::cluster::WorkerInstance;
    use crate::coordinator::ExecutionState;
    use crate::error::ExecutionError;
    use crate::id::{TaskName, WorkerName};
    use crate::protocol::{
        FinishKind, PingParams, ResourceDescriptor, ResourceSourceMessage, TaskMessage,
    };
    use crate::task::TaskKind;

    /// Records the calls to workers so that the test can play the worker side.
    struct RecordingTransport {
        pings: mpsc::UnboundedSender<WorkerName>,
        runs: mpsc::UnboundedSender<(WorkerName, TaskMessage)>,
        deletes: mpsc::UnboundedSender<(WorkerName, SessionName)>,
        reject_runs: bool,
    }

    #[async_trait]
    impl WorkerTransport for RecordingTransport {
        async fn ping(&self, worker: &WorkerInstance, _params: PingParams) -> ExecutionResult<()> {
            let _ = self.pings.send(worker.name.clone());
            Ok(())
        }

        async fn run(&self, worker: &WorkerInstance, task: TaskMessage) -> ExecutionResult<()> {
            let _ = self.runs.send((worker.name.clone(), task));
            if self.reject_runs {
                return Err(ExecutionError::RpcError("worker busy".to_string()));
            }
            Ok(())
        }

        async fn delete_cache(
            &self,
            worker: &WorkerInstance,
            session: &SessionName,
        ) -> ExecutionResult<()> {
            let _ = self.deletes.send((worker.name.clone(), session.clone()));
            Ok(())
        }

        async fn fetch_result(
            &self,
            worker: &WorkerInstance,
            task: &TaskName,
        ) -> ExecutionResult<Vec<u8>> {
            Ok(format!("{}/{task}", worker.name).into_bytes())
        }
    }

    #[derive(Default)]
    struct HarnessOptions {
        /// Workers that never answer a ping.
        silent: Vec<WorkerName>,
        reject_runs: bool,
        task_timeout_secs: Option<u64>,
        manage_interval_secs: Option<u64>,
        waiting_pong_timeout: Option<u32>,
    }

    struct Harness {
        coordinator: Coordinator,
        provider: Arc<StaticClusterProvider>,
        silent: Vec<WorkerName>,
        pings: mpsc::UnboundedReceiver<WorkerName>,
        runs: mpsc::UnboundedReceiver<(WorkerName, TaskMessage)>,
        deletes: mpsc::UnboundedReceiver<(WorkerName, SessionName)>,
    }

    impl Harness {
        async fn start(workers: &[&str]) -> ExecutionResult<Self> {
            Self::start_with(workers, HarnessOptions::default()).await
        }

        /// Starts a coordinator and registers every worker that is not silent.
        async fn start_with(workers: &[&str], options: HarnessOptions) -> ExecutionResult<Self> {
            let mut config = AppConfig::load(None)?;
            config.coordinator.listen_host = "127.0.0.1".to_string();
            config.coordinator.listen_port = 0;
            config.execution.task_timeout_secs = options.task_timeout_secs.unwrap_or(1);
            if let Some(secs) = options.manage_interval_secs {
                config.cluster.manage_interval_secs = secs;
            }
            if let Some(count) = options.waiting_pong_timeout {
                config.cluster.waiting_pong_timeout = count;
            }
            config.cluster.workers = workers
                .iter()
                .map(|name| StaticWorkerConfig {
                    name: name.to_string(),
                    host: "127.0.0.1".to_string(),
                    port: 5000,
                    resource_port: 9000,
                })
                .collect();
            let coordinator_options = CoordinatorOptions::try_from(&config)?;
            let (pings_tx, pings_rx) = mpsc::unbounded_channel();
            let (runs_tx, runs_rx) = mpsc::unbounded_channel();
            let (deletes_tx, deletes_rx) = mpsc::unbounded_channel();
            let transport = Arc::new(RecordingTransport {
                pings: pings_tx,
                runs: runs_tx,
                deletes: deletes_tx,
                reject_runs: options.reject_runs,
            });
            let provider = Arc::new(StaticClusterProvider::from_config(&config.cluster.workers));
            let mut system = ActorSystem::new();
            let coordinator = Coordinator::new(
                &mut system,
                coordinator_options,
                transport,
                Arc::clone(&provider) as Arc<dyn ClusterProvider>,
            );
            let mut harness = Self {
                coordinator,
                provider,
                silent: options.silent,
                pings: pings_rx,
                runs: runs_rx,
                deletes: deletes_rx,
            };
            let mut waiting = workers
                .iter()
                .map(|x| WorkerName::from(*x))
                .filter(|x| !harness.silent.contains(x))
                .collect::<Vec<_>>();
            while !waiting.is_empty() {
                let worker = harness.next_ping().await?;
                if let Some(position) = waiting.iter().position(|x| x == &worker) {
                    waiting.remove(position);
                    harness.pong(worker, vec![]).await?;
                }
            }
            Ok(harness)
        }

        async fn next_ping(&mut self) -> ExecutionResult<WorkerName> {
            tokio::time::timeout(Duration::from_secs(5), self.pings.recv())
                .await?
                .ok_or_else(|| ExecutionError::internal("ping channel closed"))
        }

        async fn next_run(&mut self) -> ExecutionResult<(WorkerName, TaskMessage)> {
            tokio::time::timeout(Duration::from_secs(5), self.runs.recv())
                .await?
                .ok_or_else(|| ExecutionError::internal("run channel closed"))
        }

        async fn pong(&self, worker: WorkerName, cached: Vec<SessionName>) -> ExecutionResult<()> {
            self.coordinator
                .report_pong(PongParams {
                    worker_name: worker,
                    logs: vec![],
                    cached_session_names: cached,
                })
                .await
        }

        /// Answers the pings sent so far on behalf of the workers that are not silent.
        async fn answer_pings(&mut self) -> ExecutionResult<()> {
            while let Ok(worker) = self.pings.try_recv() {
                if !self.silent.contains(&worker) {
                    self.pong(worker, vec![]).await?;
                }
            }
            Ok(())
        }

        /// Polls the cluster state until it satisfies the condition.
        async fn wait_for_cluster(
            &mut self,
            condition: impl Fn(&ClusterSnapshot) -> bool,
        ) -> ExecutionResult<ClusterSnapshot> {
            let wait = async {
                loop {
                    self.answer_pings().await?;
                    let cluster = self.coordinator.observe_cluster().await?;
                    if condition(&cluster) {
                        return Ok::<_, ExecutionError>(cluster);
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            };
            tokio::time::timeout(Duration::from_secs(5), wait).await?
        }

        async fn wait_for_end(&self, name: &ExecutionName) -> ExecutionResult<ExecutionSnapshot> {
            let wait = async {
                loop {
                    let snapshot = self.coordinator.get_execution(name.clone()).await?;
                    if snapshot.state.is_terminal() {
                        return Ok::<_, ExecutionError>(snapshot);
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            };
            tokio::time::timeout(Duration::from_secs(5), wait).await?
        }

        async fn create_session(&self) -> ExecutionResult<SessionName> {
            self.coordinator
                .create_session(SessionOptions {
                    producer: "ao".to_string(),
                    format: "png".to_string(),
                    ..Default::default()
                })
                .await
        }

        async fn finish(&self, worker: WorkerName, task: &TaskMessage) -> ExecutionResult<()> {
            let weight = match task.kind {
                TaskKind::Producing => None,
                TaskKind::Reducing => Some(task.inputs.iter().map(|x| x.weight).sum()),
            };
            self.coordinator
                .report_finish(FinishParams {
                    kind: FinishKind::Task,
                    worker_name: worker,
                    task_name: task.name.clone(),
                    elapsed_time: 10,
                    weight,
                    cached_session_names: None,
                })
                .await
        }
    }

    fn request(session: SessionName, parallel: u64) -> ExecutionRequest {
        ExecutionRequest {
            session,
            owner: None,
            parallel,
            update: None,
        }
    }

    #[tokio::test]
    async fn test_execution_runs_to_completion() -> ExecutionResult<()> {
        let mut harness = Harness::start(&["w1", "w2"]).await?;
        let session = harness.create_session().await?;
        let execution = harness
            .coordinator
            .create_execution(request(session, 4))
            .await?;
        assert_eq!(execution.state, ExecutionState::Producing);

        let mut producing = 0;
        let mut reducing = 0;
        let snapshot = loop {
            let (worker, task) = harness.next_run().await?;
            match task.kind {
                TaskKind::Producing => {
                    assert!(task.seed.is_some());
                    producing += 1;
                }
                TaskKind::Reducing => {
                    assert!(!task.inputs.is_empty());
                    reducing += 1;
                }
            }
            harness.finish(worker, &task).await?;
            let snapshot = harness
                .coordinator
                .get_execution(execution.name.clone())
                .await?;
            if snapshot.state.is_terminal() {
                break snapshot;
            }
        };
        assert_eq!(snapshot.state, ExecutionState::Finished);
        assert_eq!(snapshot.progress, 4);
        assert_eq!(producing, 4);
        // Two intermediate groups of two and one final reduction.
        assert_eq!(reducing, 3);
        assert_eq!(snapshot.result.as_ref().map(|x| x.weight), Some(4));

        let data = harness.coordinator.fetch_result(execution.name).await?;
        assert!(!data.is_empty());

        let cluster = harness.coordinator.observe_cluster().await?;
        assert!(cluster.coordinator_port.is_some());
        assert!(cluster.in_flight_tasks.is_empty());
        assert!(cluster.running_executions.is_empty());
        assert!(cluster.workers.iter().all(|x| x.alive));
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_one_running_execution_per_session() -> ExecutionResult<()> {
        let harness = Harness::start(&["w1"]).await?;
        let session = harness.create_session().await?;
        harness
            .coordinator
            .create_execution(request(session.clone(), 2))
            .await?;
        let result = harness
            .coordinator
            .create_execution(request(session.clone(), 2))
            .await;
        assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        let result = harness.coordinator.delete_session(session, None).await;
        assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_task_timeout_evicts_worker() -> ExecutionResult<()> {
        let mut harness = Harness::start(&["w1"]).await?;
        let session = harness.create_session().await?;
        let execution = harness
            .coordinator
            .create_execution(request(session, 1))
            .await?;
        let (worker, _) = harness.next_run().await?;
        assert_eq!(worker, WorkerName::from("w1"));

        // The worker never reports back.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let cluster = harness.coordinator.observe_cluster().await?;
        assert_eq!(cluster.workers.len(), 1);
        assert!(!cluster.workers[0].alive);
        assert!(cluster.in_flight_tasks.is_empty());
        assert_eq!(cluster.pending_tasks, 1);

        // The replacement runs once the worker answers a ping again.
        harness.pong(worker, vec![]).await?;
        let (_, task) = harness.next_run().await?;
        assert_eq!(task.kind, TaskKind::Producing);
        assert_eq!(task.execution_name, execution.name);
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_execution() -> ExecutionResult<()> {
        let harness = Harness::start(&[]).await?;
        let result = harness
            .coordinator
            .get_execution(ExecutionName::from("missing"))
            .await;
        assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        let result = harness
            .coordinator
            .fetch_result(ExecutionName::from("missing"))
            .await;
        assert!(matches!(result, Err(ExecutionError::InvalidRequest(_))));
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_dispatch_evicts_worker() -> ExecutionResult<()> {
        let options = HarnessOptions {
            reject_runs: true,
            ..Default::default()
        };
        let mut harness = Harness::start_with(&["w1"], options).await?;
        let session = harness.create_session().await?;
        let execution = harness
            .coordinator
            .create_execution(request(session, 1))
            .await?;
        let (worker, first) = harness.next_run().await?;
        let cluster = harness
            .wait_for_cluster(|x| x.workers.iter().all(|w| !w.alive))
            .await?;
        assert!(cluster.in_flight_tasks.is_empty());
        assert_eq!(cluster.pending_tasks, 1);

        // The replacement is rejected too, which is one failure more than allowed.
        harness.pong(worker, vec![]).await?;
        let (_, second) = harness.next_run().await?;
        assert_ne!(second.name, first.name);
        let snapshot = harness.wait_for_end(&execution.name).await?;
        assert_eq!(snapshot.state, ExecutionState::Failed);
        assert!(snapshot
            .error
            .as_deref()
            .is_some_and(|x| x.starts_with("dispatch failed: ")));
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_busy_worker_lost_from_cluster() -> ExecutionResult<()> {
        let options = HarnessOptions {
            task_timeout_secs: Some(30),
            manage_interval_secs: Some(1),
            waiting_pong_timeout: Some(100),
            ..Default::default()
        };
        let mut harness = Harness::start_with(&["w1", "w2"], options).await?;
        let session = harness.create_session().await?;
        let execution = harness
            .coordinator
            .create_execution(request(session, 1))
            .await?;
        let (first_worker, first) = harness.next_run().await?;
        harness.provider.destroy_instance(&first_worker).await?;

        let (second_worker, second) = harness.next_run().await?;
        assert_ne!(second_worker, first_worker);
        assert_ne!(second.name, first.name);
        let cluster = harness.coordinator.observe_cluster().await?;
        assert_eq!(cluster.workers.len(), 1);
        assert_eq!(cluster.workers[0].name, second_worker);
        assert_eq!(cluster.in_flight_tasks, vec![second.name.clone()]);

        harness.provider.destroy_instance(&second_worker).await?;
        let snapshot = harness.wait_for_end(&execution.name).await?;
        assert_eq!(snapshot.state, ExecutionState::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("worker lost"));
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_worker_is_destroyed() -> ExecutionResult<()> {
        let silent = WorkerName::from("w2");
        let options = HarnessOptions {
            silent: vec![silent.clone()],
            manage_interval_secs: Some(1),
            waiting_pong_timeout: Some(1),
            ..Default::default()
        };
        let mut harness = Harness::start_with(&["w1", "w2"], options).await?;
        let cluster = harness
            .wait_for_cluster(|x| x.workers.iter().all(|w| w.name != silent))
            .await?;
        assert_eq!(cluster.workers.len(), 1);
        assert_eq!(cluster.workers[0].name, WorkerName::from("w1"));
        assert!(cluster.workers[0].alive);

        let instances = harness.provider.list_instances().await?;
        let names = instances.into_iter().map(|x| x.name).collect::<Vec<_>>();
        assert_eq!(names, vec![WorkerName::from("w1")]);
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_session_clears_worker_caches() -> ExecutionResult<()> {
        let mut harness = Harness::start(&["w1", "w2"]).await?;
        let session = harness.create_session().await?;
        harness
            .pong(WorkerName::from("w1"), vec![session.clone()])
            .await?;
        harness
            .coordinator
            .delete_session(session.clone(), None)
            .await?;

        let deleted = tokio::time::timeout(Duration::from_secs(5), harness.deletes.recv()).await?;
        assert_eq!(deleted, Some((WorkerName::from("w1"), session)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.deletes.try_recv().is_err());
        harness.coordinator.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_producing_fans_out_after_fetching() -> ExecutionResult<()> {
        let mut harness = Harness::start(&["w1", "w2"]).await?;
        let session = harness
            .coordinator
            .create_session(SessionOptions {
                resources: vec![ResourceDescriptor {
                    kind: "url".to_string(),
                    location: "http://storage.local/scene.tar".to_string(),
                }],
                producer: "ao".to_string(),
                format: "png".to_string(),
                ..Default::default()
            })
            .await?;
        let execution = harness
            .coordinator
            .create_execution(request(session, 4))
            .await?;
        assert_eq!(execution.state, ExecutionState::Fetching);

        let (fetcher, first) = harness.next_run().await?;
        assert_eq!(first.source, Some(ResourceSourceMessage::Original));
        // The other worker stays idle while the resources are fetched.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(harness.runs.try_recv().is_err());

        harness
            .coordinator
            .report_finish(FinishParams {
                kind: FinishKind::Fetching,
                worker_name: fetcher.clone(),
                task_name: first.name.clone(),
                elapsed_time: 150,
                weight: None,
                cached_session_names: None,
            })
            .await?;
        harness.finish(fetcher, &first).await?;

        let mut producing = 1;
        let snapshot = loop {
            let (worker, task) = harness.next_run().await?;
            if task.kind == TaskKind::Producing {
                assert!(matches!(
                    task.source,
                    Some(ResourceSourceMessage::Worker { .. })
                ));
                producing += 1;
            }
            harness.finish(worker, &task).await?;
            let snapshot = harness
                .coordinator
                .get_execution(execution.name.clone())
                .await?;
            if snapshot.state.is_terminal() {
                break snapshot;
            }
        };
        assert_eq!(snapshot.state, ExecutionState::Finished);
        assert_eq!(producing, 4);
        assert!(snapshot.time.fetching > 0);
        harness.coordinator.shutdown().await?;
        Ok(())
    }
}
