use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use fastrace::prelude::{Span, SpanContext};
use francine_telemetry::common::SpanAssociation;
use log::{error, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const ACTOR_CHANNEL_SIZE: usize = 64;

/// An actor owns its state exclusively and processes one message at a time.
/// All the state transitions happen inside [`Actor::receive`], which must not block.
/// Any asynchronous work is spawned via the [`ActorContext`] and reports back
/// to the actor as a message.
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    type Message: SpanAssociation + Send + 'static;
    type Options: Send + 'static;

    fn new(options: Self::Options) -> Self;

    fn start(&mut self, _ctx: &mut ActorContext<Self>) {}

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;

    async fn stop(self) {}
}

pub enum ActorAction {
    Continue,
    Warn(String),
    Fail(String),
    Stop,
}

impl ActorAction {
    pub fn warn(message: impl Display) -> Self {
        ActorAction::Warn(message.to_string())
    }

    pub fn fail(message: impl Display) -> Self {
        ActorAction::Fail(message.to_string())
    }
}

pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: ActorHandle<T>) -> Self {
        Self {
            handle,
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Sends a message to the actor itself.
    /// The message is delivered after the current message is processed.
    pub fn send(&mut self, message: T::Message) {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            if handle.send(message).await.is_err() {
                warn!("failed to send message to the stopped actor");
            }
        });
    }

    /// Sends a message to the actor itself after the delay.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            // The actor may have stopped in the meantime.
            let _ = handle.send(message).await;
        });
    }

    /// Spawns a background task that is aborted when the actor stops.
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(task);
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("actor task panicked: {e}");
                }
            }
        }
    }
}

pub struct ActorHandle<T>
where
    T: Actor,
{
    sender: mpsc::Sender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T> Clone for ActorHandle<T>
where
    T: Actor,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    pub fn new(options: T::Options) -> Self {
        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (stopped_tx, stopped_rx) = watch::channel::<bool>(false);
        let actor = T::new(options);
        let out = Self {
            sender: tx,
            stopped: stopped_rx,
        };
        let handle = out.clone();
        tokio::spawn(async move {
            Self::run(actor, handle, rx).await;
            let _ = stopped_tx.send(true);
        });
        out
    }

    async fn run(mut actor: T, handle: ActorHandle<T>, mut rx: mpsc::Receiver<T::Message>) {
        let mut ctx = ActorContext::new(handle);
        actor.start(&mut ctx);
        while let Some(message) = rx.recv().await {
            let span = Span::root(message.name(), SpanContext::random())
                .with_properties(|| message.properties());
            let action = {
                let _guard = span.set_local_parent();
                actor.receive(&mut ctx, message)
            };
            match action {
                ActorAction::Continue => {}
                ActorAction::Warn(message) => {
                    warn!("{message}");
                }
                ActorAction::Fail(message) => {
                    error!("{message}");
                    break;
                }
                ActorAction::Stop => {
                    break;
                }
            }
            ctx.reap();
        }
        actor.stop().await;
        ctx.tasks.shutdown().await;
    }

    pub async fn send(&self, message: T::Message) -> Result<(), mpsc::error::SendError<T::Message>> {
        self.sender.send(message).await
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped in this case,
        // which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

/// A collection of actors that are joined together on shutdown.
#[derive(Default)]
pub struct ActorSystem {
    stopped: Vec<watch::Receiver<bool>>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let handle = ActorHandle::<T>::new(options);
        self.stopped.push(handle.stopped.clone());
        handle
    }

    pub async fn join(self) {
        let waits = self.stopped.into_iter().map(|mut x| async move {
            let _ = x.wait_for(|x| *x).await;
        });
        futures::future::join_all(waits).await;
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use tokio::sync::oneshot;

    use super::*;

    struct TestActor {
        count: usize,
    }

    enum TestMessage {
        Echo {
            value: String,
            reply: oneshot::Sender<String>,
        },
        Tick,
        Count {
            reply: oneshot::Sender<usize>,
        },
        Crash,
        Stop,
    }

    impl SpanAssociation for TestMessage {
        fn name(&self) -> Cow<'static, str> {
            "TestMessage".into()
        }

        fn properties(&self) -> impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)> {
            Vec::<(Cow<'static, str>, Cow<'static, str>)>::new()
        }
    }

    impl Actor for TestActor {
        type Message = TestMessage;
        type Options = ();

        fn new(_options: Self::Options) -> Self {
            Self { count: 0 }
        }

        fn receive(&mut self, ctx: &mut ActorContext<Self>, message: TestMessage) -> ActorAction {
            match message {
                TestMessage::Echo { value, reply } => {
                    let _ = reply.send(value.to_uppercase());
                    ctx.send(TestMessage::Tick);
                    ActorAction::Continue
                }
                TestMessage::Tick => {
                    self.count += 1;
                    if self.count < 3 {
                        ctx.send_with_delay(TestMessage::Tick, Duration::from_millis(1));
                    }
                    ActorAction::Continue
                }
                TestMessage::Count { reply } => {
                    let _ = reply.send(self.count);
                    ActorAction::Continue
                }
                TestMessage::Crash => ActorAction::fail("crashed"),
                TestMessage::Stop => ActorAction::Stop,
            }
        }
    }

    #[tokio::test]
    async fn test_actor_handle_send() {
        let handle = ActorHandle::<TestActor>::new(());
        let (tx, rx) = oneshot::channel();
        let result = handle
            .send(TestMessage::Echo {
                value: "hello".to_string(),
                reply: tx,
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(rx.await, Ok("HELLO".to_string()));
    }

    #[tokio::test]
    async fn test_actor_context_delayed_messages() {
        let handle = ActorHandle::<TestActor>::new(());
        let (tx, _rx) = oneshot::channel();
        let _ = handle
            .send(TestMessage::Echo {
                value: "tick".to_string(),
                reply: tx,
            })
            .await;
        let mut count = 0;
        for _ in 0..100 {
            let (tx, rx) = oneshot::channel();
            let _ = handle.send(TestMessage::Count { reply: tx }).await;
            count = rx.await.unwrap_or_default();
            if count == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_actor_fail_stops_actor() {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<TestActor>(());
        let result = handle.send(TestMessage::Crash).await;
        assert!(result.is_ok());
        system.join().await;
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_actor_handle_wait_for_stop() {
        let handle = ActorHandle::<TestActor>::new(());
        let result = handle.send(TestMessage::Stop).await;
        assert!(result.is_ok());

        handle.clone().wait_for_stop().await;
        // Multiple handles should be able to wait for the actor to stop.
        handle.wait_for_stop().await;
    }
}
