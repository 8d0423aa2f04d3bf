use std::borrow::Cow;

/// Common span attribute names.
pub struct SpanAttribute;

impl SpanAttribute {
    pub const EXCEPTION_MESSAGE: &'static str = "exception.message";
    pub const RETRY_ATTEMPT: &'static str = "retry.attempt";
    pub const CLUSTER_COORDINATOR_PORT: &'static str = "cluster.coordinator.port";
    pub const CLUSTER_WORKER_NAME: &'static str = "cluster.worker.name";
    pub const CLUSTER_WORKER_COUNT: &'static str = "cluster.worker.count";
    pub const EXECUTION_SESSION_NAME: &'static str = "execution.session.name";
    pub const EXECUTION_NAME: &'static str = "execution.name";
    pub const EXECUTION_TASK_NAME: &'static str = "execution.task.name";
    pub const EXECUTION_TASK_REASON: &'static str = "execution.task.reason";
    pub const EXECUTION_TASK_ELAPSED_MS: &'static str = "execution.task.elapsed_ms";
    pub const EXECUTION_TASK_WEIGHT: &'static str = "execution.task.weight";
    pub const EXECUTION_DISPATCH_ID: &'static str = "execution.dispatch.id";
    pub const EXECUTION_PARALLEL: &'static str = "execution.parallel";
}

/// A trait for associating an object with a span.
/// The extracted information from the associated object
/// can be used for span names and properties.
pub trait SpanAssociation {
    /// The name of the object associated with the span.
    fn name(&self) -> Cow<'static, str>;

    /// The properties of the object associated with the span.
    fn properties(&self) -> impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)>;
}
