use crate::coordinator::CoordinatorOptions;

#[readonly::make]
pub struct WorkerRegistryOptions {
    pub waiting_pong_timeout: u32,
}

impl From<&CoordinatorOptions> for WorkerRegistryOptions {
    fn from(options: &CoordinatorOptions) -> Self {
        Self {
            waiting_pong_timeout: options.waiting_pong_timeout,
        }
    }
}
