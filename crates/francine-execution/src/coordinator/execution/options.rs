use std::time::Duration;

use crate::coordinator::CoordinatorOptions;

#[readonly::make]
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub task_timeout: Duration,
    pub task_min_timeout: Duration,
    pub reducing_max_retries: usize,
    pub producing_fail_ratio: f64,
}

impl From<&CoordinatorOptions> for ExecutionOptions {
    fn from(options: &CoordinatorOptions) -> Self {
        Self {
            task_timeout: options.task_timeout,
            task_min_timeout: options.task_min_timeout,
            reducing_max_retries: options.reducing_max_retries,
            producing_fail_ratio: options.producing_fail_ratio,
        }
    }
}
