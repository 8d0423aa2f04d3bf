use crate::coordinator::CoordinatorOptions;

#[readonly::make]
pub struct TaskSchedulerOptions {
    pub prioritize_reducing: bool,
}

impl From<&CoordinatorOptions> for TaskSchedulerOptions {
    fn from(options: &CoordinatorOptions) -> Self {
        Self {
            prioritize_reducing: options.prioritize_reducing,
        }
    }
}
