use fastrace::local::LocalSpan;
use fastrace::Event;
use log::{Log, Metadata, Record};

/// A logger that writes to `env_logger` and, when enabled,
/// attaches every emitted record to the current local span as an event.
pub struct CoordinatorLogger {
    primary: env_logger::Logger,
    span_events: bool,
}

impl CoordinatorLogger {
    pub fn new(primary: env_logger::Logger, span_events: bool) -> Self {
        Self {
            primary,
            span_events,
        }
    }

    pub fn filter(&self) -> log::LevelFilter {
        self.primary.filter()
    }
}

impl Log for CoordinatorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.primary.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.primary.enabled(record.metadata()) {
            return;
        }
        self.primary.log(record);
        if self.span_events {
            let event = Event::new(record.level().as_str()).with_properties(|| {
                [
                    ("target", record.target().to_string()),
                    ("message", record.args().to_string()),
                ]
            });
            LocalSpan::add_event(event);
        }
    }

    fn flush(&self) {
        self.primary.flush();
    }
}
