// src/logger/layer.rs

//! Bridge from `tracing` events into a [`Logger`]

use super::{Level, Logger};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Forwards every event to a [`Logger`], which applies its own level filter
pub struct LoggerLayer {
    logger: Arc<dyn Logger>,
}

impl LoggerLayer {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

/// Renders the `message` field followed by `key=value` for the others
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LoggerLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = Level::from(*event.metadata().level());
        if !self.logger.level_setting().allows(level) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut line = visitor.message;
        line.push_str(&visitor.fields);
        self.logger.log_line(level, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LevelSetting, StringLogger};
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_reach_logger() {
        let logger = Arc::new(StringLogger::new(LevelSetting::Set(Level::Info)));
        let subscriber =
            tracing_subscriber::registry().with(LoggerLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(id = 3, "Transaction started");
            tracing::debug!("filtered out");
            tracing::warn!("lock busy");
        });

        let contents = logger.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO Transaction started id=3"));
        assert!(lines[1].ends_with("WARNING lock busy"));
    }
}
