//! Ordered, unbounded, single-consumer stream of [`UpdateEvent`]s.
//!
//! Producers (the dispatcher and every printer task) hold cheap clones of
//! [`UpdateSender`]; emitting never blocks and is a no-op once the consumer is gone.
//! Every log event is mirrored to `tracing` so headless runs still get output.

use chrono::Local;
use printflow_shared::{LogEntry, LogLevel, UpdateEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub fn update_channel() -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSender { tx }, UpdateReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: UnboundedSender<UpdateEvent>,
}

impl UpdateSender {
    pub fn emit(&self, event: UpdateEvent) {
        // A dropped consumer only means nobody is watching anymore.
        let _ = self.tx.send(event);
    }

    pub fn log(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(source = %source, "{}", message),
            LogLevel::Warn => tracing::warn!(source = %source, "{}", message),
            LogLevel::Error => tracing::error!(source = %source, "{}", message),
        }
        self.emit(UpdateEvent::Log(LogEntry {
            timestamp: Local::now(),
            level,
            source: source.to_string(),
            message,
        }));
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, source, message);
    }

    pub fn warn(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, source, message);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, source, message);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct UpdateReceiver {
    rx: UnboundedReceiver<UpdateEvent>,
}

impl UpdateReceiver {
    /// Waits for the next event. Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        self.rx.recv().await
    }

    /// Takes every event that is available right now, in emission order.
    pub fn drain(&mut self) -> Vec<UpdateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
