use crate::domain::events::EngineEvent;
use crate::domain::ports::NotificationSink;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Fans engine events out to every live subscriber.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// only logged, and slow subscribers lag rather than hold up the engine.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, event: EngineEvent) {
        info!(event = %event.kind, invoice_id = %event.invoice.id, "{}", event.message);
        if self.sender.send(event).is_err() {
            debug!("no subscribers for event");
        }
    }
}
