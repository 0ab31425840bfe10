//! On-demand schedule requests.

use outage_sources::Day;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleIntent {
    /// Reply to `chat_id` with the schedule for `day`.
    GetSchedule { day: Day, chat_id: i64 },
    /// Send the schedule for `day` to every enabled group now.
    BroadcastSchedule { day: Day },
}

impl ScheduleIntent {
    pub fn day(&self) -> Day {
        match self {
            Self::GetSchedule { day, .. } | Self::BroadcastSchedule { day } => *day,
        }
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 32;

pub struct IntentBroadcaster {
    sender: broadcast::Sender<ScheduleIntent>,
}

impl IntentBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleIntent> {
        self.sender.subscribe()
    }

    /// Returns the number of listeners that received the intent.
    pub fn publish(&self, intent: ScheduleIntent) -> usize {
        tracing::debug!("Publishing schedule intent: {:?}", intent);
        self.sender.send(intent).unwrap_or(0)
    }
}

impl Default for IntentBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let intents = IntentBroadcaster::new();
        assert_eq!(intents.publish(ScheduleIntent::BroadcastSchedule { day: Day::Today }), 0);

        let mut rx = intents.subscribe();
        let intent = ScheduleIntent::GetSchedule {
            day: Day::Tomorrow,
            chat_id: 42,
        };
        assert_eq!(intents.publish(intent), 1);
        assert_eq!(rx.recv().await.unwrap(), intent);
        assert_eq!(intent.day(), Day::Tomorrow);
    }
}
