//! Notifications: typed change events, player-addressed system messages,
//! and an in-process publish/subscribe bus.
//!
//! Presentation layers subscribe per player or per tile. The bus is a trait
//! so the server can back it with tables while tests and the harness use
//! [`ChannelBus`].

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
    Success,
    Warning,
}

impl Severity {
    pub fn to_u8(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Error => 1,
            Severity::Success => 2,
            Severity::Warning => 3,
        }
    }

    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => Severity::Error,
            2 => Severity::Success,
            3 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// What a message is about, so clients can link it to a tile or node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub kind: String,
    pub id: String,
    pub x: i32,
    pub y: i32,
}

impl ActionContext {
    pub fn resource(resource_id: &str, x: i32, y: i32) -> Self {
        Self {
            kind: "resource".into(),
            id: resource_id.into(),
            x,
            y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: u64,
    pub player_id: u64,
    pub message: String,
    pub severity: Severity,
    pub sent_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionContext>,
}

/// Every notification kind the engine produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    PlayerUpdated { player_id: u64 },
    TileUpdated { x: i32, y: i32 },
    SystemMessage(SystemMessage),
}

impl GameEvent {
    /// The player this event is addressed to, if any.
    pub fn player(&self) -> Option<u64> {
        match self {
            GameEvent::PlayerUpdated { player_id } => Some(*player_id),
            GameEvent::SystemMessage(msg) => Some(msg.player_id),
            GameEvent::TileUpdated { .. } => None,
        }
    }

    pub fn tile(&self) -> Option<(i32, i32)> {
        match self {
            GameEvent::TileUpdated { x, y } => Some((*x, *y)),
            GameEvent::SystemMessage(msg) => msg.action.as_ref().map(|a| (a.x, a.y)),
            GameEvent::PlayerUpdated { .. } => None,
        }
    }
}

/// Subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    All,
    Player(u64),
    Tile(i32, i32),
}

impl Topic {
    pub fn matches(&self, event: &GameEvent) -> bool {
        match *self {
            Topic::All => true,
            Topic::Player(id) => event.player() == Some(id),
            Topic::Tile(x, y) => matches!(event, GameEvent::TileUpdated { .. })
                && event.tile() == Some((x, y)),
        }
    }
}

/// Produced interface for change notifications. Publishing is best-effort
/// and never fails the caller.
pub trait EventBus {
    fn publish(&self, event: GameEvent);
}

/// Persisted system messages with per-player retention.
pub trait MessageLog {
    /// Store a message and return it with its assigned id.
    fn append(
        &self,
        player_id: u64,
        severity: Severity,
        message: String,
        action: Option<ActionContext>,
        now: u64,
    ) -> Result<SystemMessage, StoreError>;

    /// A player's messages, newest first.
    fn messages(&self, player_id: u64) -> Result<Vec<SystemMessage>, StoreError>;

    /// Keep only the newest `keep` messages per player; returns rows removed.
    fn prune(&self, keep: usize) -> Result<usize, StoreError>;
}

/// Store a message and publish it.
pub fn notify<S, B>(
    log: &S,
    bus: &B,
    player_id: u64,
    severity: Severity,
    message: String,
    action: Option<ActionContext>,
    now: u64,
) -> Result<SystemMessage, StoreError>
where
    S: MessageLog + ?Sized,
    B: EventBus + ?Sized,
{
    let msg = log.append(player_id, severity, message, action, now)?;
    bus.publish(GameEvent::SystemMessage(msg.clone()));
    Ok(msg)
}

/// In-process bus fanning events out to `mpsc` subscribers.
/// Subscribers whose receiver was dropped are forgotten on the next publish.
#[derive(Default)]
pub struct ChannelBus {
    subscribers: Mutex<Vec<(Topic, Sender<GameEvent>)>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> Receiver<GameEvent> {
        let (tx, rx) = channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push((topic, tx));
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl EventBus for ChannelBus {
    fn publish(&self, event: GameEvent) {
        let Ok(mut subs) = self.subscribers.lock() else {
            log::error!("Event bus lock poisoned; dropping {:?}", event);
            return;
        };
        subs.retain(|(topic, tx)| !topic.matches(&event) || tx.send(event.clone()).is_ok());
    }
}

/// Bus that discards everything.
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: GameEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(player_id: u64) -> GameEvent {
        GameEvent::SystemMessage(SystemMessage {
            id: 1,
            player_id,
            message: "hi".into(),
            severity: Severity::Info,
            sent_at: 0,
            action: Some(ActionContext::resource("resource_wood", 3, 4)),
        })
    }

    #[test]
    fn test_topic_filtering() {
        let bus = ChannelBus::new();
        let p1 = bus.subscribe(Topic::Player(1));
        let tile = bus.subscribe(Topic::Tile(3, 4));
        let all = bus.subscribe(Topic::All);

        bus.publish(GameEvent::PlayerUpdated { player_id: 2 });
        bus.publish(message(1));
        bus.publish(GameEvent::TileUpdated { x: 3, y: 4 });

        assert_eq!(p1.try_iter().count(), 1);
        assert_eq!(
            tile.try_iter().collect::<Vec<_>>(),
            vec![GameEvent::TileUpdated { x: 3, y: 4 }]
        );
        assert_eq!(all.try_iter().count(), 3);
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let bus = ChannelBus::new();
        let rx = bus.subscribe(Topic::All);
        drop(rx);
        bus.publish(GameEvent::PlayerUpdated { player_id: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_severity_roundtrip() {
        for s in [
            Severity::Info,
            Severity::Error,
            Severity::Success,
            Severity::Warning,
        ] {
            assert_eq!(Severity::from_u8(s.to_u8()), s);
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_string(&GameEvent::TileUpdated { x: 1, y: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"tile_updated","x":1,"y":2}"#);
    }
}
