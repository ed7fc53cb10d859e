//! Connection registry and event fan-out
//!
//! The hub is the only holder of each connection's outbound `Sender`.
//! Removing a connection from the registry drops its sender, which ends
//! that connection's actor loop once its queue drains.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use uuid::Uuid;

use super::SubscribeError;
use super::channel::Channel;
use super::events::DomainEvent;
use super::protocol::ServerMessage;
use crate::auth::{IdentityVerifier, Principal};
use crate::config::Config;

pub type ConnectionId = Uuid;

/// Close code sent to connections pruned by the heartbeat.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Frames queued for a connection's actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-serialized JSON text frame
    Message(Arc<str>),
    Ping,
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub queue_capacity: usize,
    pub heartbeat_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            heartbeat_timeout: Duration::from_secs(90),
        }
    }
}

impl From<&Config> for HubConfig {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.ws_send_queue,
            heartbeat_timeout: config.ws_heartbeat_timeout,
        }
    }
}

/// Returned by [`Hub::connect`]; owned by the connection actor.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub principal: Option<Principal>,
    pub receiver: mpsc::Receiver<Outbound>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pinged: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub total_connections: usize,
    pub channels: BTreeMap<String, usize>,
}

struct ConnectionState {
    sender: mpsc::Sender<Outbound>,
    principal: Option<Principal>,
    channels: HashSet<Channel>,
    last_seen: Instant,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionState>,
    channels: HashMap<Channel, HashSet<ConnectionId>>,
}

impl Registry {
    fn remove(&mut self, id: ConnectionId) -> Vec<Channel> {
        let Some(state) = self.connections.remove(&id) else {
            return Vec::new();
        };
        let mut left: Vec<Channel> = state.channels.into_iter().collect();
        left.sort();
        for channel in &left {
            self.detach(id, channel);
        }
        left
    }

    fn detach(&mut self, id: ConnectionId, channel: &Channel) {
        if let Some(members) = self.channels.get_mut(channel) {
            members.remove(&id);
            if members.is_empty() {
                self.channels.remove(channel);
            }
        }
    }
}

pub struct Hub {
    registry: RwLock<Registry>,
    verifier: Arc<dyn IdentityVerifier>,
    config: HubConfig,
}

impl Hub {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, config: HubConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            verifier,
            config,
        }
    }

    /// Register a connection, authenticating the credential if one is given.
    ///
    /// An invalid credential yields an anonymous connection.
    pub fn connect(&self, credential: Option<&str>) -> ConnectionHandle {
        let principal = credential.and_then(|token| match self.verifier.verify(token) {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    "WebSocket credential rejected, continuing anonymously"
                );
                None
            }
        });
        self.register(principal)
    }

    pub fn register(&self, principal: Option<Principal>) -> ConnectionHandle {
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let id = Uuid::new_v4();

        self.registry.write().connections.insert(
            id,
            ConnectionState {
                sender,
                principal: principal.clone(),
                channels: HashSet::new(),
                last_seen: Instant::now(),
            },
        );

        tracing::debug!(
            connection = %id,
            user_id = principal.as_ref().map(|p| p.user_id.as_str()),
            "WebSocket connection registered"
        );

        ConnectionHandle {
            id,
            principal,
            receiver,
        }
    }

    /// Idempotent. Returns whether the subscription is new.
    pub fn subscribe(&self, id: ConnectionId, channel: &Channel) -> Result<bool, SubscribeError> {
        let mut registry = self.registry.write();
        let state = registry
            .connections
            .get_mut(&id)
            .ok_or(SubscribeError::UnknownConnection)?;

        if let Some(owner) = channel.owner() {
            match &state.principal {
                None => return Err(SubscribeError::AuthenticationRequired),
                Some(principal) if principal.user_id != owner => {
                    return Err(SubscribeError::Unauthorized);
                }
                Some(_) => {}
            }
        }

        let added = state.channels.insert(channel.clone());
        registry
            .channels
            .entry(channel.clone())
            .or_default()
            .insert(id);

        if added {
            tracing::debug!(connection = %id, channel = %channel, "Subscribed");
        }
        Ok(added)
    }

    /// Safe for unknown connections and channels never joined.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &Channel) -> bool {
        let mut registry = self.registry.write();
        let removed = registry
            .connections
            .get_mut(&id)
            .is_some_and(|state| state.channels.remove(channel));
        registry.detach(id, channel);
        removed
    }

    /// Remove every trace of the connection. Returns the channels it left.
    pub fn disconnect(&self, id: ConnectionId) -> Vec<Channel> {
        let left = self.registry.write().remove(id);
        if !left.is_empty() {
            tracing::debug!(
                connection = %id,
                channels = left.len(),
                "WebSocket connection removed"
            );
        }
        left
    }

    pub fn is_subscribed(&self, id: ConnectionId, channel: &Channel) -> bool {
        self.registry
            .read()
            .connections
            .get(&id)
            .is_some_and(|state| state.channels.contains(channel))
    }

    /// Record inbound activity for the heartbeat.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(state) = self.registry.write().connections.get_mut(&id) {
            state.last_seen = Instant::now();
        }
    }

    /// Fan an event out to its target channels.
    ///
    /// Each connection receives at most one copy, labelled with the first
    /// matching channel. Full or closed queues are skipped and the
    /// connection is removed after delivery finishes. Returns the number
    /// of connections the event was queued for.
    pub fn publish(&self, event: &DomainEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let registry = self.registry.read();
            let mut seen = HashSet::new();

            for channel in &event.channels {
                let Some(members) = registry.channels.get(channel) else {
                    continue;
                };

                let mut frame: Option<Arc<str>> = None;
                for id in members {
                    if !seen.insert(*id) {
                        continue;
                    }
                    let Some(state) = registry.connections.get(id) else {
                        continue;
                    };

                    let frame = frame
                        .get_or_insert_with(|| {
                            Arc::from(ServerMessage::event(event, &channel.to_string()).to_json())
                        })
                        .clone();

                    match state.sender.try_send(Outbound::Message(frame)) {
                        Ok(()) => delivered += 1,
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(
                                connection = %id,
                                channel = %channel,
                                "Send queue full, dropping connection"
                            );
                            dead.push(*id);
                        }
                        Err(TrySendError::Closed(_)) => dead.push(*id),
                    }
                }
            }
        }

        for id in &dead {
            self.disconnect(*id);
        }

        tracing::debug!(
            event = %event.kind,
            delivered = delivered,
            dropped = dead.len(),
            "Event published"
        );
        delivered
    }

    /// Ping live connections and prune those silent past the timeout.
    pub fn heartbeat(&self) -> HeartbeatReport {
        let now = Instant::now();
        let mut report = HeartbeatReport::default();
        let mut stale = Vec::new();

        {
            let registry = self.registry.read();
            for (id, state) in &registry.connections {
                if now.duration_since(state.last_seen) > self.config.heartbeat_timeout {
                    let _ = state.sender.try_send(Outbound::Close {
                        code: CLOSE_GOING_AWAY,
                        reason: "Heartbeat timeout".to_string(),
                    });
                    stale.push(*id);
                    continue;
                }
                match state.sender.try_send(Outbound::Ping) {
                    Ok(()) => report.pinged += 1,
                    // A full queue is a slow reader; the timeout decides.
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }

        for id in stale {
            self.disconnect(id);
            report.pruned += 1;
        }

        if report.pruned > 0 {
            tracing::info!(pruned = report.pruned, "Pruned dead WebSocket connections");
        }
        report
    }

    pub fn connection_count(&self) -> usize {
        self.registry.read().connections.len()
    }

    pub fn stats(&self) -> HubStats {
        let registry = self.registry.read();
        HubStats {
            total_connections: registry.connections.len(),
            channels: registry
                .channels
                .iter()
                .map(|(channel, members)| (channel.to_string(), members.len()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtIdentity;
    use crate::broadcast::events::Action;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn hub() -> Hub {
        hub_with(HubConfig::default())
    }

    fn hub_with(config: HubConfig) -> Hub {
        Hub::new(Arc::new(JwtIdentity::new("test-secret", 60)), config)
    }

    fn user(id: &str) -> Option<Principal> {
        Some(Principal {
            user_id: id.to_string(),
            email: None,
        })
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn book_event(id: i64) -> DomainEvent {
        DomainEvent::book(Action::Updated, id, json!({"title": "Dune"}))
    }

    #[test]
    fn test_subscribe_then_publish_delivers_once() {
        let hub = hub();
        let mut conn = hub.register(None);
        hub.subscribe(conn.id, &Channel::collection("books")).unwrap();

        assert_eq!(hub.publish(&book_event(1)), 1);

        let frames = drain(&mut conn.receiver);
        assert_eq!(frames.len(), 1);
        let Outbound::Message(text) = &frames[0] else {
            panic!("expected a text frame, got {:?}", frames[0]);
        };
        let json: Value = serde_json::from_str(text).unwrap();
        assert_eq!(json["type"], "book.updated");
        assert_eq!(json["channel"], "books");
        assert_eq!(json["data"]["book_id"], 1);
    }

    #[test]
    fn test_unsubscribe_before_publish_delivers_nothing() {
        let hub = hub();
        let mut conn = hub.register(None);
        let books = Channel::collection("books");
        hub.subscribe(conn.id, &books).unwrap();
        assert!(hub.unsubscribe(conn.id, &books));

        assert_eq!(hub.publish(&book_event(1)), 0);
        assert!(drain(&mut conn.receiver).is_empty());
        assert!(hub.stats().channels.is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let hub = hub();
        let mut conn = hub.register(None);
        let books = Channel::collection("books");
        assert!(hub.subscribe(conn.id, &books).unwrap());
        assert!(!hub.subscribe(conn.id, &books).unwrap());

        assert_eq!(hub.stats().channels.get("books"), Some(&1));
        hub.publish(&book_event(1));
        assert_eq!(drain(&mut conn.receiver).len(), 1);
    }

    #[test]
    fn test_private_channel_requires_matching_principal() {
        let hub = hub();
        let channel = Channel::user(42);

        let mut anonymous = hub.register(None);
        assert_matches!(
            hub.subscribe(anonymous.id, &channel),
            Err(SubscribeError::AuthenticationRequired)
        );

        let mut other = hub.register(user("7"));
        assert_matches!(hub.subscribe(other.id, &channel), Err(SubscribeError::Unauthorized));

        let mut owner = hub.register(user("42"));
        assert!(hub.subscribe(owner.id, &channel).unwrap());

        let event = DomainEvent::user_notification(42, "welcome", json!({}));
        assert_eq!(hub.publish(&event), 1);
        assert!(drain(&mut anonymous.receiver).is_empty());
        assert!(drain(&mut other.receiver).is_empty());
        assert_eq!(drain(&mut owner.receiver).len(), 1);
    }

    #[test]
    fn test_connect_with_token_establishes_principal() {
        let identity = JwtIdentity::new("test-secret", 60);
        let token = identity.issue("42", None).unwrap();
        let hub = hub();

        let conn = hub.connect(Some(&token));
        assert_eq!(conn.principal.as_ref().map(|p| p.user_id.as_str()), Some("42"));
        assert!(hub.subscribe(conn.id, &Channel::user(42)).is_ok());

        let bad = hub.connect(Some("garbage"));
        assert!(bad.principal.is_none());
    }

    #[test]
    fn test_disconnect_removes_from_all_channels() {
        let hub = hub();
        let mut conn = hub.register(None);
        hub.subscribe(conn.id, &Channel::collection("books")).unwrap();
        hub.subscribe(conn.id, &Channel::entity("book", 1)).unwrap();

        let left = hub.disconnect(conn.id);
        assert_eq!(left.len(), 2);

        assert_eq!(hub.publish(&book_event(1)), 0);
        assert!(drain(&mut conn.receiver).is_empty());
        assert_eq!(hub.stats(), HubStats::default());
    }

    #[test]
    fn test_operations_on_unknown_connection_are_safe() {
        let hub = hub();
        let ghost = Uuid::new_v4();
        assert!(!hub.unsubscribe(ghost, &Channel::collection("books")));
        assert!(hub.disconnect(ghost).is_empty());
        assert_matches!(
            hub.subscribe(ghost, &Channel::collection("books")),
            Err(SubscribeError::UnknownConnection)
        );
    }

    #[test]
    fn test_one_message_per_connection_with_first_matching_channel() {
        let hub = hub();
        let mut conn = hub.register(None);
        hub.subscribe(conn.id, &Channel::entity("book", 3)).unwrap();
        hub.subscribe(conn.id, &Channel::collection("books")).unwrap();

        assert_eq!(hub.publish(&book_event(3)), 1);
        let frames = drain(&mut conn.receiver);
        assert_eq!(frames.len(), 1);
        let Outbound::Message(text) = &frames[0] else {
            panic!("expected a text frame");
        };
        assert!(text.contains(r#""channel":"books""#));
    }

    #[test]
    fn test_full_queue_is_skipped_and_pruned() {
        let hub = hub_with(HubConfig {
            queue_capacity: 1,
            ..HubConfig::default()
        });
        let books = Channel::collection("books");
        let slow = hub.register(None);
        let mut fast = hub.register(None);
        hub.subscribe(slow.id, &books).unwrap();
        hub.subscribe(fast.id, &books).unwrap();

        assert_eq!(hub.publish(&book_event(1)), 2);
        // Fast reader keeps up.
        assert_eq!(drain(&mut fast.receiver).len(), 1);

        assert_eq!(hub.publish(&book_event(2)), 1);
        assert_eq!(drain(&mut fast.receiver).len(), 1);
        assert!(!hub.is_subscribed(slow.id, &books));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_closed_receiver_is_pruned_on_publish() {
        let hub = hub();
        let conn = hub.register(None);
        hub.subscribe(conn.id, &Channel::collection("books")).unwrap();
        let id = conn.id;
        drop(conn);

        assert_eq!(hub.publish(&book_event(1)), 0);
        assert_eq!(hub.connection_count(), 0);
        assert!(hub.disconnect(id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_prunes_silent_connections() {
        let hub = hub_with(HubConfig {
            queue_capacity: 8,
            heartbeat_timeout: Duration::from_secs(90),
        });
        let mut quiet = hub.register(None);
        let mut chatty = hub.register(None);
        hub.subscribe(quiet.id, &Channel::collection("books")).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        hub.touch(chatty.id);
        let report = hub.heartbeat();
        assert_eq!(
            report,
            HeartbeatReport {
                pinged: 2,
                pruned: 0
            }
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        let report = hub.heartbeat();
        assert_eq!(
            report,
            HeartbeatReport {
                pinged: 1,
                pruned: 1
            }
        );

        assert_eq!(hub.connection_count(), 1);
        assert!(hub.stats().channels.is_empty());

        let frames = drain(&mut quiet.receiver);
        assert_eq!(frames.first(), Some(&Outbound::Ping));
        assert_matches!(frames.last(), Some(Outbound::Close { code: CLOSE_GOING_AWAY, .. }));
        assert_eq!(drain(&mut chatty.receiver), vec![Outbound::Ping, Outbound::Ping]);
    }

    #[test]
    fn test_stats_counts_per_channel() {
        let hub = hub();
        let a = hub.register(None);
        let b = hub.register(None);
        hub.subscribe(a.id, &Channel::collection("books")).unwrap();
        hub.subscribe(b.id, &Channel::collection("books")).unwrap();
        hub.subscribe(b.id, &Channel::collection("reviews")).unwrap();

        let stats = hub.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.channels.get("books"), Some(&2));
        assert_eq!(stats.channels.get("reviews"), Some(&1));
    }
}
