use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use super::presence::PresenceRegistry;
use crate::models::{CursorPosition, Participant, PresenceAction, ServerMessage};

pub type SessionId = u64;

/// Why the server ended a connection; carried to the client as the WebSocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    MalformedHandshake,
    UnknownFile,
    SlowConsumer,
    Replaced,
    IdleTimeout,
    Internal,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::Internal => 1011,
            CloseReason::MalformedHandshake => 4400,
            CloseReason::UnknownFile => 4404,
            CloseReason::SlowConsumer => 4408,
            CloseReason::Replaced => 4409,
            CloseReason::IdleTimeout => 4410,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            CloseReason::Normal => "session ended",
            CloseReason::Internal => "internal error",
            CloseReason::MalformedHandshake => "malformed handshake",
            CloseReason::UnknownFile => "unknown file",
            CloseReason::SlowConsumer => "outbound queue overflow",
            CloseReason::Replaced => "replaced by a newer session",
            CloseReason::IdleTimeout => "heartbeat timeout",
        }
    }
}

/// Process-wide delivery counters shared by every hub
#[derive(Debug, Default)]
pub struct HubCounters {
    pub delivered: AtomicU64,
    pub evicted: AtomicU64,
}

/// What a session's writer receives next
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(Arc<ServerMessage>),
    Closed(CloseReason),
}

/// Receiving half of a session's registration: its bounded outbound queue plus
/// a close signal the hub fires when it drops the session on its own.
#[derive(Debug)]
pub struct Mailbox {
    messages: mpsc::Receiver<Arc<ServerMessage>>,
    closed: Option<oneshot::Receiver<CloseReason>>,
}

impl Mailbox {
    /// Next outbound item. A close signal preempts queued messages.
    pub async fn recv(&mut self) -> Delivery {
        if let Some(closed) = self.closed.as_mut() {
            let messages = &mut self.messages;
            let step = tokio::select! {
                biased;
                reason = closed => Err(reason.ok()),
                msg = messages.recv() => Ok(msg),
            };
            match step {
                Ok(msg) => return Self::delivery(msg),
                Err(Some(reason)) => {
                    self.closed = None;
                    return Delivery::Closed(reason);
                }
                // hub let go of the session without a reason; drain what is queued
                Err(None) => self.closed = None,
            }
        }
        Self::delivery(self.messages.recv().await)
    }

    fn delivery(msg: Option<Arc<ServerMessage>>) -> Delivery {
        match msg {
            Some(msg) => Delivery::Message(msg),
            None => Delivery::Closed(CloseReason::Normal),
        }
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.messages.try_recv().ok().map(|msg| (*msg).clone())
    }

    #[cfg(test)]
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Debug)]
struct Member {
    identity: Option<String>,
    slot: Option<String>,
    tx: mpsc::Sender<Arc<ServerMessage>>,
    close: Option<oneshot::Sender<CloseReason>>,
}

/// Broadcast router for one file: registered sessions plus who is present
pub struct Hub {
    file_id: Uuid,
    queue_capacity: usize,
    members: HashMap<SessionId, Member>,
    presence: PresenceRegistry,
    counters: Arc<HubCounters>,
}

impl Hub {
    pub fn new(file_id: Uuid, queue_capacity: usize, counters: Arc<HubCounters>) -> Self {
        Self {
            file_id,
            queue_capacity: queue_capacity.max(1),
            members: HashMap::new(),
            presence: PresenceRegistry::default(),
            counters,
        }
    }

    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    pub fn session_count(&self) -> usize {
        self.members.len()
    }

    pub fn participant_count(&self) -> usize {
        self.presence.len()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.presence.participants()
    }

    pub fn is_member(&self, id: SessionId) -> bool {
        self.members.contains_key(&id)
    }

    /// Register a session. A prior session holding the same connection slot is
    /// closed with `Replaced`; presence is carried over when identities match.
    pub fn join(&mut self, id: SessionId, identity: Option<String>, slot: Option<String>) -> Mailbox {
        let (tx, messages) = mpsc::channel(self.queue_capacity);
        let (close, closed) = oneshot::channel();

        let replaced: Vec<SessionId> = match &slot {
            Some(slot) => self
                .members
                .iter()
                .filter(|(other, m)| **other != id && m.slot.as_deref() == Some(slot.as_str()))
                .map(|(other, _)| *other)
                .collect(),
            None => Vec::new(),
        };

        self.members.insert(id, Member { identity: None, slot, tx, close: Some(close) });
        debug!(file_id = %self.file_id, session = id, sessions = self.members.len(), "session joined hub");

        if let Some(identity) = identity {
            self.announce(id, identity);
        }
        if !replaced.is_empty() {
            self.evict_all(replaced.into_iter().map(|old| (old, Some(CloseReason::Replaced))).collect());
        }

        Mailbox { messages, closed: Some(closed) }
    }

    /// Bind an identity to a session. Emits a presence join only when the identity was not present.
    pub fn announce(&mut self, id: SessionId, identity: String) {
        let Some(member) = self.members.get_mut(&id) else {
            return;
        };
        if member.identity.as_deref() == Some(identity.as_str()) {
            return;
        }
        let previous = member.identity.replace(identity.clone());
        if let Some(previous) = previous {
            self.drop_presence(id, &previous);
        }

        if self.presence.add(&identity, id) {
            debug!(file_id = %self.file_id, session = id, identity = %identity, "presence join");
            self.broadcast(Some(id), ServerMessage::presence(identity, PresenceAction::Join));
        }
        let participants = self.presence.participants();
        self.send_to(id, ServerMessage::PresenceState { participants });
    }

    /// Clear a session's identity while keeping it registered for broadcast
    pub fn withdraw(&mut self, id: SessionId) {
        let identity = self.members.get_mut(&id).and_then(|m| m.identity.take());
        if let Some(identity) = identity {
            self.drop_presence(id, &identity);
        }
    }

    /// Deregister a session. Returns false when it was already gone.
    pub fn leave(&mut self, id: SessionId) -> bool {
        self.depart(id, None)
    }

    /// Deregister a session and signal `reason` to its writer
    pub fn evict(&mut self, id: SessionId, reason: CloseReason) -> bool {
        self.depart(id, Some(reason))
    }

    fn depart(&mut self, id: SessionId, reason: Option<CloseReason>) -> bool {
        let Some(leave) = self.remove_member(id, reason) else {
            return false;
        };
        if let Some(msg) = leave {
            self.broadcast(None, msg);
        }
        debug!(file_id = %self.file_id, session = id, sessions = self.members.len(), "session left hub");
        true
    }

    /// Record a cursor move and relay it to everyone else
    pub fn cursor(&mut self, id: SessionId, position: CursorPosition) -> usize {
        let Some(member) = self.members.get(&id) else {
            return 0;
        };
        let identity = member.identity.clone();
        if let Some(identity) = &identity {
            self.presence.set_cursor(identity, position);
        }
        self.broadcast(Some(id), ServerMessage::CursorUpdate { identity, position })
    }

    /// Deliver `msg` to every session except `from`. Sessions whose queue is full
    /// are evicted. Returns how many sessions were handed the message.
    pub fn broadcast(&mut self, from: Option<SessionId>, msg: ServerMessage) -> usize {
        if let Some(from) = from {
            if !self.members.contains_key(&from) {
                debug!(file_id = %self.file_id, session = from, "dropping broadcast from detached session");
                return 0;
            }
        }
        let (delivered, dead) = self.deliver(from, msg);
        self.evict_all(dead);
        delivered
    }

    /// Deliver to a single session
    pub fn send_to(&mut self, id: SessionId, msg: ServerMessage) -> bool {
        let Some(member) = self.members.get(&id) else {
            return false;
        };
        match member.tx.try_send(Arc::new(msg)) {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.evict_all(vec![(id, Self::failure_reason(&e))]);
                false
            }
        }
    }

    fn deliver(&self, from: Option<SessionId>, msg: ServerMessage) -> (usize, Vec<(SessionId, Option<CloseReason>)>) {
        let msg = Arc::new(msg);
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, member) in &self.members {
            if Some(*id) == from {
                continue;
            }
            match member.tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => dead.push((*id, Self::failure_reason(&e))),
            }
        }
        self.counters.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        (delivered, dead)
    }

    fn failure_reason<T>(err: &TrySendError<T>) -> Option<CloseReason> {
        match err {
            TrySendError::Full(_) => Some(CloseReason::SlowConsumer),
            // receiver already gone, the session is mid-close
            TrySendError::Closed(_) => None,
        }
    }

    fn evict_all(&mut self, mut dead: Vec<(SessionId, Option<CloseReason>)>) {
        while let Some((id, reason)) = dead.pop() {
            if let Some(Some(leave)) = self.remove_member(id, reason) {
                let (_, more) = self.deliver(None, leave);
                dead.extend(more);
            }
        }
    }

    /// Remove a member, signalling `reason` to its writer. Yields `None` if it was
    /// not registered, otherwise the presence-leave to broadcast, if any.
    fn remove_member(&mut self, id: SessionId, reason: Option<CloseReason>) -> Option<Option<ServerMessage>> {
        let mut member = self.members.remove(&id)?;
        if let Some(reason) = reason {
            if reason == CloseReason::SlowConsumer {
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            }
            warn!(file_id = %self.file_id, session = id, reason = reason.reason(), "evicting session");
            if let Some(close) = member.close.take() {
                let _ = close.send(reason);
            }
        }
        let leave = member.identity.and_then(|identity| {
            self.presence
                .remove(&identity, id)
                .then(|| ServerMessage::presence(identity, PresenceAction::Leave))
        });
        Some(leave)
    }

    fn drop_presence(&mut self, id: SessionId, identity: &str) {
        if self.presence.remove(identity, id) {
            debug!(file_id = %self.file_id, session = id, identity = %identity, "presence leave");
            self.broadcast(Some(id), ServerMessage::presence(identity, PresenceAction::Leave));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(capacity: usize) -> Hub {
        Hub::new(Uuid::new_v4(), capacity, Arc::default())
    }

    fn content(text: &str) -> ServerMessage {
        ServerMessage::ContentUpdate { content: text.to_string() }
    }

    fn presence_events(msgs: &[ServerMessage]) -> Vec<(String, PresenceAction)> {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMessage::PresenceEvent { identity, action } => Some((identity.clone(), *action)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let mut hub = hub(8);
        let mut a = hub.join(1, None, None);
        let mut b = hub.join(2, None, None);
        let mut c = hub.join(3, None, None);

        assert_eq!(hub.broadcast(Some(1), content("hello")), 2);
        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![content("hello")]);
        assert_eq!(c.drain(), vec![content("hello")]);
    }

    #[test]
    fn same_identity_joins_once() {
        let mut hub = hub(8);
        let mut observer = hub.join(1, Some("bob".into()), None);
        observer.drain();

        let _a = hub.join(2, Some("alice".into()), None);
        let _b = hub.join(3, Some("alice".into()), None);
        hub.announce(3, "alice".into());

        let events = presence_events(&observer.drain());
        assert_eq!(events, vec![("alice".to_string(), PresenceAction::Join)]);
        assert_eq!(hub.participant_count(), 2);
    }

    #[test]
    fn shared_identity_leaves_with_last_session() {
        let mut hub = hub(8);
        let mut observer = hub.join(1, Some("bob".into()), None);
        let _a = hub.join(2, Some("alice".into()), None);
        let _b = hub.join(3, Some("alice".into()), None);
        observer.drain();

        assert!(hub.leave(2));
        assert!(presence_events(&observer.drain()).is_empty());

        assert!(hub.leave(3));
        assert_eq!(presence_events(&observer.drain()), vec![("alice".to_string(), PresenceAction::Leave)]);
        assert!(!hub.leave(3));
    }

    #[test]
    fn newcomer_receives_presence_state() {
        let mut hub = hub(8);
        let _bob = hub.join(1, Some("bob".into()), None);
        hub.cursor(1, CursorPosition { line: 2, column: 5 });
        let mut alice = hub.join(2, Some("alice".into()), None);

        match alice.drain().as_slice() {
            [ServerMessage::PresenceState { participants }] => {
                let bob = participants.iter().find(|p| p.identity == "bob").unwrap();
                assert_eq!(bob.cursor, Some(CursorPosition { line: 2, column: 5 }));
                assert!(participants.iter().any(|p| p.identity == "alice"));
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[test]
    fn messages_from_one_sender_arrive_in_order() {
        let mut hub = hub(16);
        let _a = hub.join(1, None, None);
        let mut b = hub.join(2, None, None);
        for i in 0..10 {
            hub.broadcast(Some(1), content(&i.to_string()));
        }
        let received: Vec<ServerMessage> = b.drain();
        let expected: Vec<ServerMessage> = (0..10).map(|i| content(&i.to_string())).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn overflowing_recipient_is_evicted_without_stalling_others() {
        let mut hub = hub(2);
        let _a = hub.join(1, None, None);
        let mut slow = hub.join(2, None, None);
        let mut fast = hub.join(3, None, None);

        for i in 0..3 {
            hub.broadcast(Some(1), content(&i.to_string()));
            // keep the fast reader's queue empty
            fast.drain();
        }
        assert!(!hub.is_member(2));
        assert!(hub.is_member(3));
        assert_eq!(hub.counters.evicted.load(Ordering::Relaxed), 1);
        assert_eq!(slow.recv().await, Delivery::Closed(CloseReason::SlowConsumer));

        hub.broadcast(Some(1), content("after"));
        assert_eq!(fast.drain(), vec![content("after")]);
    }

    #[test]
    fn eviction_announces_presence_leave() {
        let mut hub = hub(2);
        let _a = hub.join(1, None, None);
        let mut watcher = hub.join(3, None, None);
        // presence state fills one of the two slots
        let _slow = hub.join(2, Some("slow".into()), None);
        watcher.drain();

        hub.broadcast(Some(1), content("one"));
        watcher.drain();
        hub.broadcast(Some(1), content("two"));

        assert!(!hub.is_member(2));
        let received = watcher.drain();
        assert_eq!(received[0], content("two"));
        assert_eq!(presence_events(&received), vec![("slow".to_string(), PresenceAction::Leave)]);
    }

    #[test]
    fn closed_receiver_is_dropped_quietly() {
        let mut hub = hub(4);
        let _a = hub.join(1, None, None);
        let b = hub.join(2, None, None);
        drop(b);
        assert_eq!(hub.broadcast(Some(1), content("x")), 0);
        assert!(!hub.is_member(2));
        assert_eq!(hub.counters.evicted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn same_slot_replaces_previous_session() {
        let mut hub = hub(4);
        let mut observer = hub.join(9, Some("bob".into()), None);
        let mut old = hub.join(1, Some("alice".into()), Some("tab-1".into()));
        observer.drain();

        let _new = hub.join(2, Some("alice".into()), Some("tab-1".into()));
        assert!(!hub.is_member(1));
        assert!(hub.is_member(2));
        assert_eq!(hub.session_count(), 2);
        assert!(presence_events(&observer.drain()).is_empty());

        old.drain();
        assert_eq!(old.recv().await, Delivery::Closed(CloseReason::Replaced));
    }

    #[test]
    fn withdraw_keeps_session_but_drops_presence() {
        let mut hub = hub(4);
        let mut observer = hub.join(1, None, None);
        let mut alice = hub.join(2, Some("alice".into()), None);
        observer.drain();

        hub.withdraw(2);
        assert_eq!(presence_events(&observer.drain()), vec![("alice".to_string(), PresenceAction::Leave)]);
        assert!(hub.is_member(2));

        hub.broadcast(Some(1), content("still here"));
        assert!(alice.drain().contains(&content("still here")));
    }

    #[test]
    fn renaming_switches_presence() {
        let mut hub = hub(8);
        let mut observer = hub.join(1, None, None);
        let _s = hub.join(2, Some("alice".into()), None);
        hub.announce(2, "alicia".into());

        let events = presence_events(&observer.drain());
        assert_eq!(
            events,
            vec![
                ("alice".to_string(), PresenceAction::Join),
                ("alice".to_string(), PresenceAction::Leave),
                ("alicia".to_string(), PresenceAction::Join),
            ]
        );
    }

    #[test]
    fn anonymous_cursor_is_relayed_without_identity() {
        let mut hub = hub(4);
        let _a = hub.join(1, None, None);
        let mut b = hub.join(2, None, None);
        let position = CursorPosition { line: 1, column: 1 };
        hub.cursor(1, position);
        assert_eq!(b.drain(), vec![ServerMessage::CursorUpdate { identity: None, position }]);
        assert_eq!(hub.participant_count(), 0);
    }

    #[test]
    fn detached_sender_cannot_broadcast() {
        let mut hub = hub(4);
        let _a = hub.join(1, None, None);
        let mut b = hub.join(2, None, None);
        hub.leave(1);
        assert_eq!(hub.broadcast(Some(1), content("ghost")), 0);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn evicted_session_gets_its_reason_and_others_see_it_leave() {
        let mut hub = hub(4);
        let mut observer = hub.join(9, Some("bob".into()), None);
        let mut idle = hub.join(1, Some("alice".into()), None);
        observer.drain();

        assert!(hub.evict(1, CloseReason::IdleTimeout));
        assert!(!hub.evict(1, CloseReason::IdleTimeout));

        assert_eq!(presence_events(&observer.drain()), vec![("alice".to_string(), PresenceAction::Leave)]);
        assert_eq!(idle.recv().await, Delivery::Closed(CloseReason::IdleTimeout));
        assert_eq!(CloseReason::IdleTimeout.code(), 4410);
    }
}
