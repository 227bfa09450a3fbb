use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hub::{CloseReason, Mailbox, SessionId};
use super::registry::{HubRegistry, SharedHub};
use crate::models::{ClientMessage, CursorPosition, ServerMessage};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closed,
}

/// One live connection bound to a file, owned by the connection's task
pub struct Session {
    id: SessionId,
    file_id: Uuid,
    identity: Option<String>,
    slot: Option<String>,
    cursor: Option<CursorPosition>,
    state: SessionState,
    registry: Arc<HubRegistry>,
    hub: Option<SharedHub>,
}

fn normalize_identity(identity: &str) -> Option<String> {
    let identity = identity.trim();
    (!identity.is_empty()).then(|| identity.to_string())
}

impl Session {
    pub fn new(registry: Arc<HubRegistry>, file_id: Uuid, identity: Option<String>, slot: Option<String>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            file_id,
            identity: identity.as_deref().and_then(normalize_identity),
            slot: slot.filter(|s| !s.trim().is_empty()),
            cursor: None,
            state: SessionState::Connecting,
            registry,
            hub: None,
        }
    }

    /// Create a session and register it on its file's hub
    pub async fn open(registry: Arc<HubRegistry>, file_id: Uuid, identity: Option<String>, slot: Option<String>) -> (Self, Mailbox) {
        let mut session = Self::new(registry, file_id, identity, slot);
        let mailbox = session.join().await;
        (session, mailbox)
    }

    /// `Connecting -> Joined`. Only valid once.
    async fn join(&mut self) -> Mailbox {
        debug_assert_eq!(self.state, SessionState::Connecting);
        let hub = self.registry.acquire(self.file_id).await;
        let mailbox = hub.lock().await.join(self.id, self.identity.clone(), self.slot.clone());
        self.hub = Some(hub);
        self.state = SessionState::Joined;
        info!(file_id = %self.file_id, session = self.id, identity = ?self.identity, "session joined");
        mailbox
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn cursor(&self) -> Option<CursorPosition> {
        self.cursor
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Parse and apply one text frame. Malformed frames are logged and dropped.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                warn!(file_id = %self.file_id, session = self.id, error = %e, "dropping malformed message");
            }
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) {
        let Some(hub) = self.hub.as_ref().filter(|_| self.state == SessionState::Joined) else {
            debug!(session = self.id, state = ?self.state, "ignoring message on inactive session");
            return;
        };
        let mut h = hub.lock().await;

        match msg {
            ClientMessage::ContentUpdate { content } => {
                let delivered = h.broadcast(Some(self.id), ServerMessage::ContentUpdate { content });
                debug!(file_id = %self.file_id, session = self.id, delivered, "content update relayed");
            }
            ClientMessage::PresenceAnnounce { identity } => match normalize_identity(&identity) {
                Some(identity) => {
                    self.identity = Some(identity.clone());
                    h.announce(self.id, identity);
                }
                None => warn!(file_id = %self.file_id, session = self.id, "dropping presence announce without identity"),
            },
            ClientMessage::PresenceLeave {} => {
                self.identity = None;
                h.withdraw(self.id);
            }
            ClientMessage::CursorUpdate { position } => {
                self.cursor = Some(position);
                h.cursor(self.id, position);
            }
            ClientMessage::Ping {} => {
                h.send_to(self.id, ServerMessage::Pong { date: Utc::now().to_rfc3339() });
            }
        }
    }

    /// `Joined -> Closed`. Deregisters from the hub and releases it; safe to call repeatedly.
    pub async fn close(&mut self) {
        self.shutdown(None).await;
    }

    /// Like `close`, but the connection's writer is told why the server ended it
    pub async fn close_with(&mut self, reason: CloseReason) {
        self.shutdown(Some(reason)).await;
    }

    async fn shutdown(&mut self, reason: Option<CloseReason>) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(hub) = self.hub.take() {
            {
                let mut h = hub.lock().await;
                match reason {
                    Some(reason) => h.evict(self.id, reason),
                    None => h.leave(self.id),
                };
            }
            self.registry.release(self.file_id).await;
        }
        self.state = SessionState::Closed;
        info!(file_id = %self.file_id, session = self.id, reason = ?reason, "session closed");
    }
}
