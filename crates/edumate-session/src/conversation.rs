//! Conversation transcript state.
//!
//! A [`ConversationSession`] is an append-only list of [`Turn`]s seeded with
//! the assistant greeting. Each accepted learner message hands out a
//! [`ReplyTicket`]; the assistant reply for that ticket is appended later via
//! [`ConversationSession::complete_reply`]. Replies always land in ticket
//! order, so a learner turn is answered before any later one.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use edumate_content::Turn;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionError;

/// Claim on the assistant reply owed for one learner message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyTicket {
    session_id: Uuid,
    seq: u64,
}

impl ReplyTicket {
    /// Returns the session this ticket was issued by.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the position of this reply in the session's reply order.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// The transcript of one learner/assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    id: Uuid,
    turns: Vec<Turn>,
    /// Sequence number of the next ticket to hand out.
    next_ticket: u64,
    /// Sequence number of the next reply allowed to land.
    next_to_land: u64,
    /// Replies that arrived before an earlier ticket was completed.
    parked: BTreeMap<u64, String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Starts a conversation containing only the assistant greeting.
    #[must_use]
    pub fn new(greeting: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), greeting)
    }

    /// Starts a conversation with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: Uuid, greeting: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: vec![Turn::assistant(greeting)],
            next_ticket: 0,
            next_to_land: 0,
            parked: BTreeMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Appends a learner turn and issues the ticket for its reply.
    ///
    /// The text is stored as submitted; only the blank check trims it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyInput`] when `text` is blank after
    /// trimming. The transcript is not modified in that case.
    pub fn submit_learner_message(&mut self, text: &str) -> Result<ReplyTicket, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::empty_input("message"));
        }

        self.turns.push(Turn::learner(text));
        let ticket = ReplyTicket {
            session_id: self.id,
            seq: self.next_ticket,
        };
        self.next_ticket += 1;
        self.touch();

        debug!(session_id = %self.id, seq = ticket.seq, "Learner turn appended");
        Ok(ticket)
    }

    /// Delivers the assistant reply for `ticket`.
    ///
    /// Returns the indices of the turns appended by this call. A reply whose
    /// predecessors are still outstanding is parked and the range is empty;
    /// once the gap closes, every consecutive parked reply lands together.
    /// Tickets from another session, already answered tickets and tickets
    /// never issued are ignored.
    pub fn complete_reply(&mut self, ticket: ReplyTicket, text: impl Into<String>) -> Range<usize> {
        let start = self.turns.len();

        if ticket.session_id != self.id
            || ticket.seq < self.next_to_land
            || ticket.seq >= self.next_ticket
            || self.parked.contains_key(&ticket.seq)
        {
            debug!(session_id = %self.id, seq = ticket.seq, "Ignoring stale or foreign reply");
            return start..start;
        }

        self.parked.insert(ticket.seq, text.into());
        while let Some(reply) = self.parked.remove(&self.next_to_land) {
            self.turns.push(Turn::assistant(reply));
            self.next_to_land += 1;
        }

        let end = self.turns.len();
        if end > start {
            self.touch();
        }
        start..end
    }

    /// Returns how many learner turns are still waiting for a reply.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        usize::try_from(self.next_ticket - self.next_to_land).unwrap_or(usize::MAX)
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the transcript in order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always `false`: a conversation starts with its greeting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the most recent turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Captures the current transcript for display or broadcast.
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            session_id: self.id,
            turns: self.turns.clone(),
            pending_replies: self.pending_replies(),
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Point-in-time copy of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSnapshot {
    /// The conversation id.
    pub session_id: Uuid,
    /// All turns, oldest first.
    pub turns: Vec<Turn>,
    /// Learner turns not yet answered.
    pub pending_replies: usize,
    /// When the conversation started.
    pub started_at: DateTime<Utc>,
    /// When the transcript last changed.
    pub updated_at: DateTime<Utc>,
}
