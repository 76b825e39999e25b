//! Live conversation with deferred assistant replies.
//!
//! [`ChatSession`] owns a [`ConversationSession`] behind a mutex plus one
//! background worker. Each accepted learner message queues a reply task; the
//! worker waits out the reply delay, asks the generator and appends the reply.
//! Generations may finish in any order, but replies land in submission order
//! because the conversation only accepts them ticket by ticket.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use edumate_content::{ContentGenerator, Turn};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::conversation::{ConversationSession, ReplyTicket, TranscriptSnapshot};
use crate::error::SessionError;
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Reply timing and fallback text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    /// Delay between a learner turn and its reply.
    pub reply_delay: Duration,
    /// Reply appended when the generator fails.
    pub fallback_reply: String,
}

impl ChatOptions {
    /// Takes the chat settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            reply_delay: config.reply_delay(),
            fallback_reply: config.fallback_reply.clone(),
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A queued request for one assistant reply.
#[derive(Debug)]
struct ReplyTask {
    ticket: ReplyTicket,
    /// Transcript as of the learner turn, including it.
    transcript: Vec<Turn>,
    due: Instant,
}

/// A conversation whose assistant replies arrive after a delay.
///
/// Must be created inside a Tokio runtime. Dropping it stops the worker;
/// replies still pending are discarded.
pub struct ChatSession {
    id: Uuid,
    state: Arc<Mutex<ConversationSession>>,
    tasks: mpsc::UnboundedSender<ReplyTask>,
    worker: JoinHandle<()>,
    options: ChatOptions,
    broadcaster: EventBroadcaster,
}

impl ChatSession {
    /// Starts a conversation seeded with `greeting` and its reply worker.
    pub fn spawn(
        greeting: impl Into<String>,
        generator: Arc<dyn ContentGenerator>,
        options: ChatOptions,
        broadcaster: EventBroadcaster,
    ) -> Self {
        let conversation = ConversationSession::new(greeting);
        let id = conversation.id();
        let state = Arc::new(Mutex::new(conversation));
        let (tasks, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_reply_worker(
            Arc::downgrade(&state),
            rx,
            generator,
            options.fallback_reply.clone(),
            broadcaster.clone(),
        ));

        info!(session_id = %id, "Conversation started");
        Self {
            id,
            state,
            tasks,
            worker,
            options,
            broadcaster,
        }
    }

    /// Starts a conversation using the greeting and timing from `config`.
    pub fn from_config(
        config: &Config,
        generator: Arc<dyn ContentGenerator>,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self::spawn(
            config.greeting.clone(),
            generator,
            ChatOptions::from_config(config),
            broadcaster,
        )
    }

    /// Appends a learner message and schedules exactly one reply.
    ///
    /// Returns the appended learner turn.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyInput`] for blank text; nothing is
    /// appended or scheduled.
    pub async fn submit(&self, text: &str) -> Result<Turn, SessionError> {
        let mut session = self.state.lock().await;
        let ticket = session.submit_learner_message(text)?;
        let index = session.len() - 1;
        let transcript = session.turns().to_vec();
        let turn = transcript[index].clone();

        self.broadcaster
            .send(SessionEvent::turn_appended(index, turn.clone()));

        let task = ReplyTask {
            ticket,
            transcript,
            due: Instant::now() + self.options.reply_delay,
        };
        if let Err(mpsc::error::SendError(task)) = self.tasks.send(task) {
            warn!(session_id = %self.id, "Reply worker is gone, answering with fallback");
            let landed = session.complete_reply(task.ticket, self.options.fallback_reply.clone());
            broadcast_landed(&self.broadcaster, &session, landed);
        }

        debug!(session_id = %self.id, seq = ticket.seq(), "Reply scheduled");
        Ok(turn)
    }

    /// Returns a copy of the current transcript.
    pub async fn snapshot(&self) -> TranscriptSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Returns the turns so far.
    pub async fn turns(&self) -> Vec<Turn> {
        self.state.lock().await.turns().to_vec()
    }

    /// Returns how many replies are still outstanding.
    pub async fn pending_replies(&self) -> usize {
        self.state.lock().await.pending_replies()
    }

    /// Returns the conversation id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the reply settings.
    #[must_use]
    pub const fn options(&self) -> &ChatOptions {
        &self.options
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn broadcast_landed(
    broadcaster: &EventBroadcaster,
    session: &ConversationSession,
    landed: std::ops::Range<usize>,
) {
    for index in landed {
        if let Some(turn) = session.turns().get(index) {
            broadcaster.send(SessionEvent::turn_appended(index, turn.clone()));
        }
    }
}

/// Waits until the task is due, then produces its reply text.
///
/// Never fails: a generator error or a blank reply yields `fallback`.
async fn produce_reply(
    task: ReplyTask,
    generator: Arc<dyn ContentGenerator>,
    fallback: String,
) -> (ReplyTicket, String) {
    sleep_until(task.due).await;

    let reply = match generator.generate_reply(&task.transcript).await {
        Ok(reply) if !reply.trim().is_empty() => reply,
        Ok(_) => {
            warn!(generator = generator.name(), "Generator returned a blank reply, using fallback");
            fallback
        }
        Err(e) => {
            warn!(generator = generator.name(), error = %e, "Reply generation failed, using fallback");
            fallback
        }
    };
    (task.ticket, reply)
}

/// Consumes reply tasks for one conversation.
///
/// Runs until the task channel closes or the conversation is dropped. Writes
/// go through `state` only while it can still be upgraded.
async fn run_reply_worker(
    state: Weak<Mutex<ConversationSession>>,
    mut tasks: mpsc::UnboundedReceiver<ReplyTask>,
    generator: Arc<dyn ContentGenerator>,
    fallback: String,
    broadcaster: EventBroadcaster,
) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            task = tasks.recv() => {
                let Some(task) = task else {
                    debug!("Reply queue closed");
                    break;
                };
                in_flight.push(produce_reply(task, Arc::clone(&generator), fallback.clone()));
            }

            Some((ticket, reply)) = in_flight.next(), if !in_flight.is_empty() => {
                let Some(state) = state.upgrade() else {
                    debug!(seq = ticket.seq(), "Conversation dropped, discarding reply");
                    break;
                };
                let mut session = state.lock().await;
                let landed = session.complete_reply(ticket, reply);
                broadcast_landed(&broadcaster, &session, landed);
            }
        }
    }
}
