use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use strum::Display;

use crate::ai::{AiAction, AiGateway, GatewayError};
use crate::clock::Clock;
use crate::editing::{EditDebouncer, Field};
use crate::notes::{NoteId, NotePatch, NoteStore, UNTITLED_NOTE};

pub const SUMMARY_HEADING: &str = "## AI Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AiStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Status of the most recent AI action for one open note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAiState {
    pub note_id: Option<NoteId>,
    pub status: AiStatus,
    pub message: Option<String>,
}

impl SessionAiState {
    fn idle(note_id: Option<NoteId>) -> Self {
        Self {
            note_id,
            status: AiStatus::Idle,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started(u64),
    /// Content was blank; nothing was sent and the state is untouched.
    Skipped,
    /// Another request is still loading for this note.
    Busy,
    /// The worker thread could not be started; the state shows the failure.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiEvent {
    Applied {
        note_id: NoteId,
        action: AiAction,
    },
    Failed {
        note_id: NoteId,
        action: AiAction,
        message: String,
    },
    Discarded {
        request_id: u64,
    },
    Reset {
        note_id: Option<NoteId>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub status_reset_ms: i64,
    pub title_prefix_chars: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            status_reset_ms: 2_000,
            title_prefix_chars: 1_000,
        }
    }
}

#[derive(Debug)]
struct Completion {
    request_id: u64,
    note_id: NoteId,
    action: AiAction,
    source: String,
    outcome: Result<String, GatewayError>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    request_id: u64,
    note_id: NoteId,
}

/// Runs one AI action at a time for the open note. Gateway calls happen on
/// worker threads; their results are applied by [`AiCoordinator::poll`] on
/// the thread that owns the store.
pub struct AiCoordinator {
    gateway: Arc<dyn AiGateway>,
    settings: CoordinatorSettings,
    state: SessionAiState,
    in_flight: Option<InFlight>,
    reset_at: Option<i64>,
    next_request_id: u64,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl AiCoordinator {
    pub fn new(gateway: Arc<dyn AiGateway>, settings: CoordinatorSettings) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            gateway,
            settings,
            state: SessionAiState::idle(None),
            in_flight: None,
            reset_at: None,
            next_request_id: 1,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &SessionAiState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Keys the session to `note_id`. A different identity resets the state
    /// and orphans any request still in flight.
    pub fn open_session(&mut self, note_id: Option<NoteId>) {
        if self.state.note_id == note_id {
            return;
        }
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(request_id = in_flight.request_id, "orphaning in-flight AI request");
        }
        self.state = SessionAiState::idle(note_id);
        self.reset_at = None;
    }

    pub fn request(
        &mut self,
        action: AiAction,
        note_id: NoteId,
        content: &str,
        now_ms: i64,
    ) -> RequestOutcome {
        if content.trim().is_empty() {
            return RequestOutcome::Skipped;
        }
        self.open_session(Some(note_id));
        if self.in_flight.is_some() {
            tracing::debug!(%action, note_id = %note_id, "AI request ignored while loading");
            return RequestOutcome::Busy;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.state.status = AiStatus::Loading;
        self.state.message = None;
        self.reset_at = None;
        self.in_flight = Some(InFlight {
            request_id,
            note_id,
        });

        let input = match action {
            AiAction::GenerateTitle => prefix_chars(content, self.settings.title_prefix_chars),
            AiAction::Summarize | AiAction::Polish => content,
        }
        .to_string();
        let source = content.to_string();
        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("ai-{request_id}"))
            .spawn(move || {
                let outcome = action.invoke(gateway.as_ref(), &input);
                let _ = tx.send(Completion {
                    request_id,
                    note_id,
                    action,
                    source,
                    outcome,
                });
            });
        if let Err(err) = spawned {
            tracing::error!(?err, %action, "failed to start AI worker");
            self.in_flight = None;
            self.finish(AiStatus::Error, action.failure_message(), now_ms);
            return RequestOutcome::Unavailable;
        }
        tracing::debug!(request_id, %action, note_id = %note_id, "AI request started");
        RequestOutcome::Started(request_id)
    }

    /// Applies finished requests and expires a lingering Success/Error state.
    pub fn poll(
        &mut self,
        store: &mut NoteStore,
        debouncer: &mut EditDebouncer,
        now_ms: i64,
    ) -> Vec<AiEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            events.push(self.complete(completion, store, debouncer, now_ms));
        }
        if let Some(reset_at) = self.reset_at {
            if now_ms >= reset_at {
                self.reset_at = None;
                self.state.status = AiStatus::Idle;
                self.state.message = None;
                events.push(AiEvent::Reset {
                    note_id: self.state.note_id,
                });
            }
        }
        events
    }

    /// Blocks until the in-flight request completes or `timeout` passes,
    /// then polls. Completions of orphaned requests that arrive first are
    /// discarded along the way.
    pub fn wait(
        &mut self,
        store: &mut NoteStore,
        debouncer: &mut EditDebouncer,
        clock: &dyn Clock,
        timeout: Duration,
    ) -> Vec<AiEvent> {
        let mut events = Vec::new();
        let deadline = Instant::now() + timeout;
        while self.in_flight.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => {
                    events.push(self.complete(completion, store, debouncer, clock.now_ms()))
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?timeout, "timed out waiting for AI response");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        events.extend(self.poll(store, debouncer, clock.now_ms()));
        events
    }

    fn complete(
        &mut self,
        completion: Completion,
        store: &mut NoteStore,
        debouncer: &mut EditDebouncer,
        now_ms: i64,
    ) -> AiEvent {
        let Completion {
            request_id,
            note_id,
            action,
            source,
            outcome,
        } = completion;
        let current = self
            .in_flight
            .map(|f| f.request_id == request_id && f.note_id == note_id)
            .unwrap_or(false);
        if !current {
            tracing::debug!(request_id, "discarding stale AI response");
            return AiEvent::Discarded { request_id };
        }
        self.in_flight = None;

        let generated = match outcome {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, %action, note_id = %note_id, "AI request failed");
                let message = action.failure_message();
                self.finish(AiStatus::Error, message, now_ms);
                return AiEvent::Failed {
                    note_id,
                    action,
                    message: message.to_string(),
                };
            }
        };

        let (field, value) = merge_result(action, &source, &generated);
        let unchanged = store
            .get(note_id)
            .map(|note| match field {
                Field::Title => note.title == value,
                Field::Content => note.content == value,
            })
            .unwrap_or(false);
        if !unchanged {
            let patch = match field {
                Field::Title => NotePatch::title(value.clone()),
                Field::Content => NotePatch::content(value.clone()),
            }
            .at(now_ms);
            if let Err(err) = store.update(note_id, patch) {
                tracing::warn!(?err, %action, note_id = %note_id, "saving AI result failed");
            }
        }
        if debouncer.note_id() == Some(note_id) {
            match field {
                Field::Title => debouncer.replace_title(value),
                Field::Content => debouncer.replace_content(value),
            }
        }

        self.finish(AiStatus::Success, action.success_message(), now_ms);
        AiEvent::Applied { note_id, action }
    }

    fn finish(&mut self, status: AiStatus, message: &str, now_ms: i64) {
        self.state.status = status;
        self.state.message = Some(message.to_string());
        self.reset_at = Some(now_ms.saturating_add(self.settings.status_reset_ms));
    }
}

/// Folds a generated reply into the note field the action targets.
pub fn merge_result(action: AiAction, source: &str, generated: &str) -> (Field, String) {
    let generated = generated.trim();
    match action {
        AiAction::GenerateTitle => {
            let title = if generated.is_empty() {
                UNTITLED_NOTE
            } else {
                generated
            };
            (Field::Title, title.to_string())
        }
        AiAction::Summarize => (
            Field::Content,
            format!("{source}\n\n{SUMMARY_HEADING}\n{generated}"),
        ),
        AiAction::Polish => {
            let polished = if generated.is_empty() {
                source
            } else {
                generated
            };
            (Field::Content, polished.to_string())
        }
    }
}

fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
