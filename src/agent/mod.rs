//! The agent controller.
//!
//! A hand-rolled five-state machine over one episode:
//!
//! ```text
//! START -> PLAN -> DISPATCH -> ASSESS -+-> ANSWER -> GUARD -> END
//!            ^                         |
//!            +--- (insufficient, ------+
//!                  retries < max)
//! ```
//!
//! Turns on one session are strictly serialized; a concurrent turn is
//! rejected. A per-turn deadline covers the whole episode; on deadline
//! or cancellation nothing is persisted.

mod answer;
mod assess;
mod dispatch;
mod guard;
mod planner;
mod prompt;
mod state;

pub use answer::{render_provenance, render_rows};
pub use assess::{Assessment, assess};
pub use dispatch::Dispatcher;
pub use guard::Guardrail;
pub use planner::{KNOWN_TOOLS, Plan, PlannedCall, Planner};
pub use prompt::{
    ANSWER_SYSTEM_PROMPT, GUARDRAIL_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT, tool_output_digest,
};
pub use state::{AgentAnswer, AgentEvent, AgentState, Strategy};

use crate::config::Config;
use crate::core::{Message, Provenance, SessionRecord, StructuredResult};
use crate::error::{AgentError, Error, Result, StorageError};
use crate::extract::ParameterExtractor;
use crate::fda::{Endpoint, EndpointTools, FdaClient};
use crate::llm::{LlmCaller, build_caller};
use crate::resolve::{DeviceResolver, LocationResolver, ManufacturerResolver};
use crate::retrieval::{HybridRetriever, endpoint_hints};
use crate::session::SessionStore;
use crate::storage::SqliteStore;
use crate::usage::UsageTracker;
use answer::AnswerBuilder;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffered events per streaming turn.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The assembled agent: one entry point (`ask`) plus a streaming
/// variant.
pub struct Agent {
    config: Config,
    planner: Planner,
    dispatcher: Dispatcher,
    answerer: AnswerBuilder,
    guardrail: Guardrail,
    extractor: ParameterExtractor,
    retriever: HybridRetriever,
    sessions: SessionStore,
    busy: Mutex<HashSet<String>>,
}

impl Agent {
    /// Builds the agent from configuration: opens the store, boots the
    /// corpus, and wires every node.
    ///
    /// # Errors
    ///
    /// Returns configuration and storage errors from assembly.
    pub fn new(config: Config) -> Result<Self> {
        let mut store = SqliteStore::open(&config.session.store_url)?;
        store.init()?;
        let llm = build_caller(&config.llm)?;
        let client = FdaClient::new(&config.openfda)?;
        Self::assemble(config, Arc::new(Mutex::new(store)), llm, Arc::new(client))
    }

    /// Wires the agent over externally constructed parts. The seam the
    /// integration tests use to substitute scripted LLMs and transports.
    ///
    /// # Errors
    ///
    /// Returns storage errors from corpus bootstrap.
    pub fn assemble(
        config: Config,
        store: Arc<Mutex<SqliteStore>>,
        llm: Arc<dyn LlmCaller>,
        client: Arc<FdaClient>,
    ) -> Result<Self> {
        let embedder: Arc<dyn crate::embedding::Embedder> =
            Arc::from(crate::embedding::create_embedder()?);
        let retriever = HybridRetriever::new(Arc::clone(&store), embedder);
        retriever.bootstrap_corpus()?;

        let tools = Arc::new(EndpointTools::new(client));
        let dispatcher = Dispatcher::new(
            Arc::clone(&tools),
            Arc::new(DeviceResolver::new(Arc::clone(&store))),
            Arc::new(ManufacturerResolver::new(Arc::clone(&tools))),
            Arc::new(LocationResolver::new(
                Arc::clone(&tools),
                config.regions.clone(),
            )),
        );

        let model = config.llm.model.clone();
        let guard_model = config.llm.guard_model().to_string();

        Ok(Self {
            planner: Planner::new(Arc::clone(&llm), model.clone()),
            dispatcher,
            answerer: AnswerBuilder::new(Arc::clone(&llm), model.clone()),
            guardrail: Guardrail::new(Arc::clone(&llm), guard_model),
            extractor: ParameterExtractor::new(llm, model),
            retriever,
            sessions: SessionStore::new(store),
            busy: Mutex::new(HashSet::new()),
            config,
        })
    }

    /// Answers a question, creating a session when none is given.
    ///
    /// # Errors
    ///
    /// Returns structured errors for unknown sessions, busy sessions,
    /// exceeded usage caps and exceeded deadlines. Tool failures do not
    /// surface here; they ride inside the answer's provenance.
    pub async fn ask(&self, session_id: Option<&str>, question: &str) -> Result<AgentAnswer> {
        self.run(session_id, question, None, CancellationToken::new())
            .await
    }

    /// Like [`Agent::ask`], under a caller-held cancellation token.
    ///
    /// Cancelling the token aborts in-flight tool calls at the next
    /// suspension point; no answer is emitted and nothing is persisted.
    ///
    /// # Errors
    ///
    /// As [`Agent::ask`], plus a cancellation error when the token
    /// fires mid-episode.
    pub async fn ask_with_cancel(
        &self,
        session_id: Option<&str>,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<AgentAnswer> {
        self.run(session_id, question, None, cancel).await
    }

    /// Streaming variant: events arrive on the returned channel,
    /// terminated by `Complete` or `Error`.
    #[must_use]
    pub fn ask_stream(
        self: Arc<Self>,
        session_id: Option<String>,
        question: String,
    ) -> mpsc::Receiver<AgentEvent> {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let outcome = self
                .run(
                    session_id.as_deref(),
                    &question,
                    Some(sender.clone()),
                    CancellationToken::new(),
                )
                .await;
            match outcome {
                Ok(answer) => {
                    let _ = sender
                        .send(AgentEvent::Complete {
                            answer: Box::new(answer),
                        })
                        .await;
                }
                Err(err) => {
                    let _ = sender
                        .send(AgentEvent::Error {
                            code: err.code().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        });
        receiver
    }

    /// Extends a session's spend limit to the hard cap when the
    /// operator passphrase matches. Returns whether the unlock
    /// happened.
    ///
    /// # Errors
    ///
    /// Returns storage errors; unknown passphrases are a `false`
    /// return, not an error.
    pub fn extend_session_limit(&self, session_id: &str, passphrase: &str) -> Result<bool> {
        let configured = self.config.usage.override_passphrase.as_deref();
        if configured != Some(passphrase) {
            return Ok(false);
        }
        let mut record = self.sessions.load(session_id)?;
        record.usage.limit_usd = self.config.usage.hard_cap_usd;
        self.sessions.append(
            session_id,
            Vec::new(),
            crate::core::ResolverContext::default(),
            record.usage,
        )?;
        Ok(true)
    }

    /// Session store access for the CLI surfaces.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn run(
        &self,
        session_id: Option<&str>,
        question: &str,
        events: Option<mpsc::Sender<AgentEvent>>,
        cancel: CancellationToken,
    ) -> Result<AgentAnswer> {
        // Load or create the session before taking the busy slot
        let record = match session_id {
            Some(id) => self.sessions.load(id)?,
            None => self.sessions.create(self.config.usage.soft_cap_usd)?,
        };
        let id = record.session.id.clone();

        let _busy = BusyGuard::acquire(&self.busy, &id)?;

        if let Some(sender) = &events {
            let _ = sender
                .send(AgentEvent::Start {
                    session_id: id.clone(),
                })
                .await;
        }

        // Usage state carries over from the persisted session
        let tracker = UsageTracker::new(
            self.config.usage.soft_cap_usd,
            self.config.usage.hard_cap_usd,
        );
        tracker.hydrate(&record.usage);
        tracker.begin_turn();
        // No LLM call happens past an exhausted cap
        tracker.check_cap()?;

        let deadline = Duration::from_secs(self.config.turn.deadline_seconds);
        let episode = self.episode(&record, question, &tracker, &cancel, events.as_ref());

        match tokio::time::timeout(deadline, episode).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Abort in-flight tool calls; nothing is persisted
                cancel.cancel();
                Err(AgentError::TurnDeadlineExceeded {
                    seconds: self.config.turn.deadline_seconds,
                }
                .into())
            }
        }
    }

    /// One full PLAN -> DISPATCH -> ASSESS -> ANSWER -> GUARD episode.
    async fn episode(
        &self,
        record: &SessionRecord,
        question: &str,
        tracker: &UsageTracker,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentAnswer> {
        let session_id = record.session.id.clone();
        let mut state = AgentState {
            messages: vec![
                Message::system("openFDA device agent"),
                Message::user(question),
            ],
            resolver_context: record.resolver_context.clone(),
            ..AgentState::default()
        };

        let hints = endpoint_hints(question);

        // Extraction, with one constrained re-pass when fields came
        // back uncertain and routing is known
        let outcome = self.extractor.extract(question, None, tracker).await?;
        state.extracted = outcome.params;
        if !state.extracted.low_confidence_fields().is_empty()
            && let Some(endpoint) = hints.first()
        {
            let fields = self.retriever.field_reference(*endpoint)?;
            if !fields.is_empty() {
                let refined = self
                    .extractor
                    .extract(question, Some(&fields), tracker)
                    .await?;
                state.extracted = refined.params;
            }
        }

        let mut feedback: Option<String> = None;
        loop {
            tracker.check_cap()?;
            if let Some(sender) = events {
                let _ = sender
                    .send(AgentEvent::Thinking {
                        message: format!("planning (attempt {})", state.retries + 1),
                    })
                    .await;
            }

            // The planner observes a snapshot; DISPATCH is the writer
            let context_snapshot = state.resolver_context.clone();
            let plan = self
                .planner
                .plan(
                    question,
                    &state.extracted,
                    &context_snapshot,
                    &hints,
                    feedback.as_deref(),
                    tracker,
                )
                .await?;
            state.strategy = Some(plan.strategy);
            state.selected_endpoint = plan.calls.first().and_then(|call| tool_endpoint(&call.tool));

            // A clarifying question terminates the episode
            if let Some(clarification) = plan.clarification {
                let provenance = Provenance::from_tool_calls(state.tool_calls.clone(), state.retries);
                let usage = tracker.turn_usage();
                self.persist_turn(&session_id, question, &clarification, &state, tracker)?;
                return Ok(AgentAnswer {
                    answer: clarification,
                    structured_data: None,
                    provenance,
                    usage,
                    session_id,
                });
            }

            self.dispatcher
                .execute(&plan, &mut state, cancel, events)
                .await?;

            let assessment = assess(question, &state);
            tracing::debug!(
                sufficient = assessment.sufficient,
                reason = %assessment.reason,
                retries = state.retries,
                "assessment"
            );
            if assessment.sufficient || state.retries >= self.config.retry.max {
                break;
            }
            state.retries += 1;
            state
                .messages
                .push(Message::assistant(format!(
                    "results insufficient: {}; re-planning",
                    assessment.reason
                )));
            feedback = Some(assessment.reason);
        }

        // ANSWER
        let draft = self.answerer.draft(question, &state, tracker).await?;

        // GUARD
        let reviewed = self
            .guardrail
            .review(&draft, &state.tool_calls, &state.resolver_context, tracker)
            .await;

        let provenance = Provenance::from_tool_calls(state.tool_calls.clone(), state.retries);
        let answer_text = format!(
            "{reviewed}\n\n{}",
            answer::render_provenance(&provenance)
        );

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }

        // END: persist and emit
        self.persist_turn(&session_id, question, &answer_text, &state, tracker)?;
        Ok(AgentAnswer {
            answer: answer_text,
            structured_data: structured_data(&state),
            provenance,
            usage: tracker.turn_usage(),
            session_id,
        })
    }

    fn persist_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        state: &AgentState,
        tracker: &UsageTracker,
    ) -> Result<()> {
        let mut assistant = Message::assistant(answer);
        assistant.tool_calls = Some(
            state
                .tool_calls
                .iter()
                .map(|call| call.tool_name.clone())
                .collect(),
        );
        self.sessions.append(
            session_id,
            vec![Message::user(question), assistant],
            state.resolver_context.clone(),
            tracker.snapshot(),
        )?;
        Ok(())
    }
}

/// Maps a search tool name to its endpoint.
fn tool_endpoint(tool: &str) -> Option<Endpoint> {
    match tool {
        "search_classifications" => Some(Endpoint::Classification),
        "search_510k" => Some(Endpoint::Clearance510k),
        "search_pma" => Some(Endpoint::Pma),
        "search_recalls" => Some(Endpoint::Enforcement),
        "search_events" => Some(Endpoint::Event),
        "search_udi" => Some(Endpoint::Udi),
        "search_registrations" | "resolve_manufacturer" => Some(Endpoint::RegistrationListing),
        _ => None,
    }
}

/// Picks the structured payload for the answer: aggregation counts
/// first, then the enriched resolver context.
fn structured_data(state: &AgentState) -> Option<serde_json::Value> {
    for call in &state.tool_calls {
        if let Some(StructuredResult::Counts(counts)) =
            call.result.as_ref().and_then(|r| r.structured.as_ref())
        {
            return serde_json::to_value(counts).ok();
        }
    }
    if state.resolver_context.is_empty() {
        None
    } else {
        serde_json::to_value(&state.resolver_context).ok()
    }
}

/// Holds a session's busy slot for the duration of a turn.
#[derive(Debug)]
struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> BusyGuard<'a> {
    fn acquire(busy: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self> {
        let mut set = busy
            .lock()
            .map_err(|_| Error::from(StorageError::Database("busy set poisoned".to_string())))?;
        if !set.insert(id.to_string()) {
            return Err(AgentError::SessionBusy { id: id.to_string() }.into());
        }
        Ok(Self {
            busy,
            id: id.to_string(),
        })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.busy.lock() {
            set.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_endpoint_mapping() {
        assert_eq!(
            tool_endpoint("search_recalls"),
            Some(Endpoint::Enforcement)
        );
        assert_eq!(tool_endpoint("resolve_device"), None);
    }

    #[test]
    fn test_busy_guard_blocks_second_acquire() {
        let busy = Mutex::new(HashSet::new());
        let guard = BusyGuard::acquire(&busy, "s1").unwrap();
        let err = BusyGuard::acquire(&busy, "s1").unwrap_err();
        assert_eq!(err.code(), "session_busy");
        drop(guard);
        assert!(BusyGuard::acquire(&busy, "s1").is_ok());
    }
}
