//! Refresh scheduler.
//!
//! Drives block regeneration through a [`CompletionCapability`]. Two passes:
//!
//! - **On open**: every `OnSessionOpen` block, at most `max_concurrent` in
//!   flight. A semaphore permit is taken before each spawn and held until the
//!   refresh settles.
//! - **Cascade**: the `OnDependencyChange` members of a cascade, one at a
//!   time in cascade order. Each plan is built from the store when its turn
//!   comes, so it sees what earlier members just wrote.
//!
//! ```text
//! Pending ──▶ Dispatched ──▶ Streaming ──▶ Complete
//!                  │              │
//!                  └──────────────┴──────▶ Error
//! ```
//!
//! Every dispatched attempt emits exactly one terminal [`RefreshEvent`], even
//! when the capability panics.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use renga_types::{Block, BlockId, RefreshTrigger};

use crate::config::RefreshConfig;
use crate::error::RefreshError;
use crate::events::{RefreshEvent, RefreshEventSender};
use crate::llm::{CompletionCapability, CompletionRequest, Message, StreamAggregator, StreamEvent};
use crate::mentions::format_reference;
use crate::store::{BlockStore, SharedBlockStore};
use crate::text::{first_non_empty_line, strip_markup};

/// Where a block's current refresh attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Queued in a pass, not yet started.
    Pending,
    /// Plan built, capability invoked.
    Dispatched,
    /// Stream open, fragments arriving.
    Streaming,
    Complete,
    Error,
}

impl RefreshState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Why a refresh was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The block is not in the store.
    UnknownBlock,
    /// Neither a stored prompt nor any non-empty content line.
    EmptyPrompt,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownBlock => "unknown block",
            Self::EmptyPrompt => "empty prompt",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one refresh, as seen by whoever awaited it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed { block_id: BlockId, text: String },
    Failed { block_id: BlockId, error: RefreshError },
    Skipped { block_id: BlockId, reason: SkipReason },
}

impl RefreshOutcome {
    pub fn block_id(&self) -> BlockId {
        match self {
            Self::Completed { block_id, .. }
            | Self::Failed { block_id, .. }
            | Self::Skipped { block_id, .. } => *block_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Everything needed to dispatch one refresh, captured from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    pub block_id: BlockId,
    pub request: CompletionRequest,
}

/// Build the plan for `id` from the store as it is now.
///
/// Prompt is the stored `original_prompt` when non-blank, else the first
/// non-empty line of the stripped content.
pub fn plan_refresh(store: &BlockStore, id: BlockId) -> Result<RefreshPlan, SkipReason> {
    let block = store.get(id).ok_or(SkipReason::UnknownBlock)?;
    let prompt = select_prompt(block).ok_or(SkipReason::EmptyPrompt)?;

    let mut request = CompletionRequest::new(prompt).with_prior(prior_context(store, id));
    if let Some(context) = reference_context(store, block) {
        request = request.with_reference_context(context);
    }

    Ok(RefreshPlan {
        block_id: id,
        request,
    })
}

fn select_prompt(block: &Block) -> Option<String> {
    if let Some(prompt) = block.original_prompt.as_deref()
        && !prompt.trim().is_empty()
    {
        return Some(prompt.trim().to_string());
    }
    first_non_empty_line(&strip_markup(&block.content)).map(str::to_string)
}

/// `[label: content]` for each referenced block still in the store, display order.
fn reference_context(store: &BlockStore, block: &Block) -> Option<String> {
    let mut referenced: Vec<&Block> = block
        .references
        .iter()
        .filter_map(|id| store.get(*id))
        .collect();
    referenced.sort_by_key(|b| b.sort_key());

    let entries: Vec<String> = referenced
        .iter()
        .map(|b| format_reference(&b.label(), &strip_markup(&b.content)))
        .collect();
    (!entries.is_empty()).then(|| entries.join("\n\n"))
}

fn prior_context(store: &BlockStore, id: BlockId) -> Vec<Message> {
    store
        .preceding(id)
        .into_iter()
        .filter_map(|b| {
            let text = strip_markup(&b.content);
            if text.is_empty() {
                return None;
            }
            Some(if b.kind.is_generated() {
                Message::assistant(text)
            } else {
                Message::user(text)
            })
        })
        .collect()
}

/// Dispatches refreshes for one session.
///
/// Cheap to clone; clones share the store, capability, event channel,
/// semaphore, and state table.
#[derive(Clone)]
pub struct RefreshScheduler {
    store: SharedBlockStore,
    capability: Arc<dyn CompletionCapability>,
    events: RefreshEventSender,
    permits: Arc<Semaphore>,
    states: Arc<Mutex<HashMap<BlockId, RefreshState>>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("capability", &self.capability.name())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(
        store: SharedBlockStore,
        capability: Arc<dyn CompletionCapability>,
        config: &RefreshConfig,
        events: RefreshEventSender,
    ) -> Self {
        Self {
            store,
            capability,
            events,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// State of the latest attempt for `id`, if any.
    pub fn state(&self, id: BlockId) -> Option<RefreshState> {
        self.states.lock().get(&id).copied()
    }

    /// Refresh every `OnSessionOpen` block, bounded by the concurrency cap.
    ///
    /// Outcomes are returned in completion order.
    #[tracing::instrument(skip(self), name = "refresh.on_open")]
    pub async fn run_on_open(&self) -> Vec<RefreshOutcome> {
        let candidates: Vec<BlockId> = self
            .store
            .read()
            .all()
            .into_iter()
            .filter(|b| b.refresh_trigger() == RefreshTrigger::OnSessionOpen)
            .map(|b| b.id)
            .collect();

        if candidates.is_empty() {
            tracing::debug!("no on-open blocks");
            return Vec::new();
        }
        self.mark_pending(&candidates);

        let mut tasks = JoinSet::new();
        for id in candidates {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::warn!(error = %e, "refresh semaphore closed, stopping pass");
                    break;
                }
            };
            let scheduler = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                scheduler.refresh_block(id).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(error = %e, "refresh task did not finish"),
            }
        }

        log_summary("on_open", &outcomes);
        outcomes
    }

    /// Refresh the `OnDependencyChange` members of `cascade`, strictly in order.
    ///
    /// Each member is awaited to settlement before the next is planned. A
    /// failure does not stop the pass.
    #[tracing::instrument(skip(self, cascade), name = "refresh.cascade", fields(len = cascade.len()))]
    pub async fn run_cascade(&self, cascade: &[BlockId]) -> Vec<RefreshOutcome> {
        let live: Vec<BlockId> = {
            let store = self.store.read();
            cascade
                .iter()
                .copied()
                .filter(|id| {
                    store
                        .get(*id)
                        .is_some_and(|b| b.refresh_trigger() == RefreshTrigger::OnDependencyChange)
                })
                .collect()
        };
        self.mark_pending(&live);

        let mut outcomes = Vec::with_capacity(live.len());
        for id in live {
            outcomes.push(self.refresh_block(id).await);
        }

        log_summary("cascade", &outcomes);
        outcomes
    }

    /// Plan and run one refresh, regardless of the block's trigger.
    #[tracing::instrument(skip(self), name = "refresh.block", fields(block_id = %id))]
    pub async fn refresh_block(&self, id: BlockId) -> RefreshOutcome {
        let planned = plan_refresh(&self.store.read(), id);
        match planned {
            Ok(plan) => self.dispatch(plan).await,
            Err(reason) => {
                tracing::info!(%reason, "skipping refresh");
                self.states.lock().remove(&id);
                RefreshOutcome::Skipped {
                    block_id: id,
                    reason,
                }
            }
        }
    }

    async fn dispatch(&self, plan: RefreshPlan) -> RefreshOutcome {
        let block_id = plan.block_id;
        let prompt = plan.request.prompt.clone();

        self.set_state(block_id, RefreshState::Dispatched);
        self.emit(RefreshEvent::Started { block_id });

        let result = AssertUnwindSafe(self.stream_response(block_id, plan.request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(RefreshError::Panicked));

        match result {
            Ok(text) => {
                let applied = self.store.write().apply_generated(block_id, &text, &prompt);
                if !applied {
                    tracing::debug!(%block_id, "block removed during refresh, output not stored");
                }
                self.set_state(block_id, RefreshState::Complete);
                self.emit(RefreshEvent::Complete {
                    block_id,
                    text: text.clone(),
                });
                RefreshOutcome::Completed { block_id, text }
            }
            Err(error) => {
                tracing::warn!(%block_id, %error, "refresh failed");
                self.set_state(block_id, RefreshState::Error);
                self.emit(RefreshEvent::Error {
                    block_id,
                    error: error.to_string(),
                });
                RefreshOutcome::Failed { block_id, error }
            }
        }
    }

    /// Route the request and relay fragments until the stream settles.
    ///
    /// A stream that ends without `Done` counts as complete.
    async fn stream_response(
        &self,
        block_id: BlockId,
        request: CompletionRequest,
    ) -> Result<String, RefreshError> {
        let mut stream = self.capability.route(request).await?;
        self.set_state(block_id, RefreshState::Streaming);

        let mut aggregator = StreamAggregator::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta(text) => {
                    tracing::debug!(%block_id, len = text.len(), "fragment");
                    aggregator.push(&text);
                    self.emit(RefreshEvent::Chunk { block_id, text });
                }
                StreamEvent::Done { stop_reason } => {
                    tracing::debug!(%block_id, ?stop_reason, "stream done");
                    break;
                }
                StreamEvent::Error(message) => {
                    aggregator.discard();
                    return Err(RefreshError::Stream(message));
                }
            }
        }
        Ok(aggregator.finish())
    }

    fn mark_pending(&self, ids: &[BlockId]) {
        let mut states = self.states.lock();
        for &id in ids {
            states.insert(id, RefreshState::Pending);
        }
    }

    fn set_state(&self, id: BlockId, state: RefreshState) {
        self.states.lock().insert(id, state);
    }

    fn emit(&self, event: RefreshEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("refresh event receiver dropped");
        }
    }
}

fn log_summary(pass: &str, outcomes: &[RefreshOutcome]) {
    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
    tracing::info!(pass, completed, failed, skipped, "refresh pass finished");
}
