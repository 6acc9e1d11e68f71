//! The sidekick loop: an explicit state machine over user turns
//!
//! `Init → AwaitingInput → Processing → (AwaitingInput | Terminated)`.
//! Each turn recomputes the context and its token size, re-runs model
//! selection and rebuilds the invoker when the tier changes. Conversation
//! memory is shared across invokers and only grows on completed responses.

use super::console::Console;
use super::input::{InputEditor, ParsedTurn, TurnParser, TurnSource};
use super::interrupt::InterruptSource;
use super::state::{ActiveModel, Phase};
use crate::context::token_estimator::DEFAULT_MODEL_FAMILY;
use crate::context::{
    files_context, identify_languages, model_family, render_structure, ContextBundle, FileSelector,
    GitContextBuilder, IgnoreSet, RepoFileRef, TokenEstimator,
};
use crate::error::{Result, SidekickError};
use crate::llm::{ModelFactory, ModelSpec, SharedMemory, TurnRequest, SIDEKICK_TEMPLATE};
use crate::session::SessionStore;
use crate::tiers::{ModelTierSelector, ProviderContext};
use indexmap::IndexSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INTERRUPTED_NOTICE: &str = "Ok, I'll stop talking. Hit Ctrl-C again to quit.";
const UNAVAILABLE_REMINDER: &str = "Still no model available for this credential.";

/// Directory tree settings for the context bundle
#[derive(Debug, Clone)]
pub struct StructureOptions {
    pub ignore: IgnoreSet,
    pub use_ignore_file: bool,
    pub depth: Option<usize>,
}

/// Per-run behaviour
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Files named on the command line; these win over everything else
    pub explicit_files: Vec<RepoFileRef>,
    /// Restore from the session or auto-select when no files are given
    pub auto_context: bool,
    /// Run this single request, then stop
    pub request: Option<String>,
    pub structure: Option<StructureOptions>,
    pub response_tokens: usize,
    pub temperature: f32,
    pub streaming: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            explicit_files: Vec::new(),
            auto_context: true,
            request: None,
            structure: None,
            response_tokens: 1024,
            temperature: 0.05,
            streaming: true,
        }
    }
}

/// Collaborators the loop is assembled from
pub struct LoopParts {
    pub builder: GitContextBuilder,
    pub estimator: Arc<dyn TokenEstimator>,
    pub selector: ModelTierSelector,
    pub provider: ProviderContext,
    pub factory: Arc<dyn ModelFactory>,
    pub memory: SharedMemory,
    /// `None` runs without persistence
    pub session: Option<SessionStore>,
    pub auto_selector: Option<Arc<dyn FileSelector>>,
    pub console: Arc<dyn Console>,
    pub editor: Arc<dyn InputEditor>,
    pub options: LoopOptions,
}

pub struct SidekickLoop {
    builder: GitContextBuilder,
    estimator: Arc<dyn TokenEstimator>,
    selector: ModelTierSelector,
    provider: ProviderContext,
    factory: Arc<dyn ModelFactory>,
    memory: SharedMemory,
    session: Option<SessionStore>,
    auto_selector: Option<Arc<dyn FileSelector>>,
    console: Arc<dyn Console>,
    parser: TurnParser,
    options: LoopOptions,
    phase: Phase,
    active: Option<ActiveModel>,
    pending_request: Option<String>,
    /// The turn in flight came from [`LoopOptions::request`]
    one_shot: bool,
    /// Credential advice for [`SidekickError::ModelUnavailable`] was shown
    unavailable_reported: bool,
}

impl SidekickLoop {
    pub fn new(parts: LoopParts) -> Self {
        let mut parser = TurnParser::new(parts.builder.vcs().root(), parts.editor);
        if let Some(selector) = &parts.auto_selector {
            parser = parser.with_selector(selector.clone());
        }

        Self {
            builder: parts.builder,
            estimator: parts.estimator,
            selector: parts.selector,
            provider: parts.provider,
            factory: parts.factory,
            memory: parts.memory,
            session: parts.session,
            auto_selector: parts.auto_selector,
            console: parts.console,
            parser,
            pending_request: parts.options.request.clone(),
            options: parts.options,
            phase: Phase::Init,
            active: None,
            one_shot: false,
            unavailable_reported: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn files(&self) -> &IndexSet<RepoFileRef> {
        self.parser.files()
    }

    pub fn active_model(&self) -> Option<&str> {
        self.active.as_ref().map(ActiveModel::name)
    }

    /// Whether the session is still being persisted
    pub fn is_persisting(&self) -> bool {
        self.session.is_some()
    }

    /// Drive the loop until it terminates
    pub async fn run(
        &mut self,
        turns: &mut dyn TurnSource,
        interrupts: &mut dyn InterruptSource,
    ) -> Result<()> {
        loop {
            debug!("Sidekick phase: {}", self.phase);
            let next = match self.phase.clone() {
                Phase::Init => {
                    self.initialize().await?;
                    Phase::AwaitingInput
                }
                Phase::AwaitingInput => self.await_input(turns, interrupts).await?,
                Phase::Processing(task) => self.process(task, interrupts).await?,
                Phase::Terminated => break,
            };
            self.phase = next;
        }

        info!("Sidekick session ended");
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        let files = self.initial_files();
        self.parser.set_files(files);
        self.parser.show_files(self.console.as_ref());

        if let Err(e) = self.prepare_model().await {
            self.report(e)?;
        }

        self.console
            .bot("Enter a request for your sidekick. Type /help to see available commands.");
        Ok(())
    }

    fn initial_files(&mut self) -> Vec<RepoFileRef> {
        if !self.options.explicit_files.is_empty() {
            return self.options.explicit_files.clone();
        }
        if !self.options.auto_context {
            return Vec::new();
        }

        let restored = match self.session.as_mut().map(SessionStore::read) {
            Some(Ok(state)) => state.files,
            Some(Err(e)) => {
                self.drop_persistence(&e);
                Vec::new()
            }
            None => Vec::new(),
        };

        let root = self.builder.vcs().root().to_path_buf();
        let restored: Vec<RepoFileRef> = restored
            .into_iter()
            .filter(|f| {
                let exists = root.join(f).is_file();
                if !exists {
                    warn!("Session file {} no longer exists, skipping", f);
                }
                exists
            })
            .collect();

        if !restored.is_empty() {
            self.console.info("Using files from the last session for context.");
            return restored;
        }

        let Some(selector) = &self.auto_selector else {
            return Vec::new();
        };
        self.console
            .info("Using recent git commits and current changes for context.");
        selector.select().unwrap_or_else(|e| {
            self.console
                .warn(&format!("Automatic file selection failed: {}", e));
            Vec::new()
        })
    }

    async fn await_input(
        &mut self,
        turns: &mut dyn TurnSource,
        interrupts: &mut dyn InterruptSource,
    ) -> Result<Phase> {
        let from_request = self.pending_request.is_some();
        let input = match self.pending_request.take() {
            Some(request) => request,
            None => {
                let turn = tokio::select! {
                    turn = turns.next_turn() => turn?,
                    _ = interrupts.interrupted() => {
                        debug!("Interrupted while waiting for input");
                        return Ok(Phase::Terminated);
                    }
                };
                match turn {
                    Some(turn) => turn,
                    None => return Ok(Phase::Terminated),
                }
            }
        };

        let parsed = self.parser.parse(&input, self.console.as_ref());
        match parsed {
            Ok(ParsedTurn::FreeText(text)) => {
                // only an up-front request that reaches the model ends the session
                self.one_shot = from_request;
                Ok(Phase::Processing(text))
            }
            Ok(ParsedTurn::Terminate) => Ok(Phase::Terminated),
            Ok(ParsedTurn::Continue) => Ok(Phase::AwaitingInput),
            Ok(ParsedTurn::FileSetChanged(_)) => {
                self.on_file_set_changed()?;
                Ok(Phase::AwaitingInput)
            }
            Err(e) => {
                self.report(e)?;
                Ok(Phase::AwaitingInput)
            }
        }
    }

    fn on_file_set_changed(&mut self) -> Result<()> {
        let files: Vec<RepoFileRef> = self.parser.files().iter().cloned().collect();

        let written = self.session.as_mut().map(|store| store.write_if_changed(&files));
        if let Some(Err(e)) = written {
            self.drop_persistence(&e);
        }

        match self.build_bundle() {
            Ok(bundle) => {
                let tokens = self
                    .estimator
                    .estimate(&bundle.render(), self.active_family());
                info!("Context is now {} files, about {} tokens", files.len(), tokens);
                Ok(())
            }
            Err(e) => self.report(e),
        }
    }

    async fn process(&mut self, task: String, interrupts: &mut dyn InterruptSource) -> Result<Phase> {
        let one_shot = std::mem::take(&mut self.one_shot);
        match self.run_turn(task, interrupts).await {
            Ok(()) if one_shot => Ok(Phase::Terminated),
            Ok(()) => Ok(Phase::AwaitingInput),
            Err(SidekickError::Interrupted) => {
                self.console.bot(INTERRUPTED_NOTICE);
                Ok(Phase::AwaitingInput)
            }
            Err(e) => {
                self.report(e)?;
                Ok(Phase::AwaitingInput)
            }
        }
    }

    async fn run_turn(&mut self, task: String, interrupts: &mut dyn InterruptSource) -> Result<()> {
        let context = self.prepare_model().await?;
        let active = self
            .active
            .clone()
            .ok_or_else(|| SidekickError::Upstream("no model selected".to_string()))?;

        let request = TurnRequest {
            task,
            context,
            languages: identify_languages(self.parser.files()).join(","),
        };

        let mut sink = self.console.response_sink();
        let cancel = CancellationToken::new();

        tokio::select! {
            result = active.invoker.run(&request, sink.as_mut(), &cancel) => result.map(|_| ()),
            _ = interrupts.interrupted() => {
                cancel.cancel();
                Err(SidekickError::Interrupted)
            }
        }
    }

    /// Rebuild the context, size it and make sure a fitting model is active.
    /// Returns the rendered context.
    async fn prepare_model(&mut self) -> Result<String> {
        let context = self.build_bundle()?.render();
        let family = self.active_family().to_string();
        let size = self.selector.budget().request_size(
            self.estimator.as_ref(),
            &family,
            SIDEKICK_TEMPLATE,
            &context,
        );
        let required = size.total();
        debug!("Request size: {:?} = {} tokens", size, required);

        let selection = self.selector.choose(required, &self.provider).await?;
        if self.active_model() == Some(selection.model.as_str()) {
            return Ok(context);
        }

        let spec = ModelSpec {
            name: selection.model.clone(),
            response_tokens: self.options.response_tokens,
            temperature: self.options.temperature,
            streaming: self.options.streaming,
        };
        let invoker = self.factory.build(spec, self.memory.clone())?;

        if self.active.is_some() {
            self.console.info(&format!(
                "Using model {} for a token request size of {}",
                selection.model, required
            ));
        }
        self.active = Some(ActiveModel { selection, invoker });

        Ok(context)
    }

    fn build_bundle(&self) -> Result<ContextBundle> {
        let root = self.builder.vcs().root();

        let structure = match &self.options.structure {
            Some(opts) => Some(render_structure(root, &opts.ignore, opts.use_ignore_file, opts.depth)?),
            None => None,
        };

        let files: Vec<RepoFileRef> = self.parser.files().iter().cloned().collect();
        if files.is_empty() {
            return Ok(ContextBundle {
                structure,
                files: None,
                diffs: Vec::new(),
            });
        }

        Ok(ContextBundle {
            structure,
            files: Some(files_context(root, &files)?),
            diffs: self.builder.collect_entries(Some(files.as_slice()))?,
        })
    }

    fn active_family(&self) -> &str {
        self.active
            .as_ref()
            .map(|m| model_family(m.name()))
            .unwrap_or(DEFAULT_MODEL_FAMILY)
    }

    fn drop_persistence(&mut self, e: &SidekickError) {
        warn!("Session persistence disabled: {}", e);
        self.console
            .error(&format!("{}; continuing without saving the session", e));
        self.session = None;
    }

    /// Tell the user about a failed turn; errors that are not per-turn propagate
    fn report(&mut self, e: SidekickError) -> Result<()> {
        if !e.is_turn_recoverable() {
            return Err(e);
        }

        match e {
            SidekickError::ModelUnavailable { .. } if self.unavailable_reported => {
                debug!("Turn failed: {}", e);
                self.console.error(UNAVAILABLE_REMINDER);
                return Ok(());
            }
            SidekickError::ModelUnavailable { .. } => self.unavailable_reported = true,
            _ => {}
        }

        warn!("Turn failed: {}", e);
        self.console.error(&e.to_string());
        match e {
            SidekickError::TokenBudgetExceeded { .. } => self
                .console
                .info("Remove files with /drop or /clear to reduce the context size."),
            SidekickError::ModelUnavailable { .. } => self
                .console
                .info("A credential with access to more models would help here."),
            _ => {}
        }
        Ok(())
    }
}
