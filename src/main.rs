use anyhow::{bail, Context, Result};
use clap::Parser;
use sidekick::cli::Args;
use sidekick::config::{LoggingConfig, SidekickConfig};
use sidekick::context::token_estimator::DEFAULT_MODEL_FAMILY;
use sidekick::context::{
    resolve_repo_path, AutoSelectLimits, AutoSelector, GitCli, GitContextBuilder, IgnoreSet,
    TiktokenEstimator, TokenBudget, TokenEstimator, VersionControl,
};
use sidekick::llm::{ChatCompletionFactory, ConversationMemory, OpenAiCatalog};
use sidekick::session::SessionStore;
use sidekick::sidekick::{
    CtrlC, ExternalEditor, LoopOptions, LoopParts, SidekickLoop, StdinTurns, StructureOptions,
    TerminalConsole,
};
use sidekick::tiers::{ModelTierSelector, ProviderContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SidekickConfig::load_unchecked(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply_to(&mut config);
    init_logging(&config.logging);

    let cwd = std::env::current_dir().context("Cannot read the working directory")?;
    if !GitCli::is_inside_work_tree(&cwd) {
        bail!("This command must be run from within a git repository.");
    }
    let git = Arc::new(GitCli::discover(&cwd)?);
    let builder = GitContextBuilder::new(git.clone()).with_context_lines(config.budget.diff_context_lines);

    if let Some(commit) = &args.commit {
        let text = builder
            .build_context(Some(commit), None)
            .with_context(|| format!("Cannot show commit {}", commit))?;
        println!("{}", text);
        return Ok(());
    }

    config.validate()?;
    info!("Starting sidekick in {}", git.root().display());

    let explicit_files = args
        .files
        .iter()
        .map(|file| resolve_repo_path(git.root(), &cwd, file))
        .collect::<sidekick::Result<Vec<_>>>()?;

    let provider_config = &config.provider;
    let mode = provider_config.mode();
    let credential = provider_config
        .credential()
        .cloned()
        .context("No API key configured")?;
    let base_url = provider_config.base_url().to_string();
    let timeout = provider_config.request_timeout();

    let catalog = Arc::new(OpenAiCatalog::new(&base_url, timeout)?);
    let provider = ProviderContext::new(mode, credential.clone(), &base_url, catalog);
    let factory = Arc::new(ChatCompletionFactory::new(&base_url, credential, mode, timeout)?);

    let estimator: Arc<dyn TokenEstimator> = Arc::new(TiktokenEstimator::new()?);
    let selector = ModelTierSelector::new(TokenBudget::from_config(&config.budget)?);
    let memory = ConversationMemory::shared(config.llm.memory_tokens, estimator.clone());

    let auto_selector = Arc::new(AutoSelector::new(
        builder.clone(),
        estimator.clone(),
        DEFAULT_MODEL_FAMILY,
        AutoSelectLimits {
            ceiling_tokens: config.budget.auto_context_tokens,
            max_file_tokens: config.budget.max_file_tokens,
        },
    ));

    let structure = config.structure.include.then(|| StructureOptions {
        ignore: IgnoreSet::new(config.structure.ignore_patterns.iter()),
        use_ignore_file: config.structure.use_ignore_file,
        depth: Some(config.structure.depth),
    });

    let options = LoopOptions {
        explicit_files,
        auto_context: !args.no_files,
        request: args.request.clone(),
        structure,
        response_tokens: config.budget.response_tokens,
        temperature: config.llm.temperature,
        streaming: config.llm.streaming,
    };

    let mut sidekick = SidekickLoop::new(LoopParts {
        session: Some(SessionStore::new(config.session.path_in(git.root()))),
        builder,
        estimator,
        selector,
        provider,
        factory,
        memory,
        auto_selector: Some(auto_selector),
        console: Arc::new(TerminalConsole),
        editor: Arc::new(ExternalEditor::default()),
        options,
    });

    let mut turns = StdinTurns::new("> ");
    let mut interrupts = CtrlC;
    sidekick.run(&mut turns, &mut interrupts).await?;

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
