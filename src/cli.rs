//! Command-line arguments

use crate::config::SidekickConfig;
use clap::Parser;
use std::path::PathBuf;

/// Coding help from your AI sidekick
#[derive(Parser, Debug, Clone)]
#[command(name = "sidekick")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Files to use as context for the session
    pub files: Vec<String>,

    /// What to ask your sidekick to do; exits after the response
    #[arg(short = 'r', long)]
    pub request: Option<String>,

    /// Don't automatically load any files for context
    #[arg(short = 'n', long)]
    pub no_files: bool,

    /// Don't load files larger than this many tokens
    #[arg(short = 'm', long)]
    pub max_file_tokens: Option<usize>,

    /// Print the context for a commit (message and diff) and exit
    #[arg(long, value_name = "REF")]
    pub commit: Option<String>,

    /// Configuration file (default: the user config directory)
    #[arg(long, value_name = "PATH", env = "SIDEKICK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Include the directory structure in the context
    #[arg(long)]
    pub structure: bool,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_to(&self, config: &mut SidekickConfig) {
        if let Some(max) = self.max_file_tokens {
            config.budget.max_file_tokens = max;
        }
        if self.structure {
            config.structure.include = true;
        }
    }
}
