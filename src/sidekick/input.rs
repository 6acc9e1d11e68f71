//! Turn parsing: control commands, request editing and the active file set
//!
//! Supported commands:
//! - `/add <paths…>`, `/drop <paths…>`, `/clear` - change the file set
//! - `/files` - list the file set
//! - `/reload` - re-run automatic file selection
//! - `/edit` - edit the previous request in `$EDITOR`
//! - `/help` - list commands
//! - `/quit`, `/exit`, `/q` - end the session
//!
//! A request ending in `\e` is opened in the editor before it is sent.

use super::console::Console;
use crate::context::{FileSelector, RepoFileRef};
use crate::error::{Result, SidekickError};
use async_trait::async_trait;
use indexmap::IndexSet;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command as Process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

pub const HELP_TEXT: &str = "\
Commands:
  /add <file>...   add files to the context
  /drop <file>...  remove files from the context
  /clear           remove all files from the context
  /files           list the files in the context
  /reload          pick files from recent commits and current changes
  /edit            edit the previous request in $EDITOR
  /help            show this help
  /quit            end the session (also /exit, /q)
End a request with \\e to edit it before sending.";

/// Syntax of a single line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Add(Vec<String>),
    Drop(Vec<String>),
    Clear,
    Files,
    Reload,
    Edit,
    Help,
    /// Request to open in the editor first (`\e` suffix stripped)
    EditRequest(String),
    Unknown(String),
    Request(String),
    Empty,
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Command::Empty;
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or_default().to_lowercase();
            let args: Vec<String> = parts.map(String::from).collect();

            return match name.as_str() {
                "quit" | "exit" | "q" => Command::Quit,
                "add" => Command::Add(args),
                "drop" => Command::Drop(args),
                "clear" => Command::Clear,
                "files" => Command::Files,
                "reload" => Command::Reload,
                "edit" => Command::Edit,
                "help" => Command::Help,
                _ => Command::Unknown(trimmed.to_string()),
            };
        }

        let split = trimmed.len().saturating_sub(2);
        if let (Some(head), Some(tail)) = (trimmed.get(..split), trimmed.get(split..)) {
            if tail.eq_ignore_ascii_case("\\e") {
                return Command::EditRequest(head.trim_end().to_string());
            }
        }

        Command::Request(trimmed.to_string())
    }
}

/// What the loop does with a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTurn {
    FreeText(String),
    Terminate,
    /// Nothing for the model; read the next turn
    Continue,
    FileSetChanged(IndexSet<RepoFileRef>),
}

/// Opens text for interactive editing
pub trait InputEditor: Send + Sync {
    fn edit(&self, initial: &str) -> Result<String>;
}

/// Edits through `$VISUAL` / `$EDITOR` (falls back to `vi`)
#[derive(Debug, Default, Clone)]
pub struct ExternalEditor {
    command: Option<String>,
}

impl ExternalEditor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
        }
    }

    fn command(&self) -> String {
        self.command
            .clone()
            .or_else(|| std::env::var("VISUAL").ok())
            .or_else(|| std::env::var("EDITOR").ok())
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string())
    }
}

impl InputEditor for ExternalEditor {
    fn edit(&self, initial: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("sidekick-request-")
            .suffix(".md")
            .tempfile()?;
        file.write_all(initial.as_bytes())?;
        file.flush()?;

        let command = self.command();
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or("vi");
        debug!("Opening {} in {}", file.path().display(), program);

        let status = Process::new(program).args(words).arg(file.path()).status()?;
        if !status.success() {
            return Err(SidekickError::FatalIo(format!(
                "editor {} exited with {}",
                program, status
            )));
        }

        Ok(std::fs::read_to_string(file.path())?.trim().to_string())
    }
}

/// Turns raw input into [`ParsedTurn`]s, owning the active file set
pub struct TurnParser {
    root: PathBuf,
    files: IndexSet<RepoFileRef>,
    last_request: Option<String>,
    editor: Arc<dyn InputEditor>,
    selector: Option<Arc<dyn FileSelector>>,
}

impl TurnParser {
    pub fn new(root: impl Into<PathBuf>, editor: Arc<dyn InputEditor>) -> Self {
        Self {
            root: root.into(),
            files: IndexSet::new(),
            last_request: None,
            editor,
            selector: None,
        }
    }

    /// Selector used by `/reload`
    pub fn with_selector(mut self, selector: Arc<dyn FileSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn files(&self) -> &IndexSet<RepoFileRef> {
        &self.files
    }

    pub fn set_files<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = RepoFileRef>,
    {
        self.files = files.into_iter().collect();
    }

    pub fn last_request(&self) -> Option<&str> {
        self.last_request.as_deref()
    }

    pub fn parse(&mut self, input: &str, console: &dyn Console) -> Result<ParsedTurn> {
        let before = self.files.clone();

        match Command::parse(input) {
            Command::Empty => return Ok(ParsedTurn::Continue),
            Command::Quit => return Ok(ParsedTurn::Terminate),
            Command::Request(text) => {
                self.last_request = Some(text.clone());
                return Ok(ParsedTurn::FreeText(text));
            }
            Command::EditRequest(text) => return self.edit(&text, console),
            Command::Edit => {
                let previous = self.last_request.clone().unwrap_or_default();
                return self.edit(&previous, console);
            }
            Command::Help => {
                console.info(HELP_TEXT);
                return Ok(ParsedTurn::Continue);
            }
            Command::Unknown(cmd) => {
                console.warn(&format!("Unknown command: {}", cmd));
                console.info(HELP_TEXT);
                return Ok(ParsedTurn::Continue);
            }
            Command::Files => {
                self.show_files(console);
                return Ok(ParsedTurn::Continue);
            }
            Command::Add(paths) => self.add(paths, console),
            Command::Drop(paths) => {
                for path in paths {
                    if !self.files.shift_remove(&path) {
                        console.warn(&format!("{} is not in the context", path));
                    }
                }
            }
            Command::Clear => self.files.clear(),
            Command::Reload => match &self.selector {
                Some(selector) => {
                    let selected = selector.select()?;
                    self.files = selected.into_iter().collect();
                }
                None => console.warn("Automatic file selection is not available"),
            },
        }

        // IndexSet equality ignores order
        if self.files == before {
            Ok(ParsedTurn::Continue)
        } else {
            self.show_files(console);
            Ok(ParsedTurn::FileSetChanged(self.files.clone()))
        }
    }

    fn add(&mut self, paths: Vec<String>, console: &dyn Console) {
        if paths.is_empty() {
            console.warn("Usage: /add <file>...");
        }
        for path in paths {
            if self.root.join(&path).is_file() {
                self.files.insert(path);
            } else {
                console.error(&format!("{} does not exist", path));
            }
        }
    }

    fn edit(&mut self, initial: &str, console: &dyn Console) -> Result<ParsedTurn> {
        let edited = self.editor.edit(initial)?;
        if edited.is_empty() {
            return Ok(ParsedTurn::Continue);
        }

        console.info(&format!("Request:\n{}", edited));
        self.last_request = Some(edited.clone());
        Ok(ParsedTurn::FreeText(edited))
    }

    pub fn show_files(&self, console: &dyn Console) {
        if self.files.is_empty() {
            console.info("No files in context");
            return;
        }
        let listing: Vec<&str> = self.files.iter().map(String::as_str).collect();
        console.info(&format!("Files in context:\n  {}", listing.join("\n  ")));
    }
}

/// Supplies user turns; `None` means end of input
#[async_trait]
pub trait TurnSource: Send {
    async fn next_turn(&mut self) -> Result<Option<String>>;
}

/// Reads turns from standard input
pub struct StdinTurns {
    lines: Lines<BufReader<Stdin>>,
    prompt: String,
}

impl StdinTurns {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl TurnSource for StdinTurns {
    async fn next_turn(&mut self) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(self.prompt.as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.next_line().await?)
    }
}

/// Pre-recorded turns
#[derive(Debug, Default, Clone)]
pub struct ScriptedTurns {
    turns: VecDeque<String>,
}

impl ScriptedTurns {
    pub fn new<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            turns: turns.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TurnSource for ScriptedTurns {
    async fn next_turn(&mut self) -> Result<Option<String>> {
        let turn = self.turns.pop_front();
        if turn.is_none() {
            warn!("Scripted turns exhausted");
        }
        Ok(turn)
    }
}
