//! Interactive sidekick session
//!
//! The loop reads turns, keeps the active file set and its context current,
//! picks a model per turn and streams responses to the console.

pub mod console;
pub mod input;
pub mod interrupt;
pub mod runner;
pub mod state;

pub use console::{Console, StdoutSink, TerminalConsole};
pub use input::{
    Command, ExternalEditor, InputEditor, ParsedTurn, ScriptedTurns, StdinTurns, TurnParser,
    TurnSource, HELP_TEXT,
};
pub use interrupt::{ChannelInterrupt, CtrlC, InterruptSource, NoInterrupt};
pub use runner::{LoopOptions, LoopParts, SidekickLoop, StructureOptions};
pub use state::{ActiveModel, Phase};
