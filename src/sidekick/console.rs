//! User-facing output: status messages and the per-turn response sink

use crate::llm::ResponseSink;
use std::io::Write;

/// Where the loop reports to the user
pub trait Console: Send + Sync {
    fn info(&self, msg: &str);

    fn warn(&self, msg: &str);

    fn error(&self, msg: &str);

    /// Messages spoken by the assistant itself
    fn bot(&self, msg: &str);

    /// A fresh sink for one model response
    fn response_sink(&self) -> Box<dyn ResponseSink>;
}

/// Plain terminal console. Responses and info go to stdout, problems to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn info(&self, msg: &str) {
        println!("{}", msg);
    }

    fn warn(&self, msg: &str) {
        eprintln!("warning: {}", msg);
    }

    fn error(&self, msg: &str) {
        eprintln!("error: {}", msg);
    }

    fn bot(&self, msg: &str) {
        println!("{}", msg);
    }

    fn response_sink(&self) -> Box<dyn ResponseSink> {
        Box::new(StdoutSink::default())
    }
}

/// Streams tokens to stdout as they arrive
#[derive(Debug, Default)]
pub struct StdoutSink {
    written: usize,
}

impl ResponseSink for StdoutSink {
    fn on_token(&mut self, token: &str) {
        let mut out = std::io::stdout().lock();
        // a closed stdout only loses display output
        let _ = out.write_all(token.as_bytes());
        let _ = out.flush();
        self.written += token.len();
    }

    fn on_complete(&mut self) {
        if self.written > 0 {
            println!();
        }
    }
}
