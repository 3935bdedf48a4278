//! The line-oriented command grammar used at the `cmd>>>` prompt.

use crate::text::norm;

pub const PROMPT: &str = "cmd>>> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line: stop prompting for this batch.
    Done,
    Quit,
    Preview(String),
    Publish(String),
    Invalid(String),
}

/// What the prompt should do after a command has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Again,
    Done,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let cmd = norm(line, &[], true).to_lowercase();
        if cmd.is_empty() {
            return Command::Done;
        }
        if matches!(cmd.as_str(), "q" | "quit" | "exit") {
            return Command::Quit;
        }
        let (verb, rest) = match cmd.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (cmd.as_str(), ""),
        };
        match verb {
            "preview" if !rest.is_empty() => Command::Preview(rest.to_string()),
            "publish" | "post" if !rest.is_empty() => Command::Publish(rest.to_string()),
            _ => Command::Invalid(cmd),
        }
    }

    /// Where the prompt goes once this command has run successfully.
    pub fn disposition(&self) -> Disposition {
        match self {
            Command::Done | Command::Publish(_) => Disposition::Done,
            Command::Quit => Disposition::Quit,
            Command::Preview(_) | Command::Invalid(_) => Disposition::Again,
        }
    }
}
