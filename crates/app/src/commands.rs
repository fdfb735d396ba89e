//! Slash commands typed at the prompt.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text for the model
    Send(String),
    Persona(String),
    Personas,
    Attach(PathBuf),
    Detach,
    /// Toggle deep search, or run one deep search right away
    Deep(Option<String>),
    Export,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /persona <key>   switch persona (starts a new conversation)
  /personas        list available personas
  /attach <path>   attach a PDF, image, video or audio file to the next message
  /detach          drop the pending attachment
  /deep [query]    toggle deep search, or deep-search the query now
  /export          save the conversation as a text file
  /help            show this help
  /quit            exit
Anything else is sent to the assistant.";

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    match (name, arg) {
        ("persona", Some(key)) => Command::Persona(key),
        ("personas", None) | ("persona", None) => Command::Personas,
        ("attach", Some(path)) => Command::Attach(PathBuf::from(path)),
        ("detach", None) => Command::Detach,
        ("deep", query) => Command::Deep(query),
        ("export", None) => Command::Export,
        ("help", _) | ("?", _) => Command::Help,
        ("quit", None) | ("exit", None) | ("q", None) => Command::Quit,
        _ => Command::Unknown(trimmed.to_string()),
    }
}
