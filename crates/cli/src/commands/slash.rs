//! Slash commands understood by the interactive session.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Exit,
    /// Reset the conversation to the system prompt.
    Clear,
    Tools,
    Servers,
    Model,
    /// Switch to another configured provider.
    Switch(Option<String>),
    Unknown(String),
}

impl SlashCommand {
    /// Parse an input line. `None` means the line is a prompt for the model.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if matches!(line, "exit" | "quit" | "q") {
            return Some(Self::Exit);
        }

        let rest = line.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::to_string);

        Some(match command {
            "help" | "h" | "?" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            "clear" => Self::Clear,
            "tools" => Self::Tools,
            "servers" => Self::Servers,
            "model" => Self::Model,
            "switch" => Self::Switch(argument),
            other => Self::Unknown(other.to_string()),
        })
    }
}

pub const HELP: &str = "\
  /help              Show this help
  /clear             Start over from the system prompt
  /tools             List available tools
  /servers           Show MCP server status
  /model             Show the active provider and model
  /switch <provider> Switch to another provider
  /exit              Quit (also: /quit, /q, exit, quit, q)
  Ctrl+C             Cancel the running turn";
