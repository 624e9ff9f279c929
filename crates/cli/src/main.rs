//! CoralClaw CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive session (the default)
//! - `ask`    — Run a single prompt and exit
//! - `init`   — Write default config, MCP server and env files
//! - `config` — Print the effective configuration

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "coralclaw",
    about = "CoralClaw — chat with an LLM that can use MCP tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    session: SessionArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Options shared by every command that talks to a model.
#[derive(Args, Clone, Debug, Default)]
pub struct SessionArgs {
    /// Provider to use (openai, gemini, ollama, custom)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Model override for the selected provider
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Skip connecting to MCP servers
    #[arg(long, global = true)]
    pub no_mcp: bool,

    /// Enable the local `run_command` tool
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Run a single prompt instead of an interactive session
    #[arg(short = 'c', long = "command")]
    pub prompt: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Send a single prompt and print the answer
    Ask {
        /// The prompt text
        prompt: String,
    },

    /// Write default configuration files to ~/.coralclaw
    Init,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed answers
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut session = cli.session;
    match cli.command {
        None | Some(Commands::Chat) => commands::chat::run(session).await?,
        Some(Commands::Ask { prompt }) => {
            session.prompt = Some(prompt);
            commands::chat::run(session).await?
        }
        Some(Commands::Init) => commands::init::run()?,
        Some(Commands::Config) => commands::config_cmd::show(&session)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_is_chat() {
        let cli = Cli::parse_from(["coralclaw"]);
        assert!(cli.command.is_none());
        assert!(cli.session.prompt.is_none());
    }

    #[test]
    fn global_flags_parse() {
        let cli = Cli::parse_from([
            "coralclaw", "-p", "ollama", "-m", "qwen2.5", "--no-mcp", "--sandbox", "-c", "hi",
        ]);
        assert_eq!(cli.session.provider.as_deref(), Some("ollama"));
        assert_eq!(cli.session.model.as_deref(), Some("qwen2.5"));
        assert!(cli.session.no_mcp);
        assert!(cli.session.sandbox);
        assert_eq!(cli.session.prompt.as_deref(), Some("hi"));
    }

    #[test]
    fn ask_subcommand_takes_prompt() {
        let cli = Cli::parse_from(["coralclaw", "ask", "what time is it", "--sandbox"]);
        match cli.command {
            Some(Commands::Ask { prompt }) => assert_eq!(prompt, "what time is it"),
            _ => panic!("expected ask"),
        }
        assert!(cli.session.sandbox);
    }
}
