//! `coralclaw chat` / `coralclaw ask` — interactive session or single prompt.

use std::io::Write;
use std::time::Duration;

use coralclaw_agent::{CancellationToken, ToolRouter, TurnEngine, TurnEvent, TurnOutcome};
use coralclaw_config::AppConfig;
use coralclaw_core::Error;
use coralclaw_core::message::Conversation;
use coralclaw_core::tool::{ToolInvoker, ToolRegistry};
use coralclaw_mcp::{ConnectionManager, ConnectionState};
use coralclaw_providers::ProviderRouter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::slash::{HELP, SlashCommand};
use crate::SessionArgs;

/// Longest tool output shown on the console; the model always sees all of it.
const RESULT_DISPLAY_CHARS: usize = 500;

pub async fn run(args: SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(&args)?;
    let active = config
        .active_provider()
        .map_err(|e| format!("Provider setup failed: {e}"))?;

    if active.api_key.is_empty() {
        let var = format!("{}_API_KEY", active.name.to_uppercase());
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", active.name);
        eprintln!();
        eprintln!("  Set it in the environment or in the env file:");
        eprintln!("    {var}=...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err(format!("No API key found for provider '{}'", active.name).into());
    }

    let providers = coralclaw_providers::build_from_config(&config)?;
    let (provider, model) = providers.default().ok_or("No default provider configured")?;
    let engine = TurnEngine::new(provider, model)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_streaming(config.stream)
        .with_max_iterations(config.max_iterations);

    let mut manager = ConnectionManager::stdio()
        .with_handshake_timeout(Duration::from_secs(config.mcp.handshake_timeout_secs));
    if !args.no_mcp {
        connect_servers(&mut manager, &config).await;
    }

    let sandbox = config
        .sandbox
        .enabled
        .then(|| coralclaw_tools::sandbox_registry(config.sandbox.default_timeout_secs));

    let result = {
        let mut session = Session {
            conversation: Conversation::with_system_prompt(config.system_prompt.clone()),
            config,
            engine,
            providers,
            sandbox,
            manager: &manager,
        };
        match args.prompt {
            Some(prompt) => session.ask_once(&prompt).await,
            None => session.interactive().await,
        }
    };

    for error in manager.shutdown().await {
        warn!(%error, "MCP server did not shut down cleanly");
    }

    result
}

async fn connect_servers(manager: &mut ConnectionManager, config: &AppConfig) {
    let servers = match config.mcp_servers() {
        Ok(servers) => servers,
        Err(e) => {
            eprintln!("  [MCP] Could not read server config: {e}");
            return;
        }
    };
    if servers.is_empty() {
        return;
    }

    eprintln!("  Connecting to {} MCP server(s)...", servers.len());
    manager.connect_all(&servers).await;
    for server in manager.servers() {
        match server.state {
            ConnectionState::Ready => {
                eprintln!("  ✓ {} ({} tools)", server.name, server.tool_count)
            }
            state => eprintln!("  ✗ {} ({state})", server.name),
        }
    }
}

struct Session<'a> {
    config: AppConfig,
    engine: TurnEngine,
    providers: ProviderRouter,
    conversation: Conversation,
    sandbox: Option<ToolRegistry>,
    manager: &'a ConnectionManager,
}

impl Session<'_> {
    async fn ask_once(&mut self, prompt: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.turn(prompt).await?;
        Ok(())
    }

    async fn interactive(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.banner();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("  You > ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match SlashCommand::parse(line) {
                Some(SlashCommand::Exit) => break,
                Some(command) => self.command(command),
                None => match self.turn(line).await {
                    Ok(_) => println!(),
                    Err(Error::Cancelled) => eprintln!("\n  [Cancelled]\n"),
                    Err(e) => eprintln!("\n  [Error] {e}\n"),
                },
            }
        }

        println!();
        println!("  Goodbye!");
        println!();
        Ok(())
    }

    /// One turn, cancellable with Ctrl+C.
    async fn turn(&mut self, input: &str) -> Result<TurnOutcome, Error> {
        let router = tool_router(self.sandbox.as_ref(), self.manager);

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let mut printing = false;
        let mut on_event = |event: TurnEvent| render(event, &mut printing);
        let result = self
            .engine
            .run(&mut self.conversation, input, &router, &mut on_event, &cancel)
            .await;
        watcher.abort();

        if printing {
            println!();
        }
        result
    }

    fn command(&mut self, command: SlashCommand) {
        match command {
            SlashCommand::Help => println!("{HELP}\n"),
            SlashCommand::Clear => {
                self.conversation =
                    Conversation::with_system_prompt(self.config.system_prompt.clone());
                println!("  Conversation cleared.\n");
            }
            SlashCommand::Tools => self.list_tools(),
            SlashCommand::Servers => self.list_servers(),
            SlashCommand::Model => {
                println!(
                    "  Provider: {}\n  Model:    {}\n",
                    self.engine.provider_name(),
                    self.engine.model()
                );
            }
            SlashCommand::Switch(None) => println!("  Usage: /switch <provider>\n"),
            SlashCommand::Switch(Some(name)) => self.switch(&name),
            SlashCommand::Unknown(name) => {
                println!("  Unknown command '/{name}'. Type /help for commands.\n")
            }
            SlashCommand::Exit => {}
        }
    }

    fn switch(&mut self, name: &str) {
        let Some((provider, model)) = self.providers.get(name) else {
            println!(
                "  Unknown provider '{name}'. Available: {}\n",
                self.providers.list().join(", ")
            );
            return;
        };
        if self
            .config
            .resolve_provider(name)
            .is_ok_and(|resolved| resolved.api_key.is_empty())
        {
            println!("  Provider '{name}' has no API key configured.\n");
            return;
        }

        println!("  Switched to {name} ({model}).\n");
        self.engine.set_provider(provider, model);
    }

    fn list_tools(&self) {
        let router = tool_router(self.sandbox.as_ref(), self.manager);
        let owners = self.manager.tools();
        let definitions = router.definitions();
        if definitions.is_empty() {
            println!("  No tools available.\n");
            return;
        }

        for tool in definitions {
            let owner = if self.sandbox.as_ref().is_some_and(|s| s.has_tool(&tool.name)) {
                "local"
            } else {
                owners
                    .iter()
                    .find(|(name, _)| *name == tool.name)
                    .map(|(_, server)| server.as_str())
                    .unwrap_or("?")
            };
            println!("  {:<24} [{owner}] {}", tool.name, first_line(&tool.description));
        }
        println!();
    }

    fn list_servers(&self) {
        let servers = self.manager.servers();
        if servers.is_empty() {
            println!("  No MCP servers connected.\n");
            return;
        }
        for server in servers {
            println!(
                "  {:<20} {:<10} {} tools",
                server.name,
                server.state.to_string(),
                server.tool_count
            );
        }
        for conflict in self.manager.conflicts() {
            println!("  ! {conflict}");
        }
        println!();
    }

    fn banner(&self) {
        let tool_count = tool_router(self.sandbox.as_ref(), self.manager).definitions().len();
        println!();
        println!("  ╔══════════════════════════════════════════════╗");
        println!("  ║       CoralClaw — Interactive Mode           ║");
        println!("  ╚══════════════════════════════════════════════╝");
        println!();
        println!("  Provider:  {}", self.engine.provider_name());
        println!("  Model:     {}", self.engine.model());
        println!("  Tools:     {tool_count}");
        println!("  Sandbox:   {}", if self.sandbox.is_some() { "on" } else { "off" });
        println!();
        println!("  Type your message and press Enter. /help lists commands.");
        println!();
    }
}

fn tool_router<'a>(
    sandbox: Option<&'a ToolRegistry>,
    manager: &'a ConnectionManager,
) -> ToolRouter<'a> {
    let router = ToolRouter::new().with_remote(manager);
    match sandbox {
        Some(sandbox) => router.with_local(sandbox),
        None => router,
    }
}

/// Print one turn event. `printing` tracks whether model text is mid-line.
fn render(event: TurnEvent, printing: &mut bool) {
    match event {
        TurnEvent::Chunk { content } => {
            if !*printing {
                print!("\n  Assistant > ");
                *printing = true;
            }
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        TurnEvent::ToolCall { name, input, .. } => {
            if *printing {
                println!();
                *printing = false;
            }
            println!("  → {name} {input}");
        }
        TurnEvent::ToolResult { output, .. } => {
            println!("  ← {}", truncate_display(&output, RESULT_DISPLAY_CHARS));
        }
        TurnEvent::Done { .. } => {}
    }
}

fn truncate_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let hidden = text[cut..].chars().count();
            format!("{}... ({hidden} more chars)", &text[..cut])
        }
        None => text.to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_display("hello", 500), "hello");
        assert_eq!(truncate_display("", 500), "");
    }

    #[test]
    fn long_output_is_cut_on_char_boundary() {
        let text = "é".repeat(510);
        let shown = truncate_display(&text, 500);
        assert!(shown.starts_with(&"é".repeat(500)));
        assert!(shown.ends_with("... (10 more chars)"));
    }

    #[test]
    fn router_prefers_local_sandbox() {
        let manager = ConnectionManager::stdio();
        let sandbox = coralclaw_tools::sandbox_registry(5);

        let with_sandbox = tool_router(Some(&sandbox), &manager);
        assert!(with_sandbox.has_tool("run_command"));

        let without = tool_router(None, &manager);
        assert!(!without.has_tool("run_command"));
        assert!(without.definitions().is_empty());
    }

    #[test]
    fn description_first_line() {
        assert_eq!(first_line("Run a command.\nMore detail."), "Run a command.");
        assert_eq!(first_line(""), "");
    }
}
