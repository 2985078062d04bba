//! Interactive console over a [`GatewayManager`].
//!
//! The console owns no process-wide I/O: callers hand it a reader and a
//! writer, which is how the tests drive it.

use agent::{AskRequest, GatewayManager, resolve_provider};
use proto::QueryResult;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

const PROMPT: &str = "llm-gateway> ";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatCommand {
    Ask(String),
    History,
    Reset,
    Provider(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

/// Console state: the preferred provider and the session id.
pub struct ChatConsole<'a> {
    manager: &'a GatewayManager,
    provider: Option<String>,
    session_id: String,
}

impl<'a> ChatConsole<'a> {
    pub fn new(manager: &'a GatewayManager, provider: Option<String>, session_id: String) -> Self {
        Self {
            manager,
            provider,
            session_id,
        }
    }

    /// Reads lines until EOF or `/quit`, answering each one on `writer`.
    pub async fn run<R, W>(&mut self, reader: R, writer: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(session_id = %self.session_id, provider = ?self.provider, "Chat console started");
        let banner = format!(
            "llm-gateway chat ({}) | session: {} | providers: {}\nType /help for commands.\n",
            self.manager.framework(),
            self.session_id,
            display_list(&self.manager.available_providers()),
        );
        writer.write_all(banner.as_bytes()).await?;
        write_prompt(writer).await?;

        let mut lines = reader.lines();
        while let Some(raw) = lines.next_line().await? {
            let Some(line) = normalize_input_line(&raw) else {
                write_prompt(writer).await?;
                continue;
            };
            let command = parse_command(&line);
            if command == ChatCommand::Quit {
                break;
            }
            let output = self.handle(command).await;
            writer.write_all(format!("{output}\n\n").as_bytes()).await?;
            write_prompt(writer).await?;
        }

        writer.write_all(b"\n").await?;
        writer.flush().await?;
        info!(session_id = %self.session_id, "Chat console stopped");
        Ok(())
    }

    async fn handle(&mut self, command: ChatCommand) -> String {
        match command {
            ChatCommand::Ask(topic) => {
                let mut req = AskRequest::new(topic).session(&self.session_id);
                if let Some(provider) = &self.provider {
                    req = req.provider(provider);
                }
                format_result(&self.manager.ask(req).await)
            }
            ChatCommand::History => {
                let Some(provider) = self.current_provider() else {
                    return "Error: No providers available".to_string();
                };
                match self.manager.history(&provider, &self.session_id).await {
                    Ok(view) if view.turns.is_empty() => {
                        format!("No history for {provider}/{}", self.session_id)
                    }
                    Ok(view) => view
                        .turns
                        .iter()
                        .map(|turn| format!("{}: {}", turn.role, turn.content))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => format!("Error: {e}"),
                }
            }
            ChatCommand::Reset => {
                // Scoped to the provider the next question would go to.
                match self
                    .manager
                    .reset_memory(self.current_provider(), Some(self.session_id.clone()))
                    .await
                {
                    Ok(outcome) => match serde_json::to_string(&outcome.removed_sessions) {
                        Ok(removed) => format!("Memory cleared: {removed}"),
                        Err(_) => "Memory cleared".to_string(),
                    },
                    Err(e) => format!("Error: {e}"),
                }
            }
            ChatCommand::Provider(None) => format!(
                "Provider: {} (available: {})",
                self.current_provider().as_deref().unwrap_or("none"),
                display_list(&self.manager.available_providers()),
            ),
            ChatCommand::Provider(Some(id)) => {
                let available = self.manager.available_providers();
                if available.contains(&id) {
                    let model = self.manager.catalog().model_for(&id).to_string();
                    self.provider = Some(id.clone());
                    format!("Switched to {id} ({model})")
                } else {
                    format!(
                        "Error: provider '{id}' is not available (available: {})",
                        display_list(&available)
                    )
                }
            }
            ChatCommand::Help => [
                "/history         show this session's turns",
                "/reset           clear this session's memory with the current provider",
                "/provider [id]   show or switch the provider",
                "/quit            leave the console",
            ]
            .join("\n"),
            ChatCommand::Unknown(cmd) => format!("Error: unknown command {cmd} (try /help)"),
            ChatCommand::Quit => String::new(),
        }
    }

    fn current_provider(&self) -> Option<String> {
        resolve_provider(
            self.provider.as_deref(),
            &self.manager.available_providers(),
        )
    }
}

async fn write_prompt<W: AsyncWrite + Unpin>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(PROMPT.as_bytes()).await?;
    writer.flush().await
}

/// Trims an input line and drops empty lines.
fn normalize_input_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

fn parse_command(line: &str) -> ChatCommand {
    if !line.starts_with('/') {
        return ChatCommand::Ask(line.to_string());
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    match name {
        "/quit" | "/exit" => ChatCommand::Quit,
        "/history" => ChatCommand::History,
        "/reset" => ChatCommand::Reset,
        "/provider" => ChatCommand::Provider(arg),
        "/help" => ChatCommand::Help,
        other => ChatCommand::Unknown(other.to_string()),
    }
}

fn format_result(result: &QueryResult) -> String {
    match (&result.response, &result.error) {
        (Some(payload), _) if result.success => {
            format!("[{}/{}] {}", result.provider, result.model, payload.display_text())
        }
        (_, Some(error)) => format!("Error: {error}"),
        _ => "Error: empty response".to_string(),
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
