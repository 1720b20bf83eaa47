// ABOUTME: Minecraft server adapter (itzg/minecraft-server style compose project)
// ABOUTME: Answers connected users from the console `list` command

use crate::compose::ComposeCli;
use crate::service::{delegate_running_service, ConnectedUsers, GameService, ServiceDefinition};
use crate::supervisor::{Supervisor, SupervisorOptions};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_NAME: &str = "minecraft-server";
pub const DEFAULT_DIRECTORY: &str = "~/minecraft-server";

const LIST_COMMAND: &str = "list";

pub struct MinecraftServer {
    supervisor: Supervisor,
}

impl MinecraftServer {
    pub fn new(definition: ServiceDefinition, cli: ComposeCli, options: SupervisorOptions) -> Self {
        Self {
            supervisor: Supervisor::new(definition, cli, options),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

impl Default for MinecraftServer {
    fn default() -> Self {
        Self::new(
            ServiceDefinition::new(DEFAULT_NAME, DEFAULT_DIRECTORY),
            ComposeCli::default(),
            SupervisorOptions::default(),
        )
    }
}

delegate_running_service!(MinecraftServer);

#[async_trait]
impl GameService for MinecraftServer {
    async fn connected_users(&self) -> ConnectedUsers {
        let empty = ConnectedUsers::Names(Vec::new());
        if !self.supervisor.state().is_started() {
            return empty;
        }
        match self.supervisor.run(LIST_COMMAND, None).await {
            Ok(Some(line)) => parse_player_list(&line).unwrap_or_else(|| {
                tracing::warn!(line = %line, "Unrecognized player list response");
                empty
            }),
            Ok(None) => empty,
            Err(e) => {
                tracing::warn!(error = %e, "Player list query failed");
                empty
            }
        }
    }
}

fn list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"There are (\d+)(?: of a max(?: of)? \d+|/\d+) players online:(.*)$")
            .expect("static pattern is valid")
    })
}

/// Parse the response to `list`, e.g.
/// `[12:00:00 INFO]: There are 2 of a max of 20 players online: alex, steve`.
fn parse_player_list(line: &str) -> Option<ConnectedUsers> {
    let caps = list_pattern().captures(line)?;
    let names: Vec<String> = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    Some(ConnectedUsers::Names(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::RunningService;

    #[test]
    fn parses_named_players() {
        let line = "[12:00:00] [Server thread/INFO]: There are 2 of a max of 20 players online: alex, steve";
        assert_eq!(
            parse_player_list(line),
            Some(ConnectedUsers::Names(vec![
                "alex".to_string(),
                "steve".to_string()
            ]))
        );
    }

    #[test]
    fn parses_empty_server() {
        let line = "[Server thread/INFO]: There are 0 of a max of 20 players online: ";
        assert_eq!(parse_player_list(line), Some(ConnectedUsers::Names(vec![])));
    }

    #[test]
    fn parses_legacy_slash_format() {
        let line = "There are 1/20 players online:Notch";
        assert_eq!(
            parse_player_list(line),
            Some(ConnectedUsers::Names(vec!["Notch".to_string()]))
        );
    }

    #[test]
    fn rejects_unrelated_line() {
        assert_eq!(parse_player_list("Unknown command. Type \"help\" for help."), None);
    }

    #[test]
    fn default_points_at_home_directory() {
        let server = MinecraftServer::default();
        assert_eq!(server.definition().name, DEFAULT_NAME);
        assert!(server.definition().directory.ends_with("minecraft-server"));
    }

    #[tokio::test]
    async fn not_started_reports_nobody() {
        let server = MinecraftServer::default();
        assert_eq!(server.connected_users().await, ConnectedUsers::Names(vec![]));
    }
}
