// ABOUTME: Factorio headless server adapter
// ABOUTME: Answers connected users as a count from `/players online`

use crate::compose::ComposeCli;
use crate::service::{delegate_running_service, ConnectedUsers, GameService, ServiceDefinition};
use crate::supervisor::{Supervisor, SupervisorOptions};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_NAME: &str = "factorio-server";
pub const DEFAULT_DIRECTORY: &str = "~/factorio-server";

const PLAYERS_COMMAND: &str = "/players online";

pub struct FactorioServer {
    supervisor: Supervisor,
}

impl FactorioServer {
    pub fn new(definition: ServiceDefinition, cli: ComposeCli, options: SupervisorOptions) -> Self {
        Self {
            supervisor: Supervisor::new(definition, cli, options),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

impl Default for FactorioServer {
    fn default() -> Self {
        Self::new(
            ServiceDefinition::new(DEFAULT_NAME, DEFAULT_DIRECTORY),
            ComposeCli::default(),
            SupervisorOptions::default(),
        )
    }
}

delegate_running_service!(FactorioServer);

#[async_trait]
impl GameService for FactorioServer {
    async fn connected_users(&self) -> ConnectedUsers {
        if !self.supervisor.state().is_started() {
            return ConnectedUsers::Count(0);
        }
        match self.supervisor.run(PLAYERS_COMMAND, None).await {
            Ok(Some(line)) => parse_online_count(&line).unwrap_or_else(|| {
                tracing::warn!(line = %line, "Unrecognized online players response");
                ConnectedUsers::Count(0)
            }),
            Ok(None) => ConnectedUsers::Count(0),
            Err(e) => {
                tracing::warn!(error = %e, "Online players query failed");
                ConnectedUsers::Count(0)
            }
        }
    }
}

fn online_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Online players \((\d+)\)").expect("static pattern is valid"))
}

/// Parse the header line of `/players online`, e.g. `Online players (3):`.
/// Player names follow on separate lines and are not collected.
fn parse_online_count(line: &str) -> Option<ConnectedUsers> {
    let caps = online_pattern().captures(line)?;
    caps.get(1)?.as_str().parse().ok().map(ConnectedUsers::Count)
}
