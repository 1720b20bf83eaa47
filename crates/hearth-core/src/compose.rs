// ABOUTME: Invocation contract for the container orchestration CLI (docker compose)
// ABOUTME: Builds up/attach/stop commands and parses the started-container marker

use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

/// Default orchestration binary.
pub const DEFAULT_BINARY: &str = "docker";

/// How to reach the compose CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCli {
    /// Binary providing the `compose` subcommand (defaults to "docker")
    pub binary: String,
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }
}

impl ComposeCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// `compose --ansi never up -d`: bring the project up, detached.
    ///
    /// Stdout and stderr are piped so the whole output can be scanned once
    /// the process exits.
    pub fn up_command(&self, dir: &Path) -> Command {
        let mut cmd = self.base(dir);
        cmd.args(["--ansi", "never", "up", "-d"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// `compose attach <instance>`: proxy the running container's console.
    pub fn attach_command(&self, dir: &Path, instance: &str) -> Command {
        let mut cmd = self.base(dir);
        cmd.arg("attach")
            .arg(instance)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// `compose --ansi never stop <instance>`: teardown after detaching.
    pub fn stop_command(&self, dir: &Path, instance: &str) -> Command {
        let mut cmd = self.base(dir);
        cmd.args(["--ansi", "never", "stop"])
            .arg(instance)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn base(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("compose").current_dir(dir).kill_on_drop(true);
        cmd
    }
}

fn started_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Container\s+([A-Za-z0-9-]+)\s+Started").expect("static pattern is valid")
    })
}

/// Find the container named by a `Container <token> Started` line.
///
/// Compose pads the columns with a variable run of spaces. When several
/// containers start in one `up`, the last one reported wins.
pub fn parse_started_container(output: &str) -> Option<String> {
    started_pattern()
        .captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scan the setup process output for the started container.
///
/// Stdout is the contract; compose v2 reports progress on stderr, so that is
/// searched when stdout has no marker.
pub fn find_started_container(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    parse_started_container(&String::from_utf8_lossy(stdout))
        .or_else(|| parse_started_container(&String::from_utf8_lossy(stderr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_space_marker() {
        let out = "Network demo_default  Created\nContainer demo-abc Started\n";
        assert_eq!(parse_started_container(out).as_deref(), Some("demo-abc"));
    }

    #[test]
    fn parses_compose_padded_marker() {
        let out = " Container minecraft-server-mc-1  Starting\n Container minecraft-server-mc-1  Started\n";
        assert_eq!(
            parse_started_container(out).as_deref(),
            Some("minecraft-server-mc-1")
        );
    }

    #[test]
    fn last_started_container_wins() {
        let out = "Container db-1  Started\nContainer app-1  Started\n";
        assert_eq!(parse_started_container(out).as_deref(), Some("app-1"));
    }

    #[test]
    fn running_is_not_started() {
        assert_eq!(parse_started_container("Container demo-1  Running\n"), None);
    }

    #[test]
    fn token_stops_at_disallowed_characters() {
        // underscores are outside the token alphabet, so no match
        assert_eq!(parse_started_container("Container demo_1 Started"), None);
    }

    #[test]
    fn empty_output_has_no_marker() {
        assert_eq!(parse_started_container(""), None);
    }

    #[test]
    fn stderr_is_scanned_when_stdout_is_silent() {
        let found = find_started_container(b"", b"Container x-1  Started\n");
        assert_eq!(found.as_deref(), Some("x-1"));
    }

    #[test]
    fn stdout_marker_takes_precedence() {
        let found = find_started_container(b"Container a-1 Started", b"Container b-1 Started");
        assert_eq!(found.as_deref(), Some("a-1"));
    }

    #[test]
    fn commands_target_compose_in_service_dir() {
        let cli = ComposeCli::new("podman");
        let cmd = cli.up_command(Path::new("/srv/mc"));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "podman");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["compose", "--ansi", "never", "up", "-d"]);
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/srv/mc")));
    }

    #[test]
    fn attach_command_names_instance() {
        let cli = ComposeCli::default();
        let cmd = cli.attach_command(Path::new("/srv/mc"), "mc-1");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["compose", "attach", "mc-1"]);
    }

    #[test]
    fn stop_command_names_instance() {
        let cli = ComposeCli::default();
        let cmd = cli.stop_command(Path::new("/srv/mc"), "mc-1");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["compose", "--ansi", "never", "stop", "mc-1"]);
    }
}
