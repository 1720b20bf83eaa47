// ABOUTME: Service definitions and the capability traits adapters implement
// ABOUTME: RunningService is start/run/status; GameService adds a connected-user query

use crate::error::Result;
use crate::supervisor::{Supervisor, SupervisorEvent, SupervisorState};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Static description of a compose service. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Unique service name
    pub name: String,
    /// Directory holding the compose file; the CLI runs from here
    pub directory: PathBuf,
}

impl ServiceDefinition {
    /// Build a definition, expanding a leading `~` in `directory`.
    pub fn new(name: impl Into<String>, directory: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            directory: shellexpand::tilde(directory.as_ref()).into_owned().into(),
        }
    }
}

/// Who is connected to a game service, in whatever shape it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectedUsers {
    Count(u32),
    Names(Vec<String>),
}

impl ConnectedUsers {
    pub fn len(&self) -> usize {
        match self {
            Self::Count(n) => *n as usize,
            Self::Names(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ConnectedUsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n} connected"),
            Self::Names(names) if names.is_empty() => write!(f, "nobody connected"),
            Self::Names(names) => write!(f, "{}", names.join(", ")),
        }
    }
}

/// A service that can be brought up and driven through its console.
#[async_trait]
pub trait RunningService: Send + Sync {
    fn definition(&self) -> &ServiceDefinition;

    fn state(&self) -> SupervisorState;

    fn subscribe(&self) -> BoxStream<'static, SupervisorEvent>;

    async fn start(&self) -> Result<()>;

    /// Send a console command; `Ok(None)` when nothing answered in time.
    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<Option<String>>;

    async fn shutdown(&self, stop_container: bool) -> Result<()>;
}

/// A game server that can report its connected users.
#[async_trait]
pub trait GameService: RunningService {
    /// Users currently connected.
    ///
    /// Never fails: a service that is not started, or whose answer cannot be
    /// read, reports an empty value.
    async fn connected_users(&self) -> ConnectedUsers;
}

#[async_trait]
impl RunningService for Supervisor {
    fn definition(&self) -> &ServiceDefinition {
        Supervisor::definition(self)
    }

    fn state(&self) -> SupervisorState {
        Supervisor::state(self)
    }

    fn subscribe(&self) -> BoxStream<'static, SupervisorEvent> {
        Supervisor::subscribe(self)
    }

    async fn start(&self) -> Result<()> {
        Supervisor::start(self).await
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        Supervisor::run(self, command, timeout).await
    }

    async fn shutdown(&self, stop_container: bool) -> Result<()> {
        Supervisor::shutdown(self, stop_container).await
    }
}

/// Implement [`RunningService`] for an adapter by delegating to its
/// `supervisor` field.
macro_rules! delegate_running_service {
    ($adapter:ty) => {
        #[async_trait::async_trait]
        impl $crate::service::RunningService for $adapter {
            fn definition(&self) -> &$crate::service::ServiceDefinition {
                self.supervisor.definition()
            }

            fn state(&self) -> $crate::supervisor::SupervisorState {
                self.supervisor.state()
            }

            fn subscribe(
                &self,
            ) -> futures::stream::BoxStream<'static, $crate::supervisor::SupervisorEvent> {
                self.supervisor.subscribe()
            }

            async fn start(&self) -> $crate::error::Result<()> {
                self.supervisor.start().await
            }

            async fn run(
                &self,
                command: &str,
                timeout: Option<std::time::Duration>,
            ) -> $crate::error::Result<Option<String>> {
                self.supervisor.run(command, timeout).await
            }

            async fn shutdown(&self, stop_container: bool) -> $crate::error::Result<()> {
                self.supervisor.shutdown(stop_container).await
            }
        }
    };
}

pub(crate) use delegate_running_service;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_expands_home() {
        let def = ServiceDefinition::new("mc", "~/minecraft-server");
        assert!(!def.directory.to_string_lossy().starts_with('~'));
        assert!(def.directory.ends_with("minecraft-server"));
    }

    #[test]
    fn definition_keeps_absolute_paths() {
        let def = ServiceDefinition::new("mc", "/srv/minecraft");
        assert_eq!(def.directory, PathBuf::from("/srv/minecraft"));
        assert_eq!(def.name, "mc");
    }

    #[test]
    fn connected_users_len() {
        assert_eq!(ConnectedUsers::Count(3).len(), 3);
        assert!(ConnectedUsers::Names(vec![]).is_empty());
        assert_eq!(
            ConnectedUsers::Names(vec!["a".into(), "b".into()]).len(),
            2
        );
    }

    #[test]
    fn connected_users_display() {
        assert_eq!(ConnectedUsers::Count(2).to_string(), "2 connected");
        assert_eq!(ConnectedUsers::Names(vec![]).to_string(), "nobody connected");
        assert_eq!(
            ConnectedUsers::Names(vec!["alex".into(), "steve".into()]).to_string(),
            "alex, steve"
        );
    }

    #[tokio::test]
    async fn supervisor_is_a_running_service() {
        let sup = Supervisor::with_defaults(ServiceDefinition::new("plain", "/srv/plain"));
        let service: &dyn RunningService = &sup;
        assert_eq!(service.definition().name, "plain");
        assert_eq!(service.state(), SupervisorState::Idle);
        assert!(service.run("list", None).await.is_err());
    }
}
