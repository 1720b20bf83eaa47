// ABOUTME: Core library for hearth - compose service supervision and game adapters
// ABOUTME: Shared by the hearth CLI and any web layer that exposes supervisor state

pub mod adapters;
pub mod compose;
pub mod config;
pub mod error;
pub mod framing;
pub mod service;
pub mod supervisor;

pub use adapters::{FactorioServer, MinecraftServer};
pub use compose::ComposeCli;
pub use config::{Config, ServiceConfig, ServiceKind};
pub use error::{StartFailure, SupervisorError};
pub use framing::LineFramer;
pub use service::{ConnectedUsers, GameService, RunningService, ServiceDefinition};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorOptions, SupervisorState};
