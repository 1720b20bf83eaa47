// ABOUTME: Typed adapters binding a compose service to a concrete game server
// ABOUTME: Each adapter owns a Supervisor and adds its game's connected-user query

mod factorio;
mod minecraft;

pub use factorio::FactorioServer;
pub use minecraft::MinecraftServer;
