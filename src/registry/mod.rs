//! Registry access through the `cargo` CLI

pub mod cargo_registry;
pub mod command_executor;

pub use cargo_registry::CargoRegistry;
pub use command_executor::{CommandError, SafeCommandExecutor};
