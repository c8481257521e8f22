//! CLI commands module.

mod auth;
mod identity;
mod index;
mod util;

pub use auth::AuthCommand;
pub use identity::{IdentityCommand, list, remove, show};
pub use index::{IndexCommand, stats};

pub(crate) use util::*;
