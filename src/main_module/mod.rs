//! Server assembly: bootstrap, routing, health and API docs.

mod bootstrap;
mod health;
mod openapi;
mod server;
mod shutdown;

pub use bootstrap::*;
pub use health::*;
pub use openapi::*;
pub use server::*;
pub use shutdown::*;
