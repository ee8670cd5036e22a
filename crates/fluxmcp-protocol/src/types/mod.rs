//! MCP domain types.
//!
//! One module per protocol surface, re-exported flat so downstream crates
//! can `use fluxmcp_protocol::types::*`.

mod capabilities;
mod completion;
mod content;
mod core;
mod initialization;
mod logging;
mod prompts;
mod resources;
mod roots;
mod sampling;
mod tools;

pub use capabilities::*;
pub use completion::*;
pub use content::*;
pub use core::*;
pub use initialization::*;
pub use logging::*;
pub use prompts::*;
pub use resources::*;
pub use roots::*;
pub use sampling::*;
pub use tools::*;
