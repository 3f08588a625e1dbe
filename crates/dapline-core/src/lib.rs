//! Host-side domain types for the dapline session engine
//!
//! Everything a host hands to a debug session, or receives back from it,
//! without any knowledge of the wire protocol:
//!
//! - `entities` - breakpoints, launch parameters, session events
//! - `ports` - traits for the breakpoint store and output sink
//! - `substitution` - `${env_var:NAME}` expansion for launch parameters

pub mod entities;
pub mod error;
pub mod memory_store;
pub mod ports;
pub mod substitution;

pub use entities::*;
pub use error::{Error, Result};
pub use memory_store::InMemoryBreakpointStore;
pub use ports::*;
pub use substitution::{EnvSubstitution, NoSubstitution, StringSubstitution};
