//! Coordination library server (C4): brokers named mutexes, shared
//! key/value state, and exclusive value sets across subprocesses (spec
//! §4.4).

pub mod client;
pub mod error;
pub mod resourcefile;
pub mod rpc;
pub mod server;
pub mod sharedlib;
pub mod state;

pub use client::CoordClient;
pub use error::{CoordError, Result};
pub use resourcefile::{load_value_sets, ValueSet};
pub use server::CoordinationServer;
pub use sharedlib::SharedLibraryRegistry;
pub use state::{AddedSuite, CoordinationState};

/// Default coordination server endpoint (spec §4.4).
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8270;
