//! Live synchronization and mutation dispatch for the Examsy exam application
//!
//! - `store`: the remote document store boundary and an in-process implementation
//! - `mirror`: live local copies of the students, sessions and rooms collections
//! - `dispatch`: the closed command vocabulary that is the only write path
//! - `session`: the role/session automaton and its persisted credential
//! - `import`: CSV student import driven through the dispatcher

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod import;
pub mod mirror;
pub mod model;
pub mod session;
pub mod store;

pub use app::ExamsyCore;
pub use dispatch::{Command, Dispatcher};
pub use error::{Result, SyncError};
pub use mirror::LiveMirror;
pub use session::{SessionMachine, SessionState};
pub use store::{Collection, MemoryStore, RemoteStore};
