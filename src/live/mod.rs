//! Real-time connection to the mailpilot event channel.
//!
//! The channel carries server-push events such as `email_classified` and
//! `sync_complete`. It authenticates in-band after the socket opens and
//! reconnects on its own with exponential backoff whenever it drops for a
//! reason other than a local disconnect or logout.

pub mod backoff;
pub mod frames;
pub mod machine;
pub mod manager;

pub use backoff::ReconnectPolicy;
pub use frames::{ClientFrame, LiveMessage, ServerFrame};
pub use machine::{Action, ConnectionMachine, ConnectionStatus, Event, Phase};
pub use manager::ConnectionManager;
