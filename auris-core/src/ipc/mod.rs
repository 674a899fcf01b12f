//! IPC types serialised for host applications.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so host
//! shells can forward monitor events over whatever transport they use.

pub mod events;
