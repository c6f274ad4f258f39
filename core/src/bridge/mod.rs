//! Client side of the external analysis process.
//!
//! The process speaks newline-delimited JSON on stdio. Requests carry an
//! incrementing id that the process echoes; anything without an id is a log line.

mod client;
mod launcher;
pub mod message;

pub use client::{AnalysisBridge, BridgeEvent, BridgeStatus};
pub use launcher::{BoxedReader, BoxedWriter, Connection, Launcher, ProcessLauncher};
pub use message::{HealthInfo, Operation};

#[cfg(test)]
pub(crate) use launcher::locate_executable;

#[cfg(test)]
mod bridge_test;
