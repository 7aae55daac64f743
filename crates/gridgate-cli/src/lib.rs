//! # gridgate-cli
//!
//! Operator command-line interface for a gridgate node.
//!
//! Drives the domain, routing and tunnel authorities directly against the
//! store named in the node configuration, and replays workload files through
//! the provisioner.

pub mod cli;
pub mod output;

pub use cli::run;
