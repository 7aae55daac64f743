//! Core types and traits for the gridgate gateway control plane.
//!
//! This crate provides the foundational types shared by the store, the
//! authorities and the CLI:
//!
//! - **Types**: domain names, DNS record sets, routing entries, tunnel peer
//!   configs and the workload payloads received from the provisioning engine
//! - **Errors**: the shared error taxonomy in [`GatewayError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use gridgate_core::{DomainName, Record, RecordSet, Result};
//!
//! fn records_for(domain: &str, ip: std::net::IpAddr) -> Result<RecordSet> {
//!     let name = DomainName::parse(domain)?;
//!     let mut set = RecordSet::new();
//!     set.add(Record::from_ip(ip, 3600));
//!     println!("{} -> {} records", name, set.len());
//!     Ok(set)
//! }
//! ```

mod error;
pub mod types;

pub use error::{GatewayError, Result};
pub use types::*;
