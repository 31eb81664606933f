#![deny(missing_docs)]

//! This crate provides a step-driven framework for SASL authentication (RFC
//! 4422) and a few authentication mechanisms.
//!
//! A [`Negotiator`] binds one [`Mechanism`](mechanism::Mechanism) to a
//! [`Config`] and drives the exchange one challenge/response round at a time.
//! Challenges passed to [`Negotiator::step`] and the responses it returns are
//! base64 encoded; mechanisms only ever see the decoded payloads.
//!
//! # Examples
//!
//! ```rust
//! use sasl_machine::mechanisms::Plain;
//! use sasl_machine::{Config, Credentials, Negotiator};
//!
//! let config = Config::new()
//!     .with_credentials(|| Credentials::new("Kurt", "xipj3plmq").with_identity("Ursel"));
//! let mut client = Negotiator::new_client(Plain, config);
//!
//! let (more, resp) = client.step(b"").unwrap();
//! assert!(!more);
//! assert_eq!(resp, b"VXJzZWwAS3VydAB4aXBqM3BsbXE=");
//! ```
//!
//! You may look at the tests of `negotiator.rs` for examples of more advanced
//! usage, including the SCRAM family and custom mechanisms.

mod config;
mod error;
mod mechanism;
mod negotiator;
mod nonce;
mod state;

pub mod mechanisms;

pub use config::{Config, Credentials, TlsState};
pub use error::Error;
pub use mechanism::{Cache, Mechanism};
pub use negotiator::{Negotiator, Permissions};
pub use state::{State, Step};
