//! Server side of the TLS and DTLS handshake, SSL 3.0 through TLS 1.2, built
//! to be a conformance test peer.
//!
//! A [`ServerConnection`] runs one handshake at a time over a
//! [`HandshakeChannel`], the record layer it is given. A [`TestPolicy`] makes
//! it misbehave in controlled ways or assert things about the client.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tlspeer::{Config, ServerCertificate, ServerConnection, TestPolicy, HandshakeChannel};
//! # fn run(channel: &mut dyn HandshakeChannel, chain: Vec<Vec<u8>>, key: &[u8]) -> Result<(), tlspeer::Error> {
//! let config = Config::builder()
//!     .certificate(ServerCertificate::new(chain, key)?)
//!     .build()?;
//!
//! let mut conn = ServerConnection::new(Arc::new(config), TestPolicy::new(), false);
//! let established = conn.handshake(channel)?;
//! println!("negotiated {}", established.version);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

pub mod certificate;
pub mod cipher_suite;
pub mod crypto;
pub mod message;
pub mod transcript;
pub mod types;

mod channel;
mod client_auth;
mod config;
mod error;
mod extensions;
mod key_agreement;
mod policy;
mod resumption;
mod server;
mod session;
mod ticket;

pub use channel::{CipherSpec, HandshakeChannel};
pub use client_auth::{ClientCertVerifier, TrustRootVerifier};
pub use config::{Config, ConfigBuilder, ServerCertificate};
pub use crypto::{CryptoProvider, KeyDeriver, SecureRandom, TrafficKeys};
pub use error::Error;
pub use policy::TestPolicy;
pub use server::{Established, ServerConnection, ServerState};
pub use session::{AesGcmTicketSealer, MemorySessionCache, SessionCache, SessionState, TicketSealer};
pub use types::{AlertDescription, ClientAuthType, ContentType, ProtocolVersion};
