//! # Watch Party Client
//!
//! Async plumbing around [`party_core::ClientCore`]:
//!
//! - [`TransportLink`]: reconnecting WebSocket channel to the relay
//! - [`ClientRuntime`]: single event loop feeding the core and carrying out
//!   its effects
//!
//! ## Example
//!
//! ```ignore
//! let (inputs, receivers) = ClientInputs::channel();
//! let player = MyPlayer::new(inputs.clone());
//! let (runtime, mut events) = ClientRuntime::connect(
//!     "ws://localhost:8000/ws",
//!     PartyConfig::from_env(),
//!     engine,
//!     capture,
//!     player,
//!     MemoryNameStore::new(),
//!     receivers,
//! );
//! let handle = runtime.spawn();
//! inputs.command(Command::Play);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod link;
pub mod runtime;

pub use link::TransportLink;
pub use runtime::{ClientInputs, ClientRuntime, InputReceivers, RuntimeHandle};
