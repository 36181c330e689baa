//! Transport-agnostic protocol engines for the Asterisk Manager Interface
//! (AMI) and Gateway Interface (AGI/FastAGI/Async AGI).
//!
//! Neither engine owns a socket. You drive them from whatever I/O loop you
//! already have: hand each engine a [`Transport`] once a connection is
//! established, feed it bytes as they arrive, and tell it when the
//! connection goes away.
//!
//! ```ignore
//! use ami_agi_core::ami::{AmiConfig, AmiEngine, Action};
//! use ami_agi_core::Transport;
//!
//! let mut engine = AmiEngine::new(AmiConfig::default());
//! engine.connection_made(my_socket_handle);
//! engine.data_received(b"Asterisk Call Manager/2.10.3\r\n");
//! let login = engine.send_action(
//!     Action::new("Login").header("Username", "admin").header("Secret", "secret"),
//!     None,
//! );
//! login.on_result(|response| println!("logged in: {response:?}"));
//! ```
//!
//! Both engines are single-threaded and cooperative: no locking happens
//! inside them, and every sink they call runs synchronously on whatever
//! thread called `data_received`.

pub mod agi;
pub mod ami;
pub mod deferred;
pub mod encoding;
pub mod error;
pub mod framer;
pub mod transport;

pub use deferred::DeferredHandle;
pub use transport::Transport;
