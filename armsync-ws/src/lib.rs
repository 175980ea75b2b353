//! [`armsync::Transport`] implementation over WebSocket.

#![warn(rust_2018_idioms)]

mod transport;

pub use crate::transport::*;
