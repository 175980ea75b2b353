//! Joint-state synchronization and motion interpolation for a robot arm
//! driven by a remote authority.

#![warn(rust_2018_idioms)]

mod connection;
mod engine;
mod error;
mod joint;
mod motion;
mod placement;
mod protocol;
mod render;
mod store;
mod timer;
mod transport;

pub use connection::*;
pub use engine::*;
pub use error::*;
pub use joint::*;
pub use motion::*;
pub use placement::*;
pub use protocol::*;
pub use render::*;
pub use store::*;
pub use transport::*;

// re-export
pub use async_trait::async_trait;
pub use indexmap::IndexMap;
pub use url::Url;
