#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Virtual nodes, their interfaces and the links between them.
//!
//! A [`Node`] is a shell process with its own network identity: a network namespace on
//! Linux, a routing domain on OpenBSD or a vnet jail on FreeBSD. Everything the node does
//! is a command run inside that identity through the session's [`Context`], which carries
//! the [`Executor`](vnet_exec::Executor) and the [`Platform`](platform::Platform).
//!
//! ```no_run
//! use vnet_node::{Context, Link, LinkOptions, Node, NodeOptions, ShapingConfig, Time};
//!
//! # fn main() -> vnet_node::Result<()> {
//! let ctx = Context::native();
//! let h1 = Node::new(&ctx, "h1", NodeOptions::default())?;
//! let h2 = Node::new(&ctx, "h2", NodeOptions::default())?;
//!
//! let shaping = ShapingConfig::default().with_bandwidth(10.0).with_delay(Time::from_millis(5));
//! let mut link = Link::new(&h1, &h2, LinkOptions::default().shaped(shaping))?;
//! println!("{link}: {}", link.status()?);
//!
//! link.delete();
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod platform;

mod context;
mod error;
mod intf;
mod link;
mod node;
mod switch;

pub use alloc::{LinkId, MAX_ROUTING_DOMAINS};
pub use context::Context;
pub use error::{Error, Result};
pub use intf::{
    is_switch_side, ConfigResult, Intf, IntfConfig, IntfKind, ShapingError, ShapingResult,
    DEFAULT_PREFIX_LEN,
};
pub use link::{intf_name, Link, LinkKind, LinkOptions};
pub use node::{IntfInfo, Node, NodeOptions, PrivateDir, RouteVia};
pub use switch::{Controller, Switch, DEFAULT_CONTROLLER_PORT};

pub use vnet_tc::{ShapingConfig, Time};
