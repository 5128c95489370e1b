//! A poll-driven DNS resolution channel.
//!
//! This crate provides non-blocking lookups of host addresses, host names,
//! and service names. Lookups are started on a [`Channel`] together with a
//! completion handler. The channel is then driven either by your own event
//! loop or by [`Channel::run_until_idle`] and calls each handler exactly
//! once when its lookup is done.
//!
//! # Modules
//!
//! * [channel] contains the channel itself and the socket state hook,
//! * [dispatch] contains the methods for starting lookups,
//! * [marshal] contains the result types handed to completion handlers,
//! * [select] contains a simple `poll(2)` based event loop,
//! * [engine] contains the trait for resolver engines and the stub engine
//!   that is used by default,
//! * [options], [conf], [hosts], and [services] deal with configuration,
//!   the latter three providing access to the system’s configuration files,
//! * [error], [family], and [flags] contain supporting types.
//!
//! # Example
//!
//! ```no_run
//! use resolv_channel::{Channel, Family};
//!
//! let mut channel = Channel::new()?;
//! channel.resolve_host_by_name("example.com", Family::Inet, |_, res| {
//!     match res {
//!         Ok(host) => println!("{}: {:?}", host.canonical_name, host.addresses),
//!         Err(err) => eprintln!("lookup failed: {}", err),
//!     }
//! })?;
//! channel.run_until_idle(None)?;
//! # Ok::<(), resolv_channel::Error>(())
//! ```
//!
//! # Reference of Feature Flags
//!
//! * `serde`: Enables serialization of [`Options`] and the flag types via
//!   [serde](https://serde.rs/).
#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use self::channel::{Channel, SocketStateHandler};
pub use self::conf::ResolvConf;
pub use self::dispatch::NameInfoRequest;
pub use self::engine::{Engine, SocketEvent, StubEngine};
pub use self::error::{Error, Result, Status};
pub use self::family::Family;
pub use self::flags::{InitFlags, NameInfoFlags};
pub use self::marshal::{HostResult, NameInfoResult};
pub use self::options::{Lookups, Options};

pub mod channel;
pub mod conf;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod family;
pub mod flags;
pub mod hosts;
pub mod marshal;
pub mod options;
pub mod select;
pub mod services;
