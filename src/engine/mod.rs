//! Resolver engines.
//!
//! A channel does not talk to DNS servers itself. Instead, it drives an
//! engine through the [`Engine`] trait: it hands over [`Request`]s, asks
//! which sockets the engine wants to be woken up for and when its next
//! timeout is due, and passes on socket readiness. The engine answers with
//! [`Completion`]s carrying either an [`Answer`] or a [`Status`].
//!
//! The crate ships one engine, the [`StubEngine`], a stub resolver
//! speaking DNS over UDP and TCP. Other implementations can be plugged in
//! via [`Channel::with_engine`][crate::Channel::with_engine].

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::os::unix::io::RawFd;
use std::time::Instant;
use smallvec::SmallVec;
use crate::error::Status;
use crate::family::Family;
use crate::flags::NameInfoFlags;

pub use self::stub::StubEngine;


//------------ Sub-modules ---------------------------------------------------

pub mod stub;


//------------ QueryId -------------------------------------------------------

/// The identifier of a query within a channel.
///
/// Identifiers are handed out by the channel in increasing order and are
/// never reused during the lifetime of a channel.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryId(u64);

impl QueryId {
    /// Creates an identifier from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        QueryId(raw)
    }

    /// Returns the raw value.
    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Returns the identifier following this one.
    #[must_use]
    pub fn next(self) -> Self {
        QueryId(self.0 + 1)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}


//------------ Request -------------------------------------------------------

/// A validated request for an engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// Look up the addresses of a host.
    HostByName {
        name: String,
        family: Family,
    },

    /// Look up the host name of an address.
    HostByAddr {
        addr: IpAddr,
    },

    /// Look up host and service names of a socket address.
    ///
    /// The flags always contain `LOOKUPHOST`, `LOOKUPSERVICE`, or both.
    NameInfo {
        addr: SocketAddr,
        flags: NameInfoFlags,
    },
}


//------------ HostEntry -----------------------------------------------------

/// A host as found by an engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostEntry {
    /// The canonical name of the host.
    pub name: String,

    /// Other names of the host.
    pub aliases: Vec<String>,

    /// The family of the addresses.
    pub family: Family,

    /// The addresses of the host.
    pub addrs: Vec<IpAddr>,
}


//------------ Answer --------------------------------------------------------

/// The successful outcome of a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Answer {
    /// The answer to a host by name or host by address request.
    Host(HostEntry),

    /// The answer to a name info request.
    NameInfo {
        node: Option<String>,
        service: Option<String>,
    },
}


//------------ Completion ----------------------------------------------------

/// A query that has finished.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    /// The query that finished.
    pub id: QueryId,

    /// The outcome.
    pub result: Result<Answer, Status>,
}

impl Completion {
    pub fn new(id: QueryId, result: Result<Answer, Status>) -> Self {
        Completion { id, result }
    }
}


//------------ Submitted -----------------------------------------------------

/// What happened to a request upon submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submitted {
    /// The request is in progress and will complete during processing.
    Pending,

    /// The request could be answered right away.
    Done(Result<Answer, Status>),
}


//------------ SocketEvent ---------------------------------------------------

/// The interest of a channel in a socket.
///
/// An event with neither `read` nor `write` set announces that the socket
/// is of no further interest, usually because it was closed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SocketEvent {
    /// The socket’s file descriptor.
    pub fd: RawFd,

    /// Whether the socket should be watched for reading.
    pub read: bool,

    /// Whether the socket should be watched for writing.
    pub write: bool,
}

impl SocketEvent {
    pub fn new(fd: RawFd, read: bool, write: bool) -> Self {
        SocketEvent { fd, read, write }
    }

    /// Creates the event announcing that a socket is no longer of interest.
    pub fn closed(fd: RawFd) -> Self {
        SocketEvent::new(fd, false, false)
    }

    /// Returns whether the event announces the end of interest.
    pub fn is_closed(self) -> bool {
        !self.read && !self.write
    }
}


//------------ Interest ------------------------------------------------------

/// The sockets an engine wants to be watched.
pub type Interest = SmallVec<[SocketEvent; 4]>;


//------------ Engine --------------------------------------------------------

/// A resolver engine.
///
/// Engines are driven from a single thread. None of the methods may block.
pub trait Engine {
    /// Starts processing a request.
    ///
    /// If the engine can answer the request without waiting for I/O, it
    /// returns the outcome right away. Otherwise it keeps the request until
    /// it is returned from a later call to [`process`][Self::process].
    fn submit(&mut self, id: QueryId, request: Request) -> Submitted;

    /// Returns the sockets the engine currently wants to be watched.
    ///
    /// Every socket appears at most once and with at least one of the
    /// directions set.
    fn interest(&self) -> Interest;

    /// Returns the point in time when the engine next needs processing even
    /// if no socket became ready.
    fn next_deadline(&self) -> Option<Instant>;

    /// Processes socket readiness and expired timers.
    ///
    /// Both slices may be empty if the caller only woke up because a
    /// deadline passed. Returns the queries that finished.
    fn process(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
    ) -> Vec<Completion>;

    /// Drops all pending requests and closes all sockets.
    ///
    /// The engine must not report any interest afterwards.
    fn shutdown(&mut self);
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn submit(&mut self, id: QueryId, request: Request) -> Submitted {
        (**self).submit(id, request)
    }

    fn interest(&self) -> Interest {
        (**self).interest()
    }

    fn next_deadline(&self) -> Option<Instant> {
        (**self).next_deadline()
    }

    fn process(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
    ) -> Vec<Completion> {
        (**self).process(readable, writable)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
