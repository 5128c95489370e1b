//! An engine that answers from a table.
//!
//! The engine owns a real loopback UDP socket so that it has a descriptor
//! to report interest in. It never actually uses the socket. Instead, it
//! claims its next deadline to be due right away so that every call to
//! `process` finishes the pending queries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Instant;
use resolv_channel::engine::{
    Answer, Completion, Engine, HostEntry, Interest, QueryId, Request,
    Submitted,
};
use resolv_channel::{Family, NameInfoFlags, SocketEvent, Status};


//------------ Mode ----------------------------------------------------------

/// How the engine completes queries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    /// Queries complete during the next call to `process`.
    #[default]
    Deferred,

    /// Queries complete right away upon submission.
    Immediate,

    /// Queries never complete.
    Hold,
}


//------------ FakeState -----------------------------------------------------

/// The state of a fake engine, shared with the test.
#[derive(Debug, Default)]
pub struct FakeState {
    pub mode: Mode,

    /// The hosts the engine knows about.
    pub hosts: Vec<HostEntry>,

    /// Names for which a status is reported instead of an answer.
    pub failures: HashMap<String, Status>,

    /// All requests in the order they were submitted.
    pub requests: Vec<(QueryId, Request)>,

    /// The requests not yet completed.
    pub pending: Vec<(QueryId, Request)>,

    /// Whether `shutdown` was called.
    pub shutdown: bool,
}

impl FakeState {
    pub fn add_host(&mut self, name: &str, addrs: &[&str]) {
        let addrs: Vec<IpAddr> =
            addrs.iter().map(|addr| addr.parse().unwrap()).collect();
        let family = match addrs.first() {
            Some(IpAddr::V6(_)) => Family::Inet6,
            _ => Family::Inet,
        };
        self.hosts.push(HostEntry {
            name: name.into(),
            aliases: Vec::new(),
            family,
            addrs,
        })
    }

    fn answer(&self, request: &Request) -> Result<Answer, Status> {
        match *request {
            Request::HostByName { ref name, family } => {
                if let Some(status) = self.failures.get(name) {
                    return Err(*status);
                }
                self.hosts
                    .iter()
                    .find(|host| host.name == *name && host.family == family)
                    .cloned()
                    .map(Answer::Host)
                    .ok_or(Status::NotFound)
            }
            Request::HostByAddr { addr } => self
                .by_addr(addr)
                .cloned()
                .map(Answer::Host)
                .ok_or(Status::NotFound),
            Request::NameInfo { addr, flags } => {
                let node = if flags.contains(NameInfoFlags::LOOKUPHOST) {
                    Some(
                        self.by_addr(addr.ip())
                            .ok_or(Status::NotFound)?
                            .name
                            .clone(),
                    )
                } else {
                    None
                };
                let service = if flags.contains(NameInfoFlags::LOOKUPSERVICE)
                {
                    Some(addr.port().to_string())
                } else {
                    None
                };
                Ok(Answer::NameInfo { node, service })
            }
        }
    }

    fn by_addr(&self, addr: IpAddr) -> Option<&HostEntry> {
        self.hosts.iter().find(|host| host.addrs.contains(&addr))
    }
}


//------------ FakeEngine ----------------------------------------------------

pub struct FakeEngine {
    state: Rc<RefCell<FakeState>>,
    sock: Option<UdpSocket>,
}

impl FakeEngine {
    pub fn new() -> (Self, Rc<RefCell<FakeState>>) {
        let state = Rc::new(RefCell::new(FakeState::default()));
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        (
            FakeEngine {
                state: state.clone(),
                sock: Some(sock),
            },
            state,
        )
    }

    /// Returns the descriptor the engine reports interest in.
    pub fn fd(&self) -> RawFd {
        self.sock.as_ref().unwrap().as_raw_fd()
    }
}

impl Engine for FakeEngine {
    fn submit(&mut self, id: QueryId, request: Request) -> Submitted {
        let mut state = self.state.borrow_mut();
        state.requests.push((id, request.clone()));
        match state.mode {
            Mode::Immediate => Submitted::Done(state.answer(&request)),
            Mode::Deferred | Mode::Hold => {
                state.pending.push((id, request));
                Submitted::Pending
            }
        }
    }

    fn interest(&self) -> Interest {
        let mut res = Interest::new();
        if let Some(ref sock) = self.sock {
            if !self.state.borrow().pending.is_empty() {
                res.push(SocketEvent::new(sock.as_raw_fd(), true, false))
            }
        }
        res
    }

    fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.borrow();
        if state.mode == Mode::Deferred && !state.pending.is_empty() {
            Some(Instant::now())
        } else {
            None
        }
    }

    fn process(
        &mut self,
        _readable: &[RawFd],
        _writable: &[RawFd],
    ) -> Vec<Completion> {
        let mut state = self.state.borrow_mut();
        if state.mode == Mode::Hold {
            return Vec::new();
        }
        let pending = std::mem::take(&mut state.pending);
        pending
            .into_iter()
            .map(|(id, request)| Completion::new(id, state.answer(&request)))
            .collect()
    }

    fn shutdown(&mut self) {
        let mut state = self.state.borrow_mut();
        state.shutdown = true;
        state.pending.clear();
        self.sock = None;
    }
}
