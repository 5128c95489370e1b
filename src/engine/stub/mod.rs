//! A stub resolver engine.
//!
//! The most simple resolver possible simply relays all questions to one of
//! a set of pre-configured recursive resolvers that will do the actual
//! work. This module provides such a stub resolver as an [`Engine`] that is
//! driven entirely by socket readiness and timeouts and thus never blocks.
//!
//! Before asking DNS, the engine consults the static host table if the
//! configuration says so. Literal addresses, host table hits, and name info
//! requests that don’t need a name lookup are answered right away upon
//! submission.
//!
//! Each query is sent to the configured servers in turn. A server that
//! doesn’t answer within the configured timeout, that fails, or that refuses
//! to answer is skipped for the next one. Once all servers have been tried,
//! the round starts over until the configured number of attempts is
//! exhausted. Truncated answers are retried over TCP with the same server.

use std::collections::BTreeMap;
use std::mem;
use std::net::{IpAddr, SocketAddr};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use domain::base::iana::{Rcode, Rtype};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};
use crate::conf::{check_domain, ResolvConf};
use crate::engine::{
    Answer, Completion, Engine, HostEntry, Interest, QueryId, Request,
    SocketEvent, Submitted,
};
use crate::error::Status;
use crate::family::Family;
use crate::flags::{InitFlags, NameInfoFlags};
use crate::hosts::{HostAliases, Hosts};
use crate::options::Lookups;
use crate::services::Services;
use self::server::Server;
use self::wire::Reply;


//------------ Sub-modules ---------------------------------------------------

mod nameinfo;
mod search;
mod server;
mod wire;


//------------ StubEngine ----------------------------------------------------

/// A DNS stub resolver engine.
///
/// The engine is created from a [`ResolvConf`] which it keeps for its
/// lifetime. The system’s host and services tables are read once upon
/// creation via [`new`][Self::new]. Use [`with_tables`][Self::with_tables]
/// to provide your own.
#[derive(Debug)]
pub struct StubEngine {
    /// The configuration.
    conf: ResolvConf,

    /// The static host table.
    hosts: Hosts,

    /// The services table for name info requests.
    services: Services,

    /// Host aliases if they are to be used.
    aliases: Option<HostAliases>,

    /// The servers in order of preference.
    servers: Vec<Server>,

    /// The queries waiting for DNS.
    queries: BTreeMap<QueryId, Query>,

    /// Queries finished but not yet returned.
    done: Vec<Completion>,
}

impl StubEngine {
    /// Creates a new engine using the system’s tables.
    ///
    /// The host aliases file named by `HOSTALIASES` is read unless the
    /// `NOALIASES` flag is set.
    pub fn new(conf: ResolvConf) -> Self {
        let mut res =
            Self::with_tables(conf, Hosts::system(), Services::system());
        if !res.conf.flags.contains(InitFlags::NOALIASES) {
            res.aliases = HostAliases::from_env();
        }
        res
    }

    /// Creates a new engine using the given tables.
    pub fn with_tables(
        conf: ResolvConf,
        hosts: Hosts,
        services: Services,
    ) -> Self {
        let servers = conf
            .servers
            .iter()
            .map(|addr| Server::new(*addr, conf.udp_port, conf.tcp_port))
            .collect();
        StubEngine {
            conf,
            hosts,
            services,
            aliases: None,
            servers,
            queries: BTreeMap::new(),
            done: Vec::new(),
        }
    }

    /// Sets the host aliases.
    ///
    /// They are ignored if the `NOALIASES` flag is set.
    pub fn set_aliases(&mut self, aliases: HostAliases) {
        self.aliases = Some(aliases)
    }

    /// Returns the configuration of the engine.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Returns the number of servers queries can go to.
    fn server_count(&self) -> usize {
        if self.conf.flags.contains(InitFlags::PRIMARY) {
            self.servers.len().min(1)
        } else {
            self.servers.len()
        }
    }

    /// Returns the transport a query starts out with at each server.
    fn initial_transport(&self) -> Transport {
        if self.conf.flags.contains(InitFlags::USEVC) {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }

    /// Returns a transaction ID not currently in use.
    fn new_txid(&self) -> u16 {
        loop {
            let txid = rand::random::<u16>();
            if !self.queries.values().any(|query| query.txid == txid) {
                return txid;
            }
        }
    }

    /// Returns whether the host table should be consulted before DNS.
    fn hosts_first(&self) -> bool {
        self.conf.lookups == Lookups::Hosts
    }

    /// Returns the domain stripped from names with `NOFQDN`.
    fn local_domain(&self) -> Option<&str> {
        self.conf.search.first().map(String::as_str)
    }
}


/// # Starting Queries
///
impl StubEngine {
    fn submit_host(
        &mut self,
        id: QueryId,
        name: String,
        family: Family,
    ) -> Submitted {
        if let Ok(addr) = name.parse::<IpAddr>() {
            if !family.matches(&addr) {
                return Submitted::Done(Err(Status::NotFound));
            }
            return Submitted::Done(Ok(Answer::Host(HostEntry {
                name,
                aliases: Vec::new(),
                family,
                addrs: vec![addr],
            })));
        }
        if !check_domain(&name) {
            return Submitted::Done(Err(Status::BadName));
        }

        let alias = match self.aliases {
            Some(ref aliases)
                if !self.conf.flags.contains(InitFlags::NOALIASES) =>
            {
                aliases.lookup(&name).map(|target| {
                    target.trim_end_matches('.').to_string()
                })
            }
            _ => None,
        };
        let (name, names) = match alias {
            Some(target) => {
                debug!("host alias {} for {}", target, name);
                (target.clone(), vec![target])
            }
            None => {
                let names = search::candidates(&name, &self.conf);
                (name, names)
            }
        };

        if self.hosts_first() {
            if let Some(entry) = self.hosts.lookup_host(&name, family) {
                trace!("found {} in host table", name);
                return Submitted::Done(Ok(Answer::Host(entry)));
            }
        }
        let rtype = wire::addr_rtype(family);
        self.start(id, Job::Host { name, family }, names, rtype)
    }

    fn submit_addr(&mut self, id: QueryId, addr: IpAddr) -> Submitted {
        if self.hosts_first() {
            if let Some(entry) = self.hosts.lookup_addr(addr) {
                trace!("found {} in host table", addr);
                return Submitted::Done(Ok(Answer::Host(entry)));
            }
        }
        let names = vec![wire::reverse_name(addr)];
        self.start(id, Job::Addr { addr }, names, Rtype::PTR)
    }

    fn submit_name_info(
        &mut self,
        id: QueryId,
        addr: SocketAddr,
        flags: NameInfoFlags,
    ) -> Submitted {
        if !flags.contains(NameInfoFlags::LOOKUPHOST) {
            return Submitted::Done(Ok(Answer::NameInfo {
                node: None,
                service: nameinfo::service(&self.services, &addr, flags),
            }));
        }
        if flags.contains(NameInfoFlags::NUMERICHOST) {
            return Submitted::Done(Ok(Answer::NameInfo {
                node: Some(nameinfo::numeric_host(&addr)),
                service: nameinfo::service(&self.services, &addr, flags),
            }));
        }
        if self.hosts_first() {
            if let Some(entry) = self.hosts.lookup_addr(addr.ip()) {
                return Submitted::Done(nameinfo::answer(
                    Ok(entry.name),
                    &addr,
                    flags,
                    &self.services,
                    self.local_domain(),
                ));
            }
        }
        let names = vec![wire::reverse_name(addr.ip())];
        self.start(id, Job::NameInfo { addr, flags }, names, Rtype::PTR)
    }

    /// Starts a DNS query and sends it to the first server.
    fn start(
        &mut self,
        id: QueryId,
        job: Job,
        names: Vec<String>,
        rtype: Rtype,
    ) -> Submitted {
        if self.server_count() == 0 {
            warn!("no servers configured");
            return Submitted::Done(
                self.outcome(&job, Err(Status::ConnRefused)),
            );
        }
        let query = Query {
            job,
            names,
            pos: 0,
            rtype,
            txid: self.new_txid(),
            server: 0,
            attempt: 0,
            transport: self.initial_transport(),
            deadline: Instant::now(),
            error: Status::Timeout,
            nodata: false,
        };
        trace!("query {}: starting with {}", id, query.qname());
        self.queries.insert(id, query);
        self.transmit(id);
        let res = match self.done.iter().position(|item| item.id == id) {
            Some(pos) => Submitted::Done(self.done.remove(pos).result),
            None => Submitted::Pending,
        };
        self.tidy();
        res
    }
}


/// # Query State Transitions
///
impl StubEngine {
    /// Sends a query to its current server.
    fn transmit(&mut self, id: QueryId) {
        let recurse = !self.conf.flags.contains(InitFlags::NORECURSE);
        let timeout = self.conf.timeout;
        let query = match self.queries.get_mut(&id) {
            Some(query) => query,
            None => return,
        };
        let msg = match wire::compose(
            query.txid,
            query.qname(),
            query.rtype,
            recurse,
        ) {
            Ok(msg) => msg,
            Err(status) => {
                self.finish(id, Err(status));
                return;
            }
        };
        query.deadline = deadline_after(timeout);
        let server = &mut self.servers[query.server];
        let res = match query.transport {
            Transport::Udp => server.send_udp(&msg),
            Transport::Tcp => server.queue_tcp(&msg),
        };
        debug!(
            "query {}: sent {} for {} to server {} via {:?}",
            id,
            query.rtype,
            query.qname(),
            query.server,
            query.transport
        );
        if let Err(err) = res {
            warn!("query {}: sending failed: {}", id, err);
            self.server_failed(id, Status::ConnRefused);
        }
    }

    /// Processes a reply that was found to belong to a query.
    fn reply(&mut self, id: QueryId, reply: Reply) {
        let flags = self.conf.flags;
        let query = match self.queries.get_mut(&id) {
            Some(query) => query,
            None => return,
        };

        if reply.is_truncated()
            && query.transport == Transport::Udp
            && !flags.contains(InitFlags::IGNTC)
        {
            debug!("query {}: truncated answer, retrying over TCP", id);
            query.transport = Transport::Tcp;
            self.transmit(id);
            return;
        }

        let rcode = reply.rcode();
        if rcode == Rcode::NOERROR {
            let res = match query.job {
                Job::Host { family, .. } => {
                    reply.host(query.qname(), family)
                }
                Job::Addr { addr } => reply.ptr(query.qname(), addr),
                Job::NameInfo { addr, .. } => {
                    reply.ptr(query.qname(), addr.ip())
                }
            };
            match res {
                Ok(entry) => self.finish(id, Ok(entry)),
                Err(Status::NoData) => {
                    self.next_candidate(id, Status::NoData)
                }
                Err(status) => self.finish(id, Err(status)),
            }
        } else if rcode == Rcode::NXDOMAIN {
            self.next_candidate(id, Status::NotFound)
        } else if rcode == Rcode::FORMERR {
            self.finish(id, Err(Status::FormErr))
        } else if rcode == Rcode::SERVFAIL
            || rcode == Rcode::NOTIMP
            || rcode == Rcode::REFUSED
        {
            let status = if rcode == Rcode::SERVFAIL {
                Status::ServFail
            } else if rcode == Rcode::NOTIMP {
                Status::NotImp
            } else {
                Status::Refused
            };
            if flags.contains(InitFlags::NOCHECKRESP) {
                self.finish(id, Err(status))
            } else {
                debug!("query {}: server answered {}", id, rcode);
                self.server_failed(id, status)
            }
        } else {
            self.finish(id, Err(Status::BadResp))
        }
    }

    /// Records a failure of the current server and moves on.
    fn server_failed(&mut self, id: QueryId, status: Status) {
        if let Some(query) = self.queries.get_mut(&id) {
            query.update_error(status);
        }
        self.next_server(id)
    }

    /// Moves a query to the next server.
    ///
    /// If all servers have been tried the configured number of times, the
    /// current name has failed.
    fn next_server(&mut self, id: QueryId) {
        let count = self.server_count();
        let attempts = self.conf.attempts;
        let transport = self.initial_transport();
        let txid = self.new_txid();
        let query = match self.queries.get_mut(&id) {
            Some(query) => query,
            None => return,
        };
        query.server += 1;
        if query.server >= count {
            query.server = 0;
            query.attempt += 1;
            if query.attempt >= attempts {
                let error = query.error;
                debug!("query {}: all servers failed: {}", id, error);
                if error == Status::ServFail {
                    self.next_candidate(id, error)
                } else {
                    self.finish(id, Err(error))
                }
                return;
            }
        }
        query.transport = transport;
        query.txid = txid;
        self.transmit(id)
    }

    /// Moves a query to the next name of its search list.
    fn next_candidate(&mut self, id: QueryId, status: Status) {
        let transport = self.initial_transport();
        let txid = self.new_txid();
        let query = match self.queries.get_mut(&id) {
            Some(query) => query,
            None => return,
        };
        if status == Status::NoData {
            query.nodata = true;
        }
        if query.pos + 1 >= query.names.len() {
            let status = if query.nodata { Status::NoData } else { status };
            self.finish(id, Err(status));
            return;
        }
        query.pos += 1;
        query.server = 0;
        query.attempt = 0;
        query.error = Status::Timeout;
        query.transport = transport;
        query.txid = txid;
        trace!("query {}: trying {}", id, query.qname());
        self.transmit(id)
    }

    /// Finishes a query.
    fn finish(&mut self, id: QueryId, res: Result<HostEntry, Status>) {
        let query = match self.queries.remove(&id) {
            Some(query) => query,
            None => return,
        };
        let result = self.outcome(&query.job, res);
        match result {
            Ok(_) => debug!("query {}: finished", id),
            Err(status) => debug!("query {}: failed: {}", id, status),
        }
        self.done.push(Completion::new(id, result));
    }

    /// Turns the outcome of the DNS part of a job into an answer.
    ///
    /// If DNS is consulted first and didn’t find the name, this falls back
    /// to the host table.
    fn outcome(
        &self,
        job: &Job,
        res: Result<HostEntry, Status>,
    ) -> Result<Answer, Status> {
        let fallback = !self.hosts_first()
            && matches!(res, Err(Status::NotFound) | Err(Status::NoData));
        match *job {
            Job::Host { ref name, family } => {
                let res = match res {
                    Err(status) if fallback => {
                        self.hosts.lookup_host(name, family).ok_or(status)
                    }
                    res => res,
                };
                res.map(Answer::Host)
            }
            Job::Addr { addr } => {
                let res = match res {
                    Err(status) if fallback => {
                        self.hosts.lookup_addr(addr).ok_or(status)
                    }
                    res => res,
                };
                res.map(Answer::Host)
            }
            Job::NameInfo { addr, flags } => {
                let res = match res {
                    Err(status) if fallback => {
                        self.hosts.lookup_addr(addr.ip()).ok_or(status)
                    }
                    res => res,
                };
                nameinfo::answer(
                    res.map(|entry| entry.name),
                    &addr,
                    flags,
                    &self.services,
                    self.local_domain(),
                )
            }
        }
    }

    /// Closes all sockets if they aren’t needed anymore.
    fn tidy(&mut self) {
        if self.queries.is_empty()
            && !self.conf.flags.contains(InitFlags::STAYOPEN)
        {
            for server in &mut self.servers {
                server.close()
            }
        }
    }
}


/// # Processing I/O
///
impl StubEngine {
    /// Handles a message received from a server.
    fn received(
        &mut self,
        server: usize,
        transport: Transport,
        buf: Vec<u8>,
    ) {
        let reply = match Reply::from_octets(buf) {
            Some(reply) => reply,
            None => {
                trace!("ignoring short message from server {}", server);
                return;
            }
        };
        let found = self.queries.iter().find(|(_, query)| {
            query.server == server
                && query.transport == transport
                && query.txid == reply.id()
                && reply.is_answer_to(query.qname(), query.rtype)
        });
        match found {
            Some((id, _)) => {
                let id = *id;
                self.reply(id, reply)
            }
            None => {
                trace!("ignoring unexpected message from server {}", server)
            }
        }
    }

    /// Moves all queries on a failed connection to the next server.
    fn connection_failed(
        &mut self,
        server: usize,
        transport: Transport,
        status: Status,
    ) {
        match transport {
            Transport::Udp => self.servers[server].close_udp(),
            Transport::Tcp => self.servers[server].close_tcp(),
        }
        let ids: SmallVec<[QueryId; 8]> = self
            .queries
            .iter()
            .filter(|(_, query)| {
                query.server == server && query.transport == transport
            })
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.server_failed(id, status)
        }
    }

    fn process_server(
        &mut self,
        idx: usize,
        readable: &[RawFd],
        writable: &[RawFd],
    ) {
        if let Some(fd) = self.servers[idx].tcp_fd() {
            if writable.contains(&fd) || readable.contains(&fd) {
                if let Err(err) = self.servers[idx].flush_tcp() {
                    warn!("TCP connection to server {} failed: {}", idx, err);
                    self.connection_failed(
                        idx,
                        Transport::Tcp,
                        Status::ConnRefused,
                    );
                }
            }
        }
        if let Some(fd) = self.servers[idx].tcp_fd() {
            if readable.contains(&fd) {
                match self.servers[idx].recv_tcp() {
                    Ok(msgs) => {
                        for msg in msgs {
                            self.received(idx, Transport::Tcp, msg)
                        }
                    }
                    Err(err) => {
                        debug!("TCP connection to server {}: {}", idx, err);
                        self.connection_failed(
                            idx,
                            Transport::Tcp,
                            Status::Eof,
                        );
                    }
                }
            }
        }
        if let Some(fd) = self.servers[idx].udp_fd() {
            if readable.contains(&fd) {
                match self.servers[idx].recv_udp() {
                    Ok(msgs) => {
                        for msg in msgs {
                            self.received(idx, Transport::Udp, msg)
                        }
                    }
                    Err(err) => {
                        warn!("UDP socket to server {} failed: {}", idx, err);
                        self.connection_failed(
                            idx,
                            Transport::Udp,
                            Status::ConnRefused,
                        );
                    }
                }
            }
        }
    }

    /// Moves all queries whose deadline has passed to the next server.
    fn process_timeouts(&mut self) {
        let now = Instant::now();
        let expired: SmallVec<[QueryId; 8]> = self
            .queries
            .iter()
            .filter(|(_, query)| query.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            debug!("query {}: timed out", id);
            self.server_failed(id, Status::Timeout)
        }
    }
}


//--- Engine

impl Engine for StubEngine {
    fn submit(&mut self, id: QueryId, request: Request) -> Submitted {
        match request {
            Request::HostByName { name, family } => {
                self.submit_host(id, name, family)
            }
            Request::HostByAddr { addr } => self.submit_addr(id, addr),
            Request::NameInfo { addr, flags } => {
                self.submit_name_info(id, addr, flags)
            }
        }
    }

    fn interest(&self) -> Interest {
        let mut res = Interest::new();
        for (idx, server) in self.servers.iter().enumerate() {
            let waiting = |transport: Transport| {
                self.queries.values().any(|query| {
                    query.server == idx && query.transport == transport
                })
            };
            if let Some(fd) = server.udp_fd() {
                if waiting(Transport::Udp) {
                    res.push(SocketEvent::new(fd, true, false))
                }
            }
            if let Some(fd) = server.tcp_fd() {
                let read = waiting(Transport::Tcp);
                let write = read && server.tcp_wants_write();
                if read || write {
                    res.push(SocketEvent::new(fd, read, write))
                }
            }
        }
        res
    }

    fn next_deadline(&self) -> Option<Instant> {
        if !self.done.is_empty() {
            return Some(Instant::now());
        }
        self.queries.values().map(|query| query.deadline).min()
    }

    fn process(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
    ) -> Vec<Completion> {
        for idx in 0..self.servers.len() {
            self.process_server(idx, readable, writable)
        }
        self.process_timeouts();
        self.tidy();
        mem::take(&mut self.done)
    }

    fn shutdown(&mut self) {
        if !self.queries.is_empty() {
            debug!("dropping {} pending queries", self.queries.len());
        }
        self.queries.clear();
        self.done.clear();
        for server in &mut self.servers {
            server.close()
        }
    }
}


//------------ deadline_after ------------------------------------------------

/// The longest we are going to wait for a server.
///
/// Longer timeouts are cut to this so deadlines stay representable.
const MAX_TIMEOUT: Duration = Duration::from_secs(86_400 * 365);

/// Returns the deadline for a message sent now.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_TIMEOUT)).unwrap_or(now)
}


//------------ Query ---------------------------------------------------------

/// A query waiting for DNS.
#[derive(Clone, Debug)]
struct Query {
    /// What the query is for.
    job: Job,

    /// The names to try in order.
    names: Vec<String>,

    /// The index of the name currently tried.
    pos: usize,

    /// The record type asked for.
    rtype: Rtype,

    /// The transaction ID of the message currently in flight.
    txid: u16,

    /// The index of the server currently tried.
    server: usize,

    /// The number of full rounds through the server list so far.
    attempt: usize,

    /// The transport the message currently in flight was sent over.
    transport: Transport,

    /// When to give up on the current server.
    deadline: Instant,

    /// The error to report if all servers fail for the current name.
    ///
    /// This starts out as a timeout and is replaced by any other error we
    /// encounter. If everything times out, a timeout is what we report.
    error: Status,

    /// Whether any of the names existed but had no data.
    nodata: bool,
}

impl Query {
    fn qname(&self) -> &str {
        &self.names[self.pos]
    }

    fn update_error(&mut self, status: Status) {
        if status != Status::Timeout {
            self.error = status
        }
    }
}


//------------ Job -----------------------------------------------------------

/// What a query is for.
#[derive(Clone, Debug)]
enum Job {
    Host { name: String, family: Family },
    Addr { addr: IpAddr },
    NameInfo { addr: SocketAddr, flags: NameInfoFlags },
}


//------------ Transport -----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Transport {
    Udp,
    Tcp,
}


//============ Testing =======================================================
