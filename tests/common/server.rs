//! A DNS server on the loopback interface.
//!
//! The server answers from a small table of records over both UDP and TCP
//! on separate ports and keeps statistics about the queries it receives.
//! It runs on two threads that stop once the server is dropped.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{
    Ipv4Addr, Ipv6Addr, TcpListener, TcpStream, UdpSocket,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use domain::base::iana::{Rcode, Rtype};
use domain::base::{Message, MessageBuilder, Name};
use domain::rdata::{Aaaa, Ptr, A};
use resolv_channel::ResolvConf;


//------------ Zone ----------------------------------------------------------

/// The data the server answers with.
#[derive(Clone, Debug, Default)]
pub struct Zone {
    pub a: HashMap<String, Vec<Ipv4Addr>>,
    pub aaaa: HashMap<String, Vec<Ipv6Addr>>,
    pub ptr: HashMap<String, String>,

    /// Answer UDP queries with an empty truncated message.
    pub truncate_udp: bool,

    /// Answer everything with this rcode and no records.
    pub rcode: Option<Rcode>,

    /// Don’t answer at all.
    pub silent: bool,
}

impl Zone {
    pub fn with_a(mut self, name: &str, addr: &str) -> Self {
        self.a
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(addr.parse().unwrap());
        self
    }

    pub fn with_aaaa(mut self, name: &str, addr: &str) -> Self {
        self.aaaa
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(addr.parse().unwrap());
        self
    }

    pub fn with_ptr(mut self, owner: &str, target: &str) -> Self {
        self.ptr.insert(owner.to_ascii_lowercase(), target.into());
        self
    }

    fn exists(&self, qname: &str) -> bool {
        self.a.contains_key(qname)
            || self.aaaa.contains_key(qname)
            || self.ptr.contains_key(qname)
    }

    /// Creates the response to a query.
    fn respond(&self, query: &[u8], udp: bool) -> Option<Vec<u8>> {
        let msg = Message::from_octets(query).ok()?;
        let question = msg.first_question()?;
        let qname = question
            .qname()
            .to_string()
            .trim_end_matches('.')
            .to_ascii_lowercase();
        let qtype = question.qtype();

        let rcode = match self.rcode {
            Some(rcode) => rcode,
            None if self.exists(&qname) => Rcode::NOERROR,
            None => Rcode::NXDOMAIN,
        };
        let mut answer =
            MessageBuilder::new_vec().start_answer(&msg, rcode).ok()?;
        if self.rcode.is_some() {
            return Some(answer.finish());
        }
        if udp && self.truncate_udp {
            answer.header_mut().set_tc(true);
            return Some(answer.finish());
        }

        let owner = absolute(&qname)?;
        if qtype == Rtype::A {
            for addr in self.a.get(&qname).into_iter().flatten() {
                answer.push((&owner, 3600u32, A::new(*addr))).ok()?;
            }
        } else if qtype == Rtype::AAAA {
            for addr in self.aaaa.get(&qname).into_iter().flatten() {
                answer.push((&owner, 3600u32, Aaaa::new(*addr))).ok()?;
            }
        } else if qtype == Rtype::PTR {
            if let Some(target) = self.ptr.get(&qname) {
                let target = absolute(target)?;
                answer.push((&owner, 3600u32, Ptr::new(target))).ok()?;
            }
        }
        Some(answer.finish())
    }
}

fn absolute(name: &str) -> Option<Name<Vec<u8>>> {
    Name::from_str(&format!("{}.", name.trim_end_matches('.'))).ok()
}


//------------ Stats ---------------------------------------------------------

/// What the server has seen.
#[derive(Debug, Default)]
pub struct Stats {
    pub udp: AtomicUsize,
    pub tcp: AtomicUsize,

    /// The question names and RD bits of all queries in order.
    pub queries: Mutex<Vec<(String, bool)>>,
}

impl Stats {
    pub fn udp(&self) -> usize {
        self.udp.load(Ordering::SeqCst)
    }

    pub fn tcp(&self) -> usize {
        self.tcp.load(Ordering::SeqCst)
    }

    pub fn qnames(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn rd_bits(&self) -> Vec<bool> {
        self.queries.lock().unwrap().iter().map(|(_, rd)| *rd).collect()
    }

    fn record(&self, query: &[u8], udp: bool) {
        if udp {
            self.udp.fetch_add(1, Ordering::SeqCst);
        } else {
            self.tcp.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(msg) = Message::from_octets(query) {
            if let Some(question) = msg.first_question() {
                let name = question
                    .qname()
                    .to_string()
                    .trim_end_matches('.')
                    .to_ascii_lowercase();
                self.queries.lock().unwrap().push((name, msg.header().rd()));
            }
        }
    }
}


//------------ FakeServer ----------------------------------------------------

pub struct FakeServer {
    pub addr: Ipv4Addr,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
}

impl FakeServer {
    pub fn start(zone: Zone) -> Self {
        Self::bind(Ipv4Addr::LOCALHOST, 0, 0, zone)
    }

    /// Starts a server on 127.0.0.2 using the same ports as `other`.
    ///
    /// Since the engine uses the same ports for all servers, this is how
    /// to get a second server into a configuration.
    pub fn start_beside(other: &FakeServer, zone: Zone) -> Self {
        Self::bind(
            Ipv4Addr::new(127, 0, 0, 2),
            other.udp_port,
            other.tcp_port,
            zone,
        )
    }

    fn bind(addr: Ipv4Addr, udp_port: u16, tcp_port: u16, zone: Zone) -> Self {
        let udp = UdpSocket::bind((addr, udp_port)).unwrap();
        udp.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let tcp = TcpListener::bind((addr, tcp_port)).unwrap();
        tcp.set_nonblocking(true).unwrap();
        let res = FakeServer {
            addr,
            udp_port: udp.local_addr().unwrap().port(),
            tcp_port: tcp.local_addr().unwrap().port(),
            stats: Default::default(),
            stop: Default::default(),
        };
        let zone = Arc::new(zone);

        let (stats, stop, udp_zone) =
            (res.stats.clone(), res.stop.clone(), zone.clone());
        thread::spawn(move || serve_udp(udp, &udp_zone, &stats, &stop));
        let (stats, stop) = (res.stats.clone(), res.stop.clone());
        thread::spawn(move || serve_tcp(tcp, zone, stats, stop));
        res
    }

    /// Returns a configuration pointing to this server only.
    pub fn conf(&self) -> ResolvConf {
        let mut conf = ResolvConf::new();
        conf.servers.push(self.addr.into());
        conf.udp_port = self.udp_port;
        conf.tcp_port = self.tcp_port;
        conf.timeout = Duration::from_millis(500);
        conf.attempts = 2;
        conf
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst)
    }
}

fn serve_udp(sock: UdpSocket, zone: &Zone, stats: &Stats, stop: &AtomicBool) {
    let mut buf = vec![0u8; 65_535];
    while !stop.load(Ordering::SeqCst) {
        let (len, peer) = match sock.recv_from(&mut buf) {
            Ok(some) => some,
            Err(_) => continue,
        };
        stats.record(&buf[..len], true);
        if zone.silent {
            continue;
        }
        if let Some(response) = zone.respond(&buf[..len], true) {
            let _ = sock.send_to(&response, peer);
        }
    }
}

fn serve_tcp(
    listener: TcpListener,
    zone: Arc<Zone>,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let (zone, stats, stop) =
                    (zone.clone(), stats.clone(), stop.clone());
                thread::spawn(move || {
                    let _ = serve_conn(stream, &zone, &stats, &stop);
                });
            }
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn serve_conn(
    mut stream: TcpStream,
    zone: &Zone,
    stats: &Stats,
    stop: &AtomicBool,
) -> Result<(), io::Error> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(20)))?;
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    while !stop.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(len) => pending.extend_from_slice(&chunk[..len]),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(err) => return Err(err),
        }
        while pending.len() >= 2 {
            let len = usize::from(u16::from_be_bytes([pending[0], pending[1]]));
            if pending.len() < len + 2 {
                break;
            }
            let query: Vec<u8> = pending.drain(..len + 2).skip(2).collect();
            stats.record(&query, false);
            if zone.silent {
                continue;
            }
            if let Some(response) = zone.respond(&query, false) {
                let len = u16::try_from(response.len()).unwrap();
                stream.write_all(&len.to_be_bytes())?;
                stream.write_all(&response)?;
            }
        }
    }
    Ok(())
}
