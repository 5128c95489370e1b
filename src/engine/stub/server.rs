//! The sockets used to talk to a single server.
//!
//! Each server gets at most one UDP socket and one TCP connection. Both are
//! opened lazily, are non-blocking, and stay around until they are closed
//! explicitly or fail.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use bytes::{Buf, BufMut, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace};


//------------ Module Configuration ------------------------------------------

/// The size of the receive buffer for UDP messages.
const RECV_SIZE: usize = 65_535;

/// How much we try to read from a TCP connection at once.
const READ_CHUNK: usize = 4096;


//------------ Server --------------------------------------------------------

/// The connections to one server.
#[derive(Debug)]
pub struct Server {
    /// The address to send UDP queries to.
    udp_addr: SocketAddr,

    /// The address to send TCP queries to.
    tcp_addr: SocketAddr,

    /// The UDP socket if it is open.
    udp: Option<UdpSocket>,

    /// The TCP connection if it is open.
    tcp: Option<TcpConn>,
}

impl Server {
    pub fn new(addr: IpAddr, udp_port: u16, tcp_port: u16) -> Self {
        Server {
            udp_addr: SocketAddr::new(addr, udp_port),
            tcp_addr: SocketAddr::new(addr, tcp_port),
            udp: None,
            tcp: None,
        }
    }

    pub fn udp_fd(&self) -> Option<RawFd> {
        self.udp.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn tcp_fd(&self) -> Option<RawFd> {
        self.tcp.as_ref().map(|conn| conn.stream.as_raw_fd())
    }

    /// Returns whether the TCP connection has something to write.
    ///
    /// This includes waiting for the connection to be established.
    pub fn tcp_wants_write(&self) -> bool {
        match self.tcp {
            Some(ref conn) => !conn.connected || !conn.wbuf.is_empty(),
            None => false,
        }
    }

    pub fn close_udp(&mut self) {
        if let Some(sock) = self.udp.take() {
            debug!(
                "closing UDP socket {} to {}",
                sock.as_raw_fd(),
                self.udp_addr
            );
        }
    }

    pub fn close_tcp(&mut self) {
        if let Some(conn) = self.tcp.take() {
            debug!(
                "closing TCP connection {} to {}",
                conn.stream.as_raw_fd(),
                self.tcp_addr
            );
        }
    }

    pub fn close(&mut self) {
        self.close_udp();
        self.close_tcp();
    }
}


/// # UDP
///
impl Server {
    /// Sends a message via UDP, opening the socket if necessary.
    pub fn send_udp(&mut self, msg: &[u8]) -> Result<(), io::Error> {
        let sock = match self.udp.take() {
            Some(sock) => sock,
            None => {
                let sock = Self::udp_bind(self.udp_addr.is_ipv4())?;
                sock.connect(self.udp_addr)?;
                debug!(
                    "opened UDP socket {} to {}",
                    sock.as_raw_fd(),
                    self.udp_addr
                );
                sock
            }
        };
        let res = sock.send(msg);
        self.udp = Some(sock);
        if res? != msg.len() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "short UDP send",
            ));
        }
        Ok(())
    }

    /// Receives all messages currently waiting on the UDP socket.
    pub fn recv_udp(&mut self) -> Result<Vec<Vec<u8>>, io::Error> {
        let sock = match self.udp {
            Some(ref sock) => sock,
            None => return Ok(Vec::new()),
        };
        let mut res = Vec::new();
        loop {
            let mut buf = vec![0; RECV_SIZE];
            match sock.recv(&mut buf) {
                Ok(len) => {
                    buf.truncate(len);
                    res.push(buf);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(res)
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    fn udp_bind(v4: bool) -> Result<UdpSocket, io::Error> {
        let local: SocketAddr = if v4 {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let sock = UdpSocket::bind(local)?;
        sock.set_nonblocking(true)?;
        Ok(sock)
    }
}


/// # TCP
///
impl Server {
    /// Queues a message for sending via TCP, connecting if necessary.
    ///
    /// The message is sent once the socket becomes writable.
    pub fn queue_tcp(&mut self, msg: &[u8]) -> Result<(), io::Error> {
        let len = u16::try_from(msg.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "message too long")
        })?;
        let mut conn = match self.tcp.take() {
            Some(conn) => conn,
            None => TcpConn::connect(self.tcp_addr)?,
        };
        conn.wbuf.put_u16(len);
        conn.wbuf.extend_from_slice(msg);
        self.tcp = Some(conn);
        Ok(())
    }

    /// Writes as much of the queued data as possible.
    pub fn flush_tcp(&mut self) -> Result<(), io::Error> {
        match self.tcp {
            Some(ref mut conn) => conn.flush(),
            None => Ok(()),
        }
    }

    /// Reads all complete messages currently available.
    ///
    /// Returns an error if the server closed the connection.
    pub fn recv_tcp(&mut self) -> Result<Vec<Vec<u8>>, io::Error> {
        match self.tcp {
            Some(ref mut conn) => conn.recv(),
            None => Ok(Vec::new()),
        }
    }
}


//------------ TcpConn -------------------------------------------------------

/// A non-blocking TCP connection with its buffers.
#[derive(Debug)]
struct TcpConn {
    stream: TcpStream,

    /// Whether the connection has been established.
    connected: bool,

    /// Data waiting to be written.
    wbuf: BytesMut,

    /// Data read but not yet consumed.
    rbuf: BytesMut,
}

impl TcpConn {
    fn connect(addr: SocketAddr) -> Result<Self, io::Error> {
        let sock = Socket::new(
            Domain::for_address(addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        sock.set_nonblocking(true)?;
        sock.set_nodelay(true)?;
        match sock.connect(&addr.into()) {
            Ok(()) => {}
            Err(err)
                if err.raw_os_error() == Some(libc::EINPROGRESS)
                    || err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }
        let stream: TcpStream = sock.into();
        debug!("connecting TCP {} to {}", stream.as_raw_fd(), addr);
        Ok(TcpConn {
            stream,
            connected: false,
            wbuf: BytesMut::new(),
            rbuf: BytesMut::new(),
        })
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        if !self.connected {
            if let Some(err) = self.stream.take_error()? {
                return Err(err);
            }
            // A peer address only exists once the handshake is done.
            match self.stream.peer_addr() {
                Ok(_) => self.connected = true,
                Err(err) if err.kind() == io::ErrorKind::NotConnected => {
                    return Ok(())
                }
                Err(err) => return Err(err),
            }
        }
        while !self.wbuf.is_empty() {
            match self.stream.write(&self.wbuf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ))
                }
                Ok(len) => {
                    trace!(
                        "wrote {} bytes to TCP {}",
                        len,
                        self.stream.as_raw_fd()
                    );
                    self.wbuf.advance(len)
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<Vec<u8>>, io::Error> {
        let mut closed = false;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(len) => self.rbuf.extend_from_slice(&chunk[..len]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }

        let mut res = Vec::new();
        while self.rbuf.len() >= 2 {
            let len = usize::from(u16::from_be_bytes([
                self.rbuf[0],
                self.rbuf[1],
            ]));
            if self.rbuf.len() < len + 2 {
                break;
            }
            self.rbuf.advance(2);
            res.push(self.rbuf.split_to(len).to_vec());
        }
        if closed && res.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ));
        }
        Ok(res)
    }
}


//============ Testing =======================================================
