//! Starting queries.
//!
//! The methods here check their arguments, turn them into a [`Request`]
//! for the engine, and register the completion handler with the channel.
//! Invalid arguments are reported right away through the returned result.
//! In that case, nothing is scheduled and the handler is dropped without
//! being called. Otherwise the handler is called exactly once, either with
//! the result or with the error the lookup ended with.

use std::ffi::CString;
use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6,
};
use crate::channel::Channel;
use crate::engine::Request;
use crate::error::{Error, Result};
use crate::family::Family;
use crate::flags::NameInfoFlags;
use crate::marshal::{Handler, HostResult, NameInfoResult};


//------------ NameInfoRequest -----------------------------------------------

/// The arguments of a name info lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameInfoRequest {
    /// The address to look up the host name for.
    ///
    /// This can be an IPv4 or IPv6 address. An IPv6 address may carry a
    /// scope after a `%` sign, either numeric or an interface name.
    pub address: Option<String>,

    /// The port to look up the service name for.
    pub port: Option<u16>,

    /// Flags modifying the lookup.
    pub flags: NameInfoFlags,
}

impl NameInfoRequest {
    /// Creates a request for the host name of an address.
    pub fn host(address: impl Into<String>) -> Self {
        NameInfoRequest {
            address: Some(address.into()),
            ..Default::default()
        }
    }

    /// Creates a request for the service name of a port.
    pub fn service(port: u16) -> Self {
        NameInfoRequest {
            port: Some(port),
            ..Default::default()
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Adds to the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: NameInfoFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Converts the request into a socket address and the final flags.
    fn into_parts(self) -> Result<(SocketAddr, NameInfoFlags)> {
        if self.address.is_none() && self.port.is_none() {
            return Err(Error::NotImplemented);
        }
        let mut flags = self.flags.check()?;
        let mut addr = match self.address {
            Some(ref address) => {
                flags.insert(NameInfoFlags::LOOKUPHOST);
                parse_socket_addr(address).ok_or(Error::NotImplemented)?
            }
            None => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into(),
        };
        if let Some(port) = self.port {
            flags.insert(NameInfoFlags::LOOKUPSERVICE);
            addr.set_port(port);
        }
        Ok((addr, flags))
    }
}

/// Parses an address as IPv4 first and IPv6 second.
fn parse_socket_addr(addr: &str) -> Option<SocketAddr> {
    if let Ok(v4) = addr.parse::<Ipv4Addr>() {
        return Some(SocketAddrV4::new(v4, 0).into());
    }
    let (addr, scope) = match addr.split_once('%') {
        Some((addr, scope)) => (addr, Some(scope)),
        None => (addr, None),
    };
    let v6 = addr.parse::<Ipv6Addr>().ok()?;
    let scope_id = match scope {
        Some(scope) => parse_scope(scope)?,
        None => 0,
    };
    Some(SocketAddrV6::new(v6, 0, 0, scope_id).into())
}

/// Parses a scope given as a number or an interface name.
fn parse_scope(scope: &str) -> Option<u32> {
    if let Ok(id) = scope.parse() {
        return Some(id);
    }
    let name = CString::new(scope).ok()?;
    // SAFETY: `name` is a valid null-terminated string.
    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => None,
        id => Some(id),
    }
}


//------------ Channel -------------------------------------------------------

/// # Lookups
///
impl Channel {
    /// Looks up the addresses of a host.
    ///
    /// Only addresses of the given family are returned. If the name is a
    /// literal address of that family, the handler is called before this
    /// method returns.
    pub fn resolve_host_by_name<F>(
        &mut self,
        name: &str,
        family: Family,
        handler: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Channel, Result<HostResult>) + 'static,
    {
        self.submit(
            Request::HostByName {
                name: name.into(),
                family,
            },
            Handler::Host(Box::new(handler)),
        )
    }

    /// Looks up the host names of an address.
    ///
    /// The address is given in its textual form and must be of the given
    /// family. If it isn’t, [`Error::InvalidAddress`] is returned and the
    /// handler is never called.
    pub fn resolve_host_by_addr<F>(
        &mut self,
        addr: &str,
        family: Family,
        handler: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Channel, Result<HostResult>) + 'static,
    {
        if self.is_destroyed() {
            return Err(Error::Destruction);
        }
        let addr: IpAddr = family.parse_addr(addr)?;
        self.submit(
            Request::HostByAddr { addr },
            Handler::Host(Box::new(handler)),
        )
    }

    /// Looks up the host and service names of a socket address.
    ///
    /// The host name is looked up if the request contains an address, the
    /// service name if it contains a port. A request with neither is
    /// rejected with [`Error::NotImplemented`] as is an address that is
    /// neither IPv4 nor IPv6. Contradicting flags are rejected with
    /// [`Error::BadFlags`].
    pub fn resolve_name_info<F>(
        &mut self,
        request: NameInfoRequest,
        handler: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Channel, Result<NameInfoResult>) + 'static,
    {
        if self.is_destroyed() {
            return Err(Error::Destruction);
        }
        let (addr, flags) = request.into_parts()?;
        self.submit(
            Request::NameInfo { addr, flags },
            Handler::NameInfo(Box::new(handler)),
        )
    }
}


//============ Testing =======================================================
