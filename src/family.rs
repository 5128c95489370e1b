//! Address families.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use crate::error::{AddressError, Error};


//------------ Family --------------------------------------------------------

/// The address family of a host lookup.
///
/// Only IPv4 and IPv6 are supported. Raw socket-layer family values can be
/// converted via `TryFrom<i32>` which rejects all other families with
/// [`Error::NotImplemented`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Family {
    /// IPv4, `AF_INET`.
    Inet,

    /// IPv6, `AF_INET6`.
    Inet6,
}

impl Family {
    /// Returns the family of an address.
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::Inet,
            IpAddr::V6(_) => Family::Inet6,
        }
    }

    /// Returns the raw socket-layer value of the family.
    pub fn to_raw(self) -> i32 {
        match self {
            Family::Inet => libc::AF_INET,
            Family::Inet6 => libc::AF_INET6,
        }
    }

    /// Parses the textual form of an address of this family.
    pub fn parse_addr(self, addr: &str) -> Result<IpAddr, AddressError> {
        match self {
            Family::Inet => addr
                .parse::<Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|err| AddressError::new(addr, Some(self), err)),
            Family::Inet6 => addr
                .parse::<Ipv6Addr>()
                .map(IpAddr::V6)
                .map_err(|err| AddressError::new(addr, Some(self), err)),
        }
    }

    /// Returns whether the address belongs to this family.
    pub fn matches(self, addr: &IpAddr) -> bool {
        Family::of(*addr) == self
    }
}

impl TryFrom<i32> for Family {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        if raw == libc::AF_INET {
            Ok(Family::Inet)
        } else if raw == libc::AF_INET6 {
            Ok(Family::Inet6)
        } else {
            Err(Error::NotImplemented)
        }
    }
}

impl From<Family> for i32 {
    fn from(family: Family) -> Self {
        family.to_raw()
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Family::Inet => f.write_str("IPv4"),
            Family::Inet6 => f.write_str("IPv6"),
        }
    }
}


//============ Testing =======================================================
