//! Channel construction options.
//!
//! An [`Options`] value is a snapshot of the settings a caller wants to
//! override when creating a channel. Every field is optional: a field that
//! is present replaces exactly one setting of the system configuration, a
//! field that is absent leaves the system default in place. The snapshot is
//! consumed when the channel is created and not kept around afterwards.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use crate::conf::{check_domain, ResolvConf};
use crate::error::{AddressError, Error};
use crate::family::Family;
use crate::flags::InitFlags;


//------------ Lookups -------------------------------------------------------

/// Which source to consult first when looking up hosts.
///
/// The source that is not consulted first serves as fallback: with
/// [`Hosts`][Lookups::Hosts], DNS is only asked if the hosts table has no
/// entry; with [`Dns`][Lookups::Dns], the hosts table is only consulted if
/// DNS reports that the name doesn’t exist.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Lookups {
    /// Query DNS first.
    Dns,

    /// Consult the hosts table first.
    #[default]
    Hosts,
}

impl Lookups {
    /// Returns the textual form of the selector.
    pub fn as_str(self) -> &'static str {
        match self {
            Lookups::Dns => "dns",
            Lookups::Hosts => "hosts",
        }
    }
}

impl FromStr for Lookups {
    type Err = Error;

    /// Parses a lookup order selector.
    ///
    /// Only `dns` and `hosts` are accepted. Any other value is an error
    /// rather than a silent fallback to the default order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dns" => Ok(Lookups::Dns),
            "hosts" => Ok(Lookups::Hosts),
            _ => Err(Error::InvalidLookups(s.into())),
        }
    }
}

impl fmt::Display for Lookups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ Options -------------------------------------------------------

/// Options overriding the system configuration of a new channel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct Options {
    /// Flags changing the channel’s behaviour.
    pub flags: Option<InitFlags>,

    /// How long to wait for an answer from one server in one try.
    pub timeout: Option<Duration>,

    /// How many times to try each server.
    pub tries: Option<usize>,

    /// How many dots a name needs to be tried as is before the search list.
    pub ndots: Option<usize>,

    /// The port to send UDP queries to.
    pub udp_port: Option<u16>,

    /// The port to send TCP queries to.
    pub tcp_port: Option<u16>,

    /// The servers to query in order of preference.
    ///
    /// Each entry must be the textual form of an IPv4 address.
    pub servers: Option<Vec<String>>,

    /// The search list, in order.
    pub domains: Option<Vec<String>>,

    /// The lookup order, either `"dns"` or `"hosts"`.
    pub lookups: Option<String>,
}

impl Options {
    /// Creates options that override nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the options to a configuration.
    ///
    /// All fields are validated before anything is changed, so if this
    /// fails the configuration is left untouched.
    pub fn apply_to(self, conf: &mut ResolvConf) -> Result<(), Error> {
        if let Some(flags) = self.flags {
            if flags.has_unknown_bits() {
                return Err(Error::BadFlags);
            }
        }
        let servers = match self.servers {
            Some(ref servers) => Some(parse_servers(servers)?),
            None => None,
        };
        if let Some(ref domains) = self.domains {
            for domain in domains {
                if !check_domain(domain) {
                    return Err(Error::BadName);
                }
            }
        }
        let lookups = match self.lookups {
            Some(ref lookups) => Some(Lookups::from_str(lookups)?),
            None => None,
        };

        if let Some(flags) = self.flags {
            conf.flags = flags;
        }
        if let Some(timeout) = self.timeout {
            conf.timeout = timeout;
        }
        if let Some(tries) = self.tries {
            conf.attempts = tries;
        }
        if let Some(ndots) = self.ndots {
            conf.ndots = ndots;
        }
        if let Some(port) = self.udp_port {
            conf.udp_port = port;
        }
        if let Some(port) = self.tcp_port {
            conf.tcp_port = port;
        }
        if let Some(servers) = servers {
            conf.servers = servers;
        }
        if let Some(domains) = self.domains {
            conf.search = domains
                .into_iter()
                .map(|domain| domain.trim_end_matches('.').into())
                .collect();
        }
        if let Some(lookups) = lookups {
            conf.lookups = lookups;
        }
        debug!("applied channel options: {:?}", conf);
        Ok(())
    }
}

/// Parses the server list, stopping at the first invalid entry.
fn parse_servers(servers: &[String]) -> Result<Vec<IpAddr>, Error> {
    servers
        .iter()
        .map(|server| {
            server
                .parse::<Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|err| {
                    Error::from(AddressError::new(
                        server,
                        Some(Family::Inet),
                        err,
                    ))
                })
        })
        .collect()
}


//============ Testing =======================================================
