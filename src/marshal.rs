//! Turning engine answers into results for completion handlers.
//!
//! Every query carries exactly one completion handler. When the engine is
//! done with the query, the handler is consumed and called with either a
//! result value or an [`Error`]. Since handlers are `FnOnce` and are taken
//! out of the channel before they are called, no handler can ever run
//! twice.

use std::fmt;
use std::net::IpAddr;
use crate::channel::Channel;
use crate::engine::{Answer, HostEntry};
use crate::error::{Error, Status};
use crate::family::Family;


//------------ Module Configuration ------------------------------------------

/// The maximum length of the textual form of an address.
///
/// This is the size of the buffer the classic C API uses, including the
/// terminating null byte which we don’t need.
pub const ADDRSTRLEN: usize = 46;


//------------ HostResult ----------------------------------------------------

/// The result of a host lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostResult {
    /// The canonical name of the host.
    pub canonical_name: String,

    /// Other names of the host in the order the engine reported them.
    pub aliases: Vec<String>,

    /// The family of the addresses.
    pub family: Family,

    /// The addresses in textual form.
    pub addresses: Vec<String>,
}

impl HostResult {
    /// Creates a result from a host entry provided by an engine.
    pub fn from_entry(entry: HostEntry) -> Self {
        HostResult {
            canonical_name: entry.name,
            aliases: entry.aliases,
            family: entry.family,
            addresses: entry.addrs.iter().map(addr_to_string).collect(),
        }
    }
}

impl From<HostEntry> for HostResult {
    fn from(entry: HostEntry) -> Self {
        Self::from_entry(entry)
    }
}

/// Returns the textual form of an address.
fn addr_to_string(addr: &IpAddr) -> String {
    let mut res = addr.to_string();
    // Can’t happen for well-formed addresses but we’ve promised.
    res.truncate(ADDRSTRLEN - 1);
    res
}


//------------ NameInfoResult ------------------------------------------------

/// The result of a name info lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameInfoResult {
    /// The host name if it was asked for.
    pub name: Option<String>,

    /// The service name if it was asked for.
    pub service: Option<String>,
}


//------------ Handler Types -------------------------------------------------

/// The completion handler of a host lookup.
pub type HostHandler =
    Box<dyn FnOnce(&mut Channel, Result<HostResult, Error>)>;

/// The completion handler of a name info lookup.
pub type NameInfoHandler =
    Box<dyn FnOnce(&mut Channel, Result<NameInfoResult, Error>)>;


//------------ Handler -------------------------------------------------------

/// The completion handler of a pending query.
pub(crate) enum Handler {
    Host(HostHandler),
    NameInfo(NameInfoHandler),
}

impl Handler {
    /// Calls the handler with the outcome reported by the engine.
    pub(crate) fn complete(
        self,
        channel: &mut Channel,
        result: Result<Answer, Status>,
    ) {
        match self {
            Handler::Host(handler) => handler(channel, host_result(result)),
            Handler::NameInfo(handler) => {
                handler(channel, name_info_result(result))
            }
        }
    }

    /// Calls the handler with an error.
    pub(crate) fn fail(self, channel: &mut Channel, err: Error) {
        match self {
            Handler::Host(handler) => handler(channel, Err(err)),
            Handler::NameInfo(handler) => handler(channel, Err(err)),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Host(_) => f.write_str("Handler::Host"),
            Handler::NameInfo(_) => f.write_str("Handler::NameInfo"),
        }
    }
}


//------------ Conversions ---------------------------------------------------

/// Converts an engine outcome into the result of a host lookup.
///
/// An answer of the wrong kind is reported as a bad response.
pub fn host_result(
    result: Result<Answer, Status>,
) -> Result<HostResult, Error> {
    match result {
        Ok(Answer::Host(entry)) => Ok(entry.into()),
        Ok(Answer::NameInfo { .. }) => Err(Error::Failure(Status::BadResp)),
        Err(status) => Err(status.into()),
    }
}

/// Converts an engine outcome into the result of a name info lookup.
pub fn name_info_result(
    result: Result<Answer, Status>,
) -> Result<NameInfoResult, Error> {
    match result {
        Ok(Answer::NameInfo { node, service }) => Ok(NameInfoResult {
            name: node,
            service,
        }),
        Ok(Answer::Host(_)) => Err(Error::Failure(Status::BadResp)),
        Err(status) => Err(status.into()),
    }
}


//============ Testing =======================================================
