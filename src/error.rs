//! Errors and results.
//!
//! There are two layers of errors in this crate. Engines report the outcome
//! of a failed query through a [`Status`] code, modelled after the status
//! codes of classic C resolver libraries. What callers see is an
//! [`Error`]: either returned synchronously when the arguments of a call
//! are rejected, or handed to a completion handler when resolution fails.
//!
//! Every status converts into an error. Statuses without a dedicated error
//! kind end up as [`Error::Failure`] so that no outcome is ever lost.

use std::net::AddrParseError;
use std::sync::Arc;
use std::{error, fmt, io};
use crate::family::Family;


//------------ Status --------------------------------------------------------

/// The status of a query as reported by a resolver engine.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    /// The name exists but has no data of the requested type.
    NoData,

    /// The server could not interpret the query.
    FormErr,

    /// The server failed to process the query.
    ServFail,

    /// The name does not exist.
    NotFound,

    /// The operation or the server does not support the request.
    NotImp,

    /// The server refused the query.
    Refused,

    /// The query could not be composed.
    BadQuery,

    /// The query name is malformed.
    BadName,

    /// The address family is not supported.
    BadFamily,

    /// The response could not be parsed or did not match the query.
    BadResp,

    /// No server could be contacted.
    ConnRefused,

    /// All attempts timed out.
    Timeout,

    /// A server closed the connection prematurely.
    Eof,

    /// A configuration file could not be read.
    File,

    /// Allocation failed.
    NoMem,

    /// The channel was destroyed while the query was pending.
    Destruction,

    /// A string argument was invalid.
    BadStr,

    /// The flags given are invalid.
    BadFlags,

    /// A numeric host was given where a name was required.
    NoName,

    /// The query was cancelled.
    Cancelled,
}

impl Status {
    /// Returns a short description of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NoData => "DNS server returned answer with no data",
            Status::FormErr => "DNS server claims query was misformatted",
            Status::ServFail => "DNS server returned general failure",
            Status::NotFound => "domain name not found",
            Status::NotImp => "DNS server does not implement requested \
                               operation",
            Status::Refused => "DNS server refused query",
            Status::BadQuery => "misformatted DNS query",
            Status::BadName => "misformatted domain name",
            Status::BadFamily => "unsupported address family",
            Status::BadResp => "misformatted DNS reply",
            Status::ConnRefused => "could not contact DNS servers",
            Status::Timeout => "timeout while contacting DNS servers",
            Status::Eof => "end of file",
            Status::File => "error reading file",
            Status::NoMem => "out of memory",
            Status::Destruction => "channel is being destroyed",
            Status::BadStr => "misformatted string",
            Status::BadFlags => "illegal flags specified",
            Status::NoName => "given hostname is not numeric",
            Status::Cancelled => "DNS query cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ Error ---------------------------------------------------------

/// An error happened while setting up or resolving a query.
#[derive(Clone, Debug)]
pub enum Error {
    /// The address family or flag combination is not supported.
    NotImplemented,

    /// The query name is malformed.
    BadName,

    /// Resolution completed without a result.
    AddressNotFound,

    /// The resolver ran out of memory.
    NoMemory,

    /// The channel has been destroyed.
    Destruction,

    /// An invalid combination of flags was given.
    BadFlags,

    /// An address argument could not be parsed.
    InvalidAddress(AddressError),

    /// The lookup order selector is neither `dns` nor `hosts`.
    InvalidLookups(String),

    /// Waiting for socket readiness failed.
    Io(Arc<io::Error>),

    /// Resolution failed for a reason without a dedicated error kind.
    Failure(Status),
}

impl Error {
    /// Returns the engine status behind a resolution error if there is one.
    pub fn status(&self) -> Option<Status> {
        match *self {
            Error::NotImplemented => Some(Status::NotImp),
            Error::BadName => Some(Status::BadName),
            Error::AddressNotFound => Some(Status::NotFound),
            Error::NoMemory => Some(Status::NoMem),
            Error::Destruction => Some(Status::Destruction),
            Error::BadFlags => Some(Status::BadFlags),
            Error::Failure(status) => Some(status),
            _ => None,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        match status {
            Status::NotImp | Status::BadFamily => Error::NotImplemented,
            Status::BadName => Error::BadName,
            Status::NotFound | Status::NoData => Error::AddressNotFound,
            Status::NoMem => Error::NoMemory,
            Status::Destruction => Error::Destruction,
            Status::BadFlags => Error::BadFlags,
            status => Error::Failure(status),
        }
    }
}

impl From<AddressError> for Error {
    fn from(err: AddressError) -> Self {
        Error::InvalidAddress(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotImplemented => f.write_str("not implemented"),
            Error::BadName => f.write_str(Status::BadName.as_str()),
            Error::AddressNotFound => f.write_str("address not found"),
            Error::NoMemory => f.write_str(Status::NoMem.as_str()),
            Error::Destruction => f.write_str(Status::Destruction.as_str()),
            Error::BadFlags => f.write_str(Status::BadFlags.as_str()),
            Error::InvalidAddress(err) => fmt::Display::fmt(err, f),
            Error::InvalidLookups(value) => {
                write!(f, "invalid lookup order '{}'", value)
            }
            Error::Io(err) => write!(f, "error waiting for sockets: {}", err),
            Error::Failure(status) => fmt::Display::fmt(status, f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::InvalidAddress(err) => Some(err),
            Error::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}


//------------ AddressError --------------------------------------------------

/// A textual address could not be parsed.
///
/// This is a usage error reported before any resolution is attempted and
/// thus kept apart from resolution failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressError {
    /// The offending input.
    input: String,

    /// The family the input was expected to be in, if one was required.
    family: Option<Family>,

    /// The underlying parse error.
    err: AddrParseError,
}

impl AddressError {
    pub(crate) fn new(
        input: &str,
        family: Option<Family>,
        err: AddrParseError,
    ) -> Self {
        AddressError {
            input: input.into(),
            family,
            err,
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns the family the input was parsed for.
    pub fn family(&self) -> Option<Family> {
        self.family
    }
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            Some(family) => write!(
                f,
                "invalid {} address '{}': {}",
                family, self.input, self.err
            ),
            None => write!(f, "invalid address '{}': {}", self.input, self.err),
        }
    }
}

impl error::Error for AddressError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}


//------------ Result --------------------------------------------------------

pub type Result<T> = std::result::Result<T, Error>;


//============ Testing =======================================================
