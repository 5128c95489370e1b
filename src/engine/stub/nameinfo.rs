//! Assembling name info answers.

use std::net::SocketAddr;
use crate::engine::Answer;
use crate::error::Status;
use crate::flags::NameInfoFlags;
use crate::services::Services;


/// Returns the service name for the port of a socket address.
///
/// Returns `None` unless the flags ask for a service or if the port is
/// zero. Falls back to the decimal port number if the services table has no
/// entry or if a numeric service was asked for.
pub fn service(
    services: &Services,
    addr: &SocketAddr,
    flags: NameInfoFlags,
) -> Option<String> {
    if !flags.contains(NameInfoFlags::LOOKUPSERVICE) || addr.port() == 0 {
        return None;
    }
    if !flags.contains(NameInfoFlags::NUMERICSERV) {
        let found = services.lookup(addr.port(), flags.service_protocol());
        if let Some(name) = found {
            return Some(name.into());
        }
    }
    Some(addr.port().to_string())
}

/// Returns the numeric form of the host part of a socket address.
///
/// IPv6 addresses with a scope get the numeric scope ID appended.
pub fn numeric_host(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(addr) => addr.ip().to_string(),
        SocketAddr::V6(addr) if addr.scope_id() != 0 => {
            format!("{}%{}", addr.ip(), addr.scope_id())
        }
        SocketAddr::V6(addr) => addr.ip().to_string(),
    }
}

/// Strips the local domain from a host name if asked to.
pub fn strip_domain(
    name: String,
    flags: NameInfoFlags,
    local: Option<&str>,
) -> String {
    if !flags.contains(NameInfoFlags::NOFQDN) {
        return name;
    }
    let local = match local {
        Some(local) if !local.is_empty() => local,
        _ => return name,
    };
    let split = name.len().checked_sub(local.len() + 1);
    match split {
        Some(split)
            if split > 0
                && name.as_bytes()[split] == b'.'
                && name
                    .get(split + 1..)
                    .map_or(false, |tail| tail.eq_ignore_ascii_case(local)) =>
        {
            name[..split].into()
        }
        _ => name,
    }
}

/// Creates the answer to a name info request from the host lookup result.
///
/// If there is no name for the address, the numeric host is used unless a
/// name is required. Any other failure is passed on.
pub fn answer(
    lookup: Result<String, Status>,
    addr: &SocketAddr,
    flags: NameInfoFlags,
    services: &Services,
    local: Option<&str>,
) -> Result<Answer, Status> {
    let node = match lookup {
        Ok(name) => strip_domain(name, flags, local),
        Err(Status::NotFound) | Err(Status::NoData)
            if !flags.contains(NameInfoFlags::NAMEREQD) =>
        {
            numeric_host(addr)
        }
        Err(status) => return Err(status),
    };
    Ok(Answer::NameInfo {
        node: Some(node),
        service: service(services, addr, flags),
    })
}


//============ Testing =======================================================
