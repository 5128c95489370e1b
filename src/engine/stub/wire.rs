//! Composing queries and reading replies.
//!
//! All actual wire format work is done by the `domain` crate. This module
//! only translates between its types and the engine’s.

use std::net::IpAddr;
use std::str::FromStr;
use domain::base::iana::{Rcode, Rtype};
use domain::base::{Message, MessageBuilder, Name, ParsedName};
use domain::rdata::{Aaaa, Cname, Ptr, A};
use crate::engine::HostEntry;
use crate::error::Status;
use crate::family::Family;


//------------ Module Configuration ------------------------------------------

/// The longest CNAME chain we follow.
const MAX_CHAIN: usize = 16;


//------------ compose -------------------------------------------------------

/// Creates the wire format of a query.
pub fn compose(
    txid: u16,
    qname: &str,
    rtype: Rtype,
    recurse: bool,
) -> Result<Vec<u8>, Status> {
    let name = Name::<Vec<u8>>::from_str(&absolute(qname))
        .map_err(|_| Status::BadName)?;
    let mut msg = MessageBuilder::new_vec();
    msg.header_mut().set_id(txid);
    msg.header_mut().set_rd(recurse);
    let mut msg = msg.question();
    msg.push((&name, rtype)).map_err(|_| Status::BadQuery)?;
    Ok(msg.finish())
}

/// Returns the query type for looking up addresses of a family.
pub fn addr_rtype(family: Family) -> Rtype {
    match family {
        Family::Inet => Rtype::A,
        Family::Inet6 => Rtype::AAAA,
    }
}

/// Translates an IP address into its reverse lookup name.
pub fn reverse_name(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            format!(
                "{}.{}.{}.{}.in-addr.arpa",
                octets[3], octets[2], octets[1], octets[0]
            )
        }
        IpAddr::V6(addr) => {
            let mut res = String::with_capacity(72);
            for &item in addr.octets().iter().rev() {
                res.push(hexdigit(item & 0x0F));
                res.push('.');
                res.push(hexdigit(item >> 4));
                res.push('.');
            }
            res.push_str("ip6.arpa");
            res
        }
    }
}

fn hexdigit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16).unwrap_or('0')
}

fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.into()
    } else {
        format!("{}.", name)
    }
}

/// Brings a name into the form used for comparing.
fn normalize(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_ascii_lowercase()
}


//------------ Reply ---------------------------------------------------------

/// A reply received from a server.
pub struct Reply {
    msg: Message<Vec<u8>>,
}

impl Reply {
    /// Parses the reply. Returns `None` if it is too short to be a message.
    pub fn from_octets(octets: Vec<u8>) -> Option<Self> {
        Message::from_octets(octets).ok().map(|msg| Reply { msg })
    }

    pub fn id(&self) -> u16 {
        self.msg.header().id()
    }

    pub fn is_truncated(&self) -> bool {
        self.msg.header().tc()
    }

    pub fn rcode(&self) -> Rcode {
        self.msg.header().rcode()
    }

    /// Returns whether this is the reply to a question.
    pub fn is_answer_to(&self, qname: &str, rtype: Rtype) -> bool {
        if !self.msg.header().qr() {
            return false;
        }
        match self.msg.first_question() {
            Some(question) => {
                question.qtype() == rtype
                    && normalize(&question.qname().to_string())
                        == normalize(qname)
            }
            None => false,
        }
    }

    /// Extracts the addresses of a host from a reply.
    ///
    /// CNAME records are followed starting at `qname`. The names passed on
    /// the way become the aliases, the last one the canonical name.
    /// Returns [`Status::NoData`] if there are no addresses.
    pub fn host(
        &self,
        qname: &str,
        family: Family,
    ) -> Result<HostEntry, Status> {
        let records = self.records()?;
        let (name, aliases) = records.follow(qname);
        let addrs: Vec<IpAddr> = records
            .addrs
            .iter()
            .filter(|(owner, addr)| *owner == name && family.matches(addr))
            .map(|(_, addr)| *addr)
            .collect();
        if addrs.is_empty() {
            return Err(Status::NoData);
        }
        Ok(HostEntry {
            name,
            aliases,
            family,
            addrs,
        })
    }

    /// Extracts the host name of an address from a reverse lookup reply.
    ///
    /// The first PTR record provides the name, further ones the aliases.
    pub fn ptr(&self, qname: &str, addr: IpAddr) -> Result<HostEntry, Status> {
        let records = self.records()?;
        let (owner, _) = records.follow(qname);
        let mut names = records
            .ptrs
            .into_iter()
            .filter(|(ptr_owner, _)| *ptr_owner == owner)
            .map(|(_, name)| name);
        let name = names.next().ok_or(Status::NoData)?;
        Ok(HostEntry {
            name,
            aliases: names.collect(),
            family: Family::of(addr),
            addrs: vec![addr],
        })
    }

    /// Collects the interesting records of the answer section.
    fn records(&self) -> Result<Records, Status> {
        let mut res = Records::default();
        let section = self.msg.answer().map_err(|_| Status::BadResp)?;
        for record in section {
            let record = record.map_err(|_| Status::BadResp)?;
            let owner = normalize(&record.owner().to_string());
            let rtype = record.rtype();
            if rtype == Rtype::CNAME {
                if let Ok(Some(record)) =
                    record.to_record::<Cname<ParsedName<&[u8]>>>()
                {
                    let target = record.data().cname().to_string();
                    res.cnames.push((owner, normalize(&target)));
                }
            } else if rtype == Rtype::A {
                if let Ok(Some(record)) = record.to_record::<A>() {
                    res.addrs.push((owner, record.data().addr().into()));
                }
            } else if rtype == Rtype::AAAA {
                if let Ok(Some(record)) = record.to_record::<Aaaa>() {
                    res.addrs.push((owner, record.data().addr().into()));
                }
            } else if rtype == Rtype::PTR {
                if let Ok(Some(record)) =
                    record.to_record::<Ptr<ParsedName<&[u8]>>>()
                {
                    let target = record.data().ptrdname().to_string();
                    res.ptrs.push((owner, normalize(&target)));
                }
            }
        }
        Ok(res)
    }
}


//------------ Records -------------------------------------------------------

/// The records of an answer section we care about, keyed by owner.
#[derive(Default)]
struct Records {
    cnames: Vec<(String, String)>,
    addrs: Vec<(String, IpAddr)>,
    ptrs: Vec<(String, String)>,
}

impl Records {
    /// Follows the CNAME chain starting at `qname`.
    ///
    /// Returns the final name and the names that were aliases.
    fn follow(&self, qname: &str) -> (String, Vec<String>) {
        let mut name = normalize(qname);
        let mut aliases = Vec::new();
        for _ in 0..MAX_CHAIN {
            let target = self
                .cnames
                .iter()
                .find(|(owner, _)| *owner == name)
                .map(|(_, target)| target.clone());
            match target {
                Some(target) if !aliases.contains(&target) => {
                    aliases.push(std::mem::replace(&mut name, target));
                }
                _ => break,
            }
        }
        (name, aliases)
    }
}


//============ Testing =======================================================
