//! Static host table and host aliases.
//!
//! The [`Hosts`] type represents the system’s `/etc/hosts` file. It is
//! consulted for forward and reverse lookups before or after DNS,
//! depending on the configured lookup order.
//!
//! The [`HostAliases`] type represents the file named by the `HOSTALIASES`
//! environment variable which maps single-label names to full names.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::{env, error, fmt, fs, io};
use crate::engine::HostEntry;
use crate::family::Family;


//------------ Module Configuration ------------------------------------------

/// The path of the system’s host table.
const HOSTS: &str = "/etc/hosts";


//------------ Hosts ---------------------------------------------------------

/// A static host table.
#[derive(Clone, Debug, Default)]
pub struct Hosts {
    /// The lines of the table in file order.
    entries: Vec<Entry>,

    /// Indexes into `entries` by lowercase name.
    by_name: HashMap<String, Vec<usize>>,

    /// The first entry for each address.
    by_addr: HashMap<IpAddr, usize>,
}

/// One line of the host table.
#[derive(Clone, Debug)]
struct Entry {
    addr: IpAddr,
    canonical: String,
    aliases: Vec<String>,
}


/// # Creation and Manipulation
///
impl Hosts {
    /// Creates a new, empty host table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the host table for this system.
    ///
    /// If the file cannot be read, the table is empty.
    pub fn system() -> Self {
        let mut res = Hosts::new();
        let _ = res.parse_file(HOSTS);
        res
    }

    /// Adds an address with its canonical name and aliases.
    pub fn add(
        &mut self,
        addr: IpAddr,
        canonical: &str,
        aliases: &[&str],
    ) {
        let idx = self.entries.len();
        let entry = Entry {
            addr,
            canonical: canonical.trim_end_matches('.').into(),
            aliases: aliases
                .iter()
                .map(|alias| alias.trim_end_matches('.').into())
                .collect(),
        };
        for name in
            std::iter::once(&entry.canonical).chain(entry.aliases.iter())
        {
            let list = self.by_name.entry(name.to_ascii_lowercase()).or_default();
            if !list.contains(&idx) {
                list.push(idx)
            }
        }
        self.by_addr.entry(addr).or_insert(idx);
        self.entries.push(entry);
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}


/// # Lookups
///
impl Hosts {
    /// Looks up the addresses of a host.
    ///
    /// The canonical name and aliases are those of the first line listing
    /// the name with an address of the requested family. The addresses are
    /// collected from all such lines in file order.
    pub fn lookup_host(&self, name: &str, family: Family) -> Option<HostEntry> {
        let key = name.trim_end_matches('.').to_ascii_lowercase();
        let mut res: Option<HostEntry> = None;
        for &idx in self.by_name.get(&key)? {
            let entry = &self.entries[idx];
            if !family.matches(&entry.addr) {
                continue;
            }
            match res {
                Some(ref mut res) => {
                    if !res.addrs.contains(&entry.addr) {
                        res.addrs.push(entry.addr)
                    }
                }
                None => {
                    res = Some(HostEntry {
                        name: entry.canonical.clone(),
                        aliases: entry.aliases.clone(),
                        family,
                        addrs: vec![entry.addr],
                    })
                }
            }
        }
        res
    }

    /// Looks up the host name of an address.
    pub fn lookup_addr(&self, addr: IpAddr) -> Option<HostEntry> {
        let entry = &self.entries[*self.by_addr.get(&addr)?];
        Some(HostEntry {
            name: entry.canonical.clone(),
            aliases: entry.aliases.clone(),
            family: Family::of(addr),
            addrs: vec![addr],
        })
    }
}


/// # Parsing Hosts File
///
impl Hosts {
    /// Adds the hosts listed in a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Reads hosts from a reader and adds them.
    ///
    /// The format is that of the /etc/hosts file. Broken lines are
    /// skipped.
    pub fn parse<R: io::Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let _ = self.parse_line(&line?);
        }
        Ok(())
    }

    /// Parses a single line.
    fn parse_line(&mut self, line: &str) -> Result<(), Error> {
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let mut words = line.split_whitespace();

        let addr = words.next().ok_or(Error::ParseError)?;
        // Zone indices are dropped: "fe80::1%lo0" is listed as "fe80::1".
        let addr = addr.split('%').next().unwrap_or(addr);
        let addr = IpAddr::from_str(addr).map_err(|_| Error::ParseError)?;

        let canonical = words.next().ok_or(Error::ParseError)?;
        let aliases: Vec<&str> = words.collect();
        self.add(addr, canonical, &aliases);
        Ok(())
    }
}


//------------ HostAliases ---------------------------------------------------

/// Aliases for single-label host names.
///
/// Each line of the file contains an alias followed by the name it stands
/// for.
#[derive(Clone, Debug, Default)]
pub struct HostAliases {
    aliases: HashMap<String, String>,
}

impl HostAliases {
    /// Creates an empty alias table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the alias file named by the `HOSTALIASES` environment variable.
    ///
    /// Returns `None` if the variable isn’t set or the file can’t be read.
    pub fn from_env() -> Option<Self> {
        let path = env::var_os("HOSTALIASES")?;
        let mut res = HostAliases::new();
        let mut file = fs::File::open(path).ok()?;
        res.parse(&mut file).ok()?;
        Some(res)
    }

    /// Adds an alias.
    pub fn add(&mut self, alias: &str, name: &str) {
        self.aliases
            .entry(alias.to_ascii_lowercase())
            .or_insert_with(|| name.into());
    }

    /// Reads aliases from a reader.
    pub fn parse<R: io::Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let mut words = line.split_whitespace();
            if let (Some(alias), Some(name)) = (words.next(), words.next()) {
                self.add(alias, name)
            }
        }
        Ok(())
    }

    /// Returns the name an alias stands for.
    ///
    /// Only names consisting of a single label are looked up.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if name.contains('.') {
            return None;
        }
        self.aliases
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}


//------------ Error ---------------------------------------------------------

/// Reading a table file failed.
#[derive(Debug)]
pub enum Error {
    /// A line was malformed.
    ParseError,

    /// Something happend while reading.
    Io(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ParseError => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ParseError => f.write_str("error parsing table"),
            Error::Io(err) => fmt::Display::fmt(err, f),
        }
    }
}


//============ Testing =======================================================
