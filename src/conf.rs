//! Resolver configuration.
//!
//! The configuration of a channel starts out as the system’s resolver
//! configuration, normally read from `/etc/resolv.conf`, which is then
//! amended by the [`Options`] a caller passes when creating the channel.
//!
//! The file format and the defaults are modeled along the lines of glibc’s
//! resolver. In addition, the environment variables `LOCALDOMAIN` and
//! `RES_OPTIONS` are honoured the way the C library does.
//!
//! [`Options`]: crate::options::Options

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};
use std::time::Duration;
use std::{env, error, fmt, fs, io};
use domain::base::Name;
use tracing::{debug, warn};
use crate::flags::InitFlags;
use crate::options::Lookups;


//------------ Module Configuration ------------------------------------------

/// The path of the system’s resolver configuration.
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// The default DNS port.
pub const DEFAULT_PORT: u16 = 53;

/// The default per-server timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of attempts.
const DEFAULT_ATTEMPTS: usize = 2;

/// The default number of dots for a name to be tried as is first.
const DEFAULT_NDOTS: usize = 1;


//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// This type collects all information necessary to configure how the stub
/// engine talks to its upstream resolvers.
///
/// After creating a value with [`new()`][Self::new] or parsing a file you
/// can manipulate the members. Once you are happy with them, you call
/// [`finalize()`][Self::finalize] to make sure the configuration is usable.
/// It mostly just fixes the `servers`.
///
/// The easiest way to get the system configuration is through
/// [`system()`][Self::system]. This will parse the configuration file, or
/// use the defaults if that fails, and apply the environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvConf {
    /// Addresses of servers to query, in order of preference.
    pub servers: Vec<IpAddr>,

    /// Port to send UDP queries to.
    pub udp_port: u16,

    /// Port to send TCP queries to.
    pub tcp_port: u16,

    /// Search list for host-name lookup.
    ///
    /// Entries are kept without the trailing dot.
    pub search: Vec<String>,

    /// Number of dots before an initial absolute query is made.
    pub ndots: usize,

    /// Timeout to wait for a response from a server.
    pub timeout: Duration,

    /// Number of times each server is tried before giving up.
    pub attempts: usize,

    /// Behaviour flags.
    pub flags: InitFlags,

    /// Which source to consult first for host lookups.
    pub lookups: Lookups,
}


/// # Management
///
impl ResolvConf {
    /// Creates a new, empty configuration.
    ///
    /// Using an empty configuration will fail since it does not contain
    /// any name servers. Call `self.finalize()` to make it usable.
    pub fn new() -> Self {
        ResolvConf {
            servers: Vec::new(),
            udp_port: DEFAULT_PORT,
            tcp_port: DEFAULT_PORT,
            search: Vec::new(),
            ndots: DEFAULT_NDOTS,
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            flags: InitFlags::empty(),
            lookups: Lookups::default(),
        }
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, it adds `127.0.0.1`. This is exactly what
    /// glibc does. A zero attempt count is raised to one so that every
    /// query is sent at least once.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            // glibc just simply uses 127.0.0.1:53. Let's do that, too,
            // and claim it is for compatibility.
            self.servers.push(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        if self.attempts == 0 {
            self.attempts = 1;
        }
    }

    /// Creates the default configuration for this system.
    ///
    /// Reads `/etc/resolv.conf`, then applies the `LOCALDOMAIN` and
    /// `RES_OPTIONS` environment variables. A missing or broken file
    /// leaves the defaults in place.
    pub fn system() -> Self {
        let mut res = ResolvConf::new();
        if let Err(err) = res.parse_file(RESOLV_CONF) {
            debug!("cannot use {}: {}", RESOLV_CONF, err);
        }
        res.apply_env();
        res.finalize();
        res
    }

    /// Applies the resolver environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(domains) = env::var("LOCALDOMAIN") {
            self.apply_localdomain(&domains);
        }
        if let Ok(options) = env::var("RES_OPTIONS") {
            self.parse_options(options.split_whitespace());
        }
    }

    /// Replaces the search list with the words of a `LOCALDOMAIN` value.
    fn apply_localdomain(&mut self, value: &str) {
        let search: Vec<_> = value
            .split_whitespace()
            .filter(|word| {
                let ok = check_domain(word);
                if !ok {
                    warn!("ignoring invalid LOCALDOMAIN entry '{}'", word);
                }
                ok
            })
            .map(|word| word.trim_end_matches('.').to_string())
            .collect();
        if !search.is_empty() {
            self.search = search;
        }
    }
}

impl Default for ResolvConf {
    fn default() -> Self {
        Self::new()
    }
}


/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file. Unknown keywords
    /// are ignored like the C library does.
    pub fn parse<R: io::Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                Some("domain") => self.parse_domain(words)?,
                Some("search") => self.parse_search(words)?,
                Some("options") => self.parse_options(words),
                Some("lookup") => self.parse_lookup(words),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_nameserver(&mut self, mut words: SplitWhitespace) -> Result<(), Error> {
        let word = next_word(&mut words)?;
        // Zone indices of link-local addresses aren’t supported.
        let addr = IpAddr::from_str(word).map_err(|_| Error::ParseError)?;
        self.servers.push(addr);
        no_more_words(words)
    }

    fn parse_domain(&mut self, mut words: SplitWhitespace) -> Result<(), Error> {
        let domain = next_word(&mut words)?;
        if !check_domain(domain) {
            return Err(Error::ParseError);
        }
        self.search = vec![domain.trim_end_matches('.').into()];
        no_more_words(words)
    }

    fn parse_search(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        let mut search = Vec::new();
        for word in words {
            if !check_domain(word) {
                return Err(Error::ParseError);
            }
            search.push(word.trim_end_matches('.').into())
        }
        self.search = search;
        Ok(())
    }

    /// Parses the `lookup` keyword of BSD style configurations.
    ///
    /// Whichever of `bind` and `file` comes first determines the order.
    fn parse_lookup(&mut self, words: SplitWhitespace) {
        for word in words {
            match word {
                "bind" => {
                    self.lookups = Lookups::Dns;
                    return;
                }
                "file" => {
                    self.lookups = Lookups::Hosts;
                    return;
                }
                _ => {}
            }
        }
    }

    fn parse_options(&mut self, words: SplitWhitespace) {
        for word in words {
            match split_arg(word) {
                Ok(("ndots", Some(n))) => self.ndots = n,
                Ok(("timeout", Some(n))) => {
                    self.timeout = Duration::from_secs(n as u64)
                }
                Ok(("attempts", Some(n))) => self.attempts = n,
                Ok(("use-vc", None)) => self.flags.insert(InitFlags::USEVC),
                Ok(("primary", None)) => self.flags.insert(InitFlags::PRIMARY),
                Ok(("ign-tc", None)) => self.flags.insert(InitFlags::IGNTC),
                Ok(("no-recurse", None)) => {
                    self.flags.insert(InitFlags::NORECURSE)
                }
                Ok(("stay-open", None)) => {
                    self.flags.insert(InitFlags::STAYOPEN)
                }
                Ok(("no-dn-search", None)) => {
                    self.flags.insert(InitFlags::NOSEARCH)
                }
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
    }
}


//--- Display

impl fmt::Display for ResolvConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for server in self.servers.iter() {
            writeln!(f, "nameserver {}", server)?;
        }
        if self.search.len() == 1 {
            writeln!(f, "domain {}", self.search[0])?;
        } else if self.search.len() > 1 {
            f.write_str("search")?;
            for name in self.search.iter() {
                write!(f, " {}", name)?;
            }
            f.write_str("\n")?;
        }
        if self.lookups != Lookups::default() {
            f.write_str("lookup bind file\n")?;
        }

        // Collect options so we only print them if there are any non-default
        // ones.
        let mut options = Vec::new();

        if self.ndots != DEFAULT_NDOTS {
            options.push(format!("ndots:{}", self.ndots));
        }
        if self.timeout != DEFAULT_TIMEOUT {
            // XXX This ignores fractional seconds.
            options.push(format!("timeout:{}", self.timeout.as_secs()));
        }
        if self.attempts != DEFAULT_ATTEMPTS {
            options.push(format!("attempts:{}", self.attempts));
        }
        for (flag, name) in [
            (InitFlags::USEVC, "use-vc"),
            (InitFlags::PRIMARY, "primary"),
            (InitFlags::IGNTC, "ign-tc"),
            (InitFlags::NORECURSE, "no-recurse"),
            (InitFlags::STAYOPEN, "stay-open"),
            (InitFlags::NOSEARCH, "no-dn-search"),
        ] {
            if self.flags.contains(flag) {
                options.push(name.into())
            }
        }

        if !options.is_empty() {
            f.write_str("options")?;
            for option in options {
                write!(f, " {}", option)?;
            }
            f.write_str("\n")?;
        }

        Ok(())
    }
}


//------------ Helpers -------------------------------------------------------

/// Returns whether a string is a valid domain name.
pub(crate) fn check_domain(s: &str) -> bool {
    !s.is_empty() && Name::<Vec<u8>>::from_str(s).is_ok()
}

/// Returns a reference to the next word or an error.
fn next_word<'a>(words: &mut SplitWhitespace<'a>) -> Result<&'a str, Error> {
    match words.next() {
        Some(word) => Ok(word),
        None => Err(Error::ParseError),
    }
}

/// Returns nothing but errors out if there are words left.
fn no_more_words(mut words: SplitWhitespace) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::ParseError),
        None => Ok(()),
    }
}

/// Splits the name and argument from an option with arguments.
///
/// These options consist of a name followed by a colon followed by a
/// value, which so far is only `usize`, so we do that.
fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.find(':') {
        Some(idx) => {
            let (left, right) = s.split_at(idx);
            Ok((
                left,
                Some(right[1..].parse().map_err(|_| Error::ParseError)?),
            ))
        }
        None => Ok((s, None)),
    }
}


//------------ Error ---------------------------------------------------------

/// The error that can happen when parsing `resolv.conf`.
#[derive(Debug)]
pub enum Error {
    /// The file is not a proper file.
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
            Error::ParseError => f.write_str("error parsing configuration"),
            Error::Io(err) => fmt::Display::fmt(err, f),
        }
    }
}


//============ Testing =======================================================
