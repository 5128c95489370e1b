//! The services table.
//!
//! This maps port numbers and protocols to service names the way the
//! system’s `/etc/services` file does.

use std::collections::HashMap;
use std::path::Path;
use std::{fs, io};
use crate::hosts::Error;


//------------ Module Configuration ------------------------------------------

/// The path of the system’s services table.
const SERVICES: &str = "/etc/services";


//------------ Services ------------------------------------------------------

/// A table of well-known services.
#[derive(Clone, Debug, Default)]
pub struct Services {
    /// Service names keyed by port and lowercase protocol.
    by_port: HashMap<(u16, String), String>,
}

impl Services {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the services table of this system.
    ///
    /// If the file cannot be read, the table is empty.
    pub fn system() -> Self {
        let mut res = Services::new();
        let _ = res.parse_file(SERVICES);
        res
    }

    /// Adds a service.
    ///
    /// If there already is a service for the port and protocol, the
    /// earlier entry wins.
    pub fn add(&mut self, name: &str, port: u16, protocol: &str) {
        self.by_port
            .entry((port, protocol.to_ascii_lowercase()))
            .or_insert_with(|| name.into());
    }

    /// Returns the name of the service at a port.
    pub fn lookup(&self, port: u16, protocol: &str) -> Option<&str> {
        self.by_port
            .get(&(port, protocol.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Adds the services listed in a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Reads services in `/etc/services` format from a reader.
    ///
    /// Lines that don’t have a name and a `port/protocol` pair are
    /// skipped.
    pub fn parse<R: io::Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line.as_str(),
            };
            let mut words = line.split_whitespace();
            let (name, spec) = match (words.next(), words.next()) {
                (Some(name), Some(spec)) => (name, spec),
                _ => continue,
            };
            let (port, protocol) = match spec.split_once('/') {
                Some(pair) => pair,
                None => continue,
            };
            if let Ok(port) = port.parse() {
                self.add(name, port, protocol)
            }
        }
        Ok(())
    }
}


//============ Testing =======================================================
