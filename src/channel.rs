//! The resolution channel.
//!
//! A [`Channel`] is the context all queries are started in. It owns a
//! resolver [`Engine`], the completion handlers of all queries still in
//! progress, and an optional handler that is told whenever the set of
//! sockets the channel wants to be watched changes.
//!
//! Channels don’t do any waiting themselves. Whoever drives the channel
//! asks for the [pending descriptors][Channel::pending_descriptors] and the
//! [next timeout][Channel::next_timeout], waits for any of the descriptors
//! to become ready or the timeout to pass, and then calls
//! [`process`][Channel::process]. If you don’t have an event loop of your
//! own, [`run_until_idle`][Channel::run_until_idle] does all this for you.
//!
//! All of this happens on a single thread. Completion handlers are called
//! synchronously from within `process` or, if the engine can answer a
//! query right away, from within the call that started the query. They get
//! a mutable reference to the channel so they can start new queries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use crate::conf::ResolvConf;
use crate::engine::{
    Engine, QueryId, Request, SocketEvent, StubEngine, Submitted,
};
use crate::error::{Error, Result};
use crate::marshal::Handler;
use crate::options::Options;


//------------ SocketStateHandler --------------------------------------------

/// A handler told about changes of the channel’s socket interest.
///
/// An event with neither `read` nor `write` set means that the socket is of
/// no more interest to the channel.
pub type SocketStateHandler = Box<dyn FnMut(SocketEvent)>;


//------------ Channel -------------------------------------------------------

/// A resolution channel.
pub struct Channel {
    /// The engine doing the actual resolving.
    engine: Box<dyn Engine>,

    /// The handler for socket state changes.
    notifier: Option<SocketStateHandler>,

    /// The completion handlers of all pending queries.
    ///
    /// Since identifiers are increasing, this is in submission order.
    queries: BTreeMap<QueryId, Handler>,

    /// The identifier for the next query.
    next_id: QueryId,

    /// The socket interest last reported to the notifier.
    interest: HashMap<RawFd, SocketEvent>,

    /// Whether the channel has been destroyed.
    destroyed: bool,
}


/// # Creation and Destruction
///
impl Channel {
    /// Creates a channel using the system’s configuration.
    pub fn new() -> Result<Self> {
        Self::create(None, None)
    }

    /// Creates a channel using the system’s configuration amended by
    /// `options`.
    pub fn with_options(options: Options) -> Result<Self> {
        Self::create(Some(options), None)
    }

    /// Creates a channel with the stub engine.
    ///
    /// The configuration is read from the system. Each field present in
    /// `options` replaces the corresponding setting. If any of the options
    /// is invalid, no channel is created.
    pub fn create(
        options: Option<Options>,
        notifier: Option<SocketStateHandler>,
    ) -> Result<Self> {
        let mut conf = ResolvConf::system();
        if let Some(options) = options {
            options.apply_to(&mut conf)?;
        }
        conf.finalize();
        debug!("creating channel with {} servers", conf.servers.len());
        Ok(Self::with_engine(StubEngine::new(conf), notifier))
    }

    /// Creates a channel using the given engine.
    pub fn with_engine(
        engine: impl Engine + 'static,
        notifier: Option<SocketStateHandler>,
    ) -> Self {
        Channel {
            engine: Box::new(engine),
            notifier,
            queries: BTreeMap::new(),
            next_id: QueryId::from_raw(0),
            interest: HashMap::new(),
            destroyed: false,
        }
    }

    /// Destroys the channel.
    ///
    /// This closes all sockets and hands [`Error::Destruction`] to the
    /// completion handlers of all pending queries in the order the queries
    /// were started. The socket state handler learns about the closed
    /// sockets before any completion handler is called and is never called
    /// again afterwards.
    ///
    /// A channel can only be destroyed once. Any later call fails with
    /// [`Error::Destruction`]. Dropping a channel destroys it.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(Error::Destruction);
        }
        self.destroyed = true;
        debug!("destroying channel with {} pending queries", self.queries.len());

        let mut closed: Vec<RawFd> = self.interest.drain().map(|(fd, _)| fd).collect();
        closed.sort_unstable();
        if let Some(mut notifier) = self.notifier.take() {
            for fd in closed {
                notifier(SocketEvent::closed(fd))
            }
        }
        self.engine.shutdown();

        let queries = std::mem::take(&mut self.queries);
        for (_, handler) in queries {
            handler.fail(self, Error::Destruction)
        }
        Ok(())
    }

    /// Returns whether the channel has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn check_alive(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::Destruction)
        } else {
            Ok(())
        }
    }
}


/// # Driving the Channel
///
impl Channel {
    /// Returns the sockets that should currently be watched.
    pub fn pending_descriptors(&self) -> Result<Vec<SocketEvent>> {
        self.check_alive()?;
        Ok(self.engine.interest().into_vec())
    }

    /// Returns how long to wait at most before calling `process` again.
    ///
    /// This is the time until the engine’s next timeout but no longer than
    /// `max_wait` if given. Returns `None` if there is no limit at all.
    pub fn next_timeout(
        &self,
        max_wait: Option<Duration>,
    ) -> Result<Option<Duration>> {
        self.check_alive()?;
        let next = self
            .engine
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        Ok(match (next, max_wait) {
            (Some(next), Some(max)) => Some(next.min(max)),
            (next, None) => next,
            (None, max) => max,
        })
    }

    /// Processes ready sockets and expired timeouts.
    ///
    /// Call this with the sockets that became ready for reading or writing.
    /// Both may be empty if the wait ended due to a timeout. This calls the
    /// completion handlers of all queries that finished.
    pub fn process(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
    ) -> Result<()> {
        self.check_alive()?;
        let completions = self.engine.process(readable, writable);
        self.update_interest();
        for completion in completions {
            // The handler is gone if the channel was destroyed meanwhile.
            if let Some(handler) = self.queries.remove(&completion.id) {
                trace!("query {} completed", completion.id);
                handler.complete(self, completion.result);
            }
        }
        self.update_interest();
        Ok(())
    }

    /// Drives the channel until there is nothing left to do.
    ///
    /// See [`run_until_idle`][crate::select::run_until_idle] for details.
    pub fn run_until_idle(&mut self, max_wait: Option<Duration>) -> Result<()> {
        crate::select::run_until_idle(self, max_wait)
    }

    /// Returns the number of queries still pending.
    pub fn pending_queries(&self) -> usize {
        self.queries.len()
    }
}


/// # Starting Queries
///
impl Channel {
    /// Hands a request to the engine.
    ///
    /// If the engine answers right away, the handler is called before this
    /// method returns.
    pub(crate) fn submit(
        &mut self,
        request: Request,
        handler: Handler,
    ) -> Result<()> {
        self.check_alive()?;
        let id = self.next_id;
        self.next_id = id.next();
        trace!("submitting query {}: {:?}", id, request);
        match self.engine.submit(id, request) {
            Submitted::Pending => {
                self.queries.insert(id, handler);
                self.update_interest();
            }
            Submitted::Done(result) => {
                self.update_interest();
                handler.complete(self, result);
            }
        }
        Ok(())
    }

    /// Tells the notifier about changes in the socket interest.
    fn update_interest(&mut self) {
        if self.destroyed {
            return;
        }
        let current = self.engine.interest();
        let mut closed: Vec<RawFd> = self
            .interest
            .keys()
            .filter(|fd| !current.iter().any(|event| event.fd == **fd))
            .copied()
            .collect();
        closed.sort_unstable();
        for fd in closed {
            self.interest.remove(&fd);
            self.notify(SocketEvent::closed(fd));
        }
        for event in current {
            if self.interest.get(&event.fd) != Some(&event) {
                self.interest.insert(event.fd, event);
                self.notify(event);
            }
        }
    }

    fn notify(&mut self, event: SocketEvent) {
        trace!("socket state: {:?}", event);
        if let Some(ref mut notifier) = self.notifier {
            notifier(event)
        }
    }
}


//--- Drop

impl Drop for Channel {
    fn drop(&mut self) {
        if !self.destroyed {
            let _ = self.destroy();
        }
    }
}


//--- Debug

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("queries", &self.queries.len())
            .field("interest", &self.interest)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
