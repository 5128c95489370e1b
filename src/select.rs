//! A simple event loop driving a channel.
//!
//! This is the loop to use if the channel is the only thing you are
//! waiting for. It waits via `poll(2)`, so it blocks the current thread.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use crate::channel::Channel;
use crate::error::{Error, Result};


/// Drives a channel until it has nothing left to wait for.
///
/// The loop returns once the channel wants no socket to be watched, which
/// happens when all queries have completed, including those started by
/// completion handlers. It also returns if a handler destroyed the channel.
///
/// Each round waits at most until the channel’s next timeout and never
/// longer than `max_wait` if given.
pub fn run_until_idle(
    channel: &mut Channel,
    max_wait: Option<Duration>,
) -> Result<()> {
    loop {
        if channel.is_destroyed() {
            return Ok(());
        }
        let interest = channel.pending_descriptors()?;
        if interest.is_empty() {
            return Ok(());
        }
        let timeout = channel.next_timeout(max_wait)?;

        let mut fds: Vec<libc::pollfd> = interest
            .iter()
            .map(|event| {
                let mut events = 0;
                if event.read {
                    events |= libc::POLLIN;
                }
                if event.write {
                    events |= libc::POLLOUT;
                }
                libc::pollfd {
                    fd: event.fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        trace!("polling {} sockets for {:?}", fds.len(), timeout);
        // SAFETY: `fds` is a valid slice of `pollfd`s for the duration of
        // the call.
        let res = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                poll_timeout(timeout),
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                channel.process(&[], &[])?;
                continue;
            }
            return Err(Error::Io(Arc::new(err)));
        }

        let mut readable = Vec::new();
        let mut writable = Vec::new();
        for fd in &fds {
            let failed = fd.revents & (libc::POLLERR | libc::POLLHUP) != 0;
            if failed || fd.revents & libc::POLLIN != 0 {
                readable.push(fd.fd);
            }
            if failed || fd.revents & libc::POLLOUT != 0 {
                writable.push(fd.fd);
            }
        }
        channel.process(&readable, &writable)?;
    }
}

/// Converts a timeout into milliseconds for `poll(2)`.
///
/// Rounds up so we don’t wake up just before a deadline. `None` waits
/// forever.
fn poll_timeout(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        Some(timeout) => {
            let mut millis = timeout.as_millis();
            if timeout.subsec_nanos() % 1_000_000 != 0 {
                millis += 1;
            }
            libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
        }
        None => -1,
    }
}


//============ Testing =======================================================
