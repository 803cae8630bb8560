//! Background worker threads with a bounded backlog.

use std::{
    fmt, io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// What happens to messages sent to a [`Worker`] while it is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backlog {
    /// Keep at most one pending message. Sending a new message while one is pending replaces it.
    ///
    /// This keeps latency low when the producer is faster than the worker, at the cost of skipped
    /// messages.
    #[default]
    Latest,
    /// Queue every message until the worker gets to it.
    Unbounded,
}

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    backlog: Backlog,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the [`Backlog`] policy of the [`Worker`].
    ///
    /// By default, [`Backlog::Latest`] is used.
    pub fn backlog(self, backlog: Backlog) -> Self {
        Self { backlog, ..self }
    }

    /// Spawns a [`Worker`] thread that uses `handler` to process incoming messages.
    pub fn spawn<I, F>(self, mut handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let (sender, recv) = match self.backlog {
            Backlog::Latest => crossbeam_channel::bounded(1),
            Backlog::Unbounded => crossbeam_channel::unbounded(),
        };
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let name = self.name.unwrap_or_else(|| String::from("<unnamed>"));
        let thread_recv = recv.clone();
        let handle = builder.spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in thread_recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Worker {
            sender: Some(sender),
            recv,
            handle: Some(handle),
        })
    }
}

/// A handle to a worker thread that processes messages of type `I`.
///
/// When dropped, pending messages are discarded, the channel to the thread is closed and the
/// thread is joined. If the thread has panicked, the panic will be forwarded to the thread dropping
/// the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    /// Used to take back pending messages.
    recv: Receiver<I>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        self.close();
    }
}

impl Worker<()> {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            backlog: Backlog::default(),
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn wait_for_exit(&mut self) {
        // Wait for it to exit and propagate its panic if it panicked.
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }

    fn has_exited(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Removes all messages the worker has not started processing yet.
    fn drain(&self) -> usize {
        self.recv.try_iter().count()
    }

    /// Sends a message to the worker thread without blocking.
    ///
    /// Returns the pending message that was displaced by `msg`, if any. That can only happen with
    /// [`Backlog::Latest`].
    ///
    /// If the worker has panicked, this will propagate the panic to the calling thread. If the
    /// worker is closed, `msg` is handed back in the error.
    pub fn send(&mut self, msg: I) -> Result<Option<I>, SendError<I>> {
        if self.has_exited() {
            self.wait_for_exit();
            return Err(SendError(msg));
        }
        let Some(sender) = &self.sender else {
            return Err(SendError(msg));
        };

        let mut msg = msg;
        let mut displaced = None;
        loop {
            match sender.try_send(msg) {
                Ok(()) => return Ok(displaced),
                Err(TrySendError::Full(m)) => {
                    msg = m;
                    // The worker may grab the pending message first, then the retry succeeds.
                    if let Ok(old) = self.recv.try_recv() {
                        displaced = Some(old);
                    }
                }
                Err(TrySendError::Disconnected(m)) => return Err(SendError(m)),
            }
        }
    }

    /// Closes the worker.
    ///
    /// Pending messages are discarded, but a message that is currently being processed is allowed
    /// to finish. Blocks until the worker thread has exited and returns the number of discarded
    /// messages.
    ///
    /// If the worker has panicked, the panic is propagated to the calling thread.
    pub fn close(&mut self) -> usize {
        // Dropping the only `Sender` makes the thread exit once the channel is empty.
        drop(self.sender.take());
        let discarded = self.drain();
        self.wait_for_exit();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

/// Error returned by [`Worker::send`] when the worker is no longer running.
///
/// Contains the message that could not be sent.
pub struct SendError<I>(pub I);

impl<I> fmt::Debug for SendError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<I> fmt::Display for SendError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("worker thread is not running")
    }
}
