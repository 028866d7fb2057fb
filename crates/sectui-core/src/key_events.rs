#![forbid(unsafe_code)]

//! Multi-listener key broadcast.
//!
//! [`KeyEvents`] fans decoded keys out to every live [`KeySubscription`].
//! Each subscriber gets its own FIFO channel, so a slow listener never
//! reorders another listener's keys. Keys published before a listener
//! subscribes are not replayed to it.
//!
//! The broadcast exposes a one-shot readiness gate that opens when the first
//! subscription attaches. Tests (and callers injecting synthetic input) wait
//! on it with [`KeyEvents::wait_ready`] so no key is published into the void.
//!
//! # Reader thread
//!
//! [`KeyEvents::spawn`] starts a thread named `sectui-keys` that pulls byte
//! chunks from a terminal's input channel, runs them through a
//! [`KeyDecoder`], and publishes the result. While an escape sequence is
//! pending the thread waits with a timeout equal to the time left before the
//! decoder's deadline, so a lone Escape is reported promptly even if no
//! further byte ever arrives. The thread exits when the byte channel
//! disconnects.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};
use web_time::Instant;

use crate::key::Key;
use crate::key_decoder::{DecoderConfig, KeyDecoder};

struct Shared {
    subscribers: Mutex<Vec<Sender<Key>>>,
    ready: Mutex<bool>,
    ready_cv: Condvar,
}

/// Broadcast hub for decoded keys. Cheap to clone.
#[derive(Clone)]
pub struct KeyEvents {
    shared: Arc<Shared>,
}

impl Default for KeyEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEvents")
            .field("subscribers", &self.subscriber_count())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl KeyEvents {
    /// A broadcast with no input source. Keys are injected with
    /// [`publish`](Self::publish).
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(Vec::new()),
                ready: Mutex::new(false),
                ready_cv: Condvar::new(),
            }),
        }
    }

    /// Start decoding `bytes` on a background thread.
    ///
    /// Returns the broadcast and the reader's join handle.
    ///
    /// # Errors
    ///
    /// Fails if the OS refuses to spawn the thread.
    pub fn spawn(
        bytes: Receiver<Vec<u8>>,
        config: DecoderConfig,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let events = Self::new();
        let publisher = events.clone();
        let handle = thread::Builder::new()
            .name("sectui-keys".into())
            .spawn(move || publisher.read_loop(&bytes, KeyDecoder::new(config)))?;
        Ok((events, handle))
    }

    fn read_loop(&self, bytes: &Receiver<Vec<u8>>, mut decoder: KeyDecoder) {
        debug!("key reader started");
        loop {
            let chunk = match decoder.deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match bytes.recv_timeout(wait) {
                        Ok(chunk) => Some(chunk),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match bytes.recv() {
                    Ok(chunk) => Some(chunk),
                    Err(_) => break,
                },
            };
            match chunk {
                Some(chunk) => {
                    let now = Instant::now();
                    for byte in chunk {
                        for key in decoder.feed(byte, now) {
                            self.publish(key);
                        }
                    }
                }
                None => {
                    if let Some(key) = decoder.check_timeout(Instant::now()) {
                        trace!("escape timeout elapsed");
                        self.publish(key);
                    }
                }
            }
        }
        if let Some(key) = decoder.finish() {
            self.publish(key);
        }
        debug!("key reader stopped: input closed");
    }

    /// Attach a new listener. Opens the readiness gate on first call.
    pub fn subscribe(&self) -> KeySubscription {
        let (tx, rx) = mpsc::channel();
        self.shared.subscribers.lock().push(tx);
        let mut ready = self.shared.ready.lock();
        if !*ready {
            *ready = true;
            self.shared.ready_cv.notify_all();
        }
        KeySubscription { rx }
    }

    /// Deliver `key` to every live subscription. Dropped subscriptions are
    /// pruned. Returns the number of listeners that received it.
    pub fn publish(&self, key: Key) -> usize {
        let mut subscribers = self.shared.subscribers.lock();
        subscribers.retain(|tx| tx.send(key).is_ok());
        trace!(?key, listeners = subscribers.len(), "key published");
        subscribers.len()
    }

    /// Whether a subscription has ever attached.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.lock()
    }

    /// Block until the first subscription attaches or `timeout` elapses.
    ///
    /// Returns `true` if ready.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.shared.ready.lock();
        if *ready {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        while !*ready {
            if self.shared.ready_cv.wait_until(&mut ready, deadline).timed_out() {
                return *ready;
            }
        }
        true
    }

    /// Number of attached subscriptions (including ones dropped since the
    /// last publish).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }
}

/// One listener's FIFO view of the key stream.
#[derive(Debug)]
pub struct KeySubscription {
    rx: Receiver<Key>,
}

impl KeySubscription {
    /// Block for the next key. `None` once the broadcast is gone.
    pub fn recv(&self) -> Option<Key> {
        self.rx.recv().ok()
    }

    /// Wait up to `timeout` for the next key.
    ///
    /// # Errors
    ///
    /// [`RecvTimeoutError::Timeout`] if nothing arrived,
    /// [`RecvTimeoutError::Disconnected`] if the broadcast is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Key, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Take a key if one is already queued.
    ///
    /// # Errors
    ///
    /// See [`Receiver::try_recv`].
    pub fn try_recv(&self) -> Result<Key, TryRecvError> {
        self.rx.try_recv()
    }
}
