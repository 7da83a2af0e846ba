//! Outbound message queue with Twitch's send-rate limits applied.
//!
//! Producers [`queue`](SendQueue::queue) messages from any task; a single
//! consumer (the client's event loop) [`poll`](Throttle::poll)s on a fixed
//! cadence and releases at most one message per tick, never exceeding the
//! configured sends per rolling window. Order is strict FIFO: a message
//! never overtakes an older one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::tmi::write;

/// Time source for the rate window, so tests can drive it without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Sends allowed per window. `0` means nothing is ever sent.
    pub sends_per_period: u32,
    /// Window length.
    pub period: Duration,
    /// Consumer poll cadence.
    pub send_delay: Duration,
    /// Maximum queued messages; `queue` rejects beyond this.
    pub queue_capacity: usize,
    /// Queued messages older than this are dropped instead of sent.
    pub stale_after: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sends_per_period: 20,
            period: Duration::from_secs(30),
            send_delay: Duration::from_millis(50),
            queue_capacity: 10_000,
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

/// A chat message waiting to be sent. Immutable once queued.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
    pub reply_parent_msg_id: Option<String>,
    pub queued_at: Instant,
}

impl OutboundMessage {
    pub fn to_line(&self) -> String {
        match &self.reply_parent_msg_id {
            Some(parent) => write::reply(&self.channel, &self.text, parent),
            None => write::privmsg(&self.channel, &self.text),
        }
    }
}

/// The producer side: a bounded FIFO shared between the `Sender` handles
/// and the consumer loop.
pub struct SendQueue {
    items: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
    connected: AtomicBool,
}

impl SendQueue {
    pub fn new(capacity: usize) -> SendQueue {
        SendQueue {
            items: Mutex::new(VecDeque::new()),
            capacity,
            connected: AtomicBool::new(false),
        }
    }

    /// Accepts a message for sending. Returns `false` (and drops the
    /// message) when the connection is down or the queue is full.
    pub fn queue(&self, msg: OutboundMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(msg);
        true
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters of the current rate window, reported alongside send failures.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSnapshot {
    pub allowed: u32,
    pub sent: u32,
    pub period: Duration,
}

/// The consumer side. Owned by a single loop; nothing else touches the
/// window state.
pub struct Throttle<C: Clock = SystemClock> {
    config: Config,
    queue: Arc<SendQueue>,
    clock: C,
    window_started: Instant,
    sent_in_window: u32,
}

impl Throttle<SystemClock> {
    pub fn new(config: Config, queue: Arc<SendQueue>) -> Throttle<SystemClock> {
        Throttle::with_clock(config, queue, SystemClock)
    }
}

impl<C: Clock> Throttle<C> {
    pub fn with_clock(config: Config, queue: Arc<SendQueue>, clock: C) -> Throttle<C> {
        let now = clock.now();
        Throttle {
            config,
            queue,
            clock,
            window_started: now,
            sent_in_window: 0,
        }
    }

    /// One consumer tick.
    ///
    /// Resets the window when its period has elapsed, silently drops
    /// stale messages off the head, and then releases the head message
    /// if the window still has room. A released message counts against
    /// the window immediately, whether or not the transport manages to
    /// write it.
    pub fn poll(&mut self) -> Option<OutboundMessage> {
        let now = self.clock.now();
        if now.duration_since(self.window_started) >= self.config.period {
            self.window_started = now;
            self.sent_in_window = 0;
        }

        let mut items = self.queue.items.lock();
        loop {
            let queued_at = items.front()?.queued_at;
            if now.duration_since(queued_at) > self.config.stale_after {
                let dropped = items.pop_front();
                log::debug!(
                    "Dropping stale message for #{}",
                    dropped.map(|m| m.channel).unwrap_or_default()
                );
                continue;
            }
            if self.sent_in_window >= self.config.sends_per_period {
                // over budget; the head stays where it is
                return None;
            }
            self.sent_in_window += 1;
            return items.pop_front();
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            allowed: self.config.sends_per_period,
            sent: self.sent_in_window,
            period: self.config.period,
        }
    }

    pub fn send_delay(&self) -> Duration {
        self.config.send_delay
    }
}
