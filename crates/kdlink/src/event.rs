//! Thread rendezvous primitives with Win32-style event semantics.

use std::{
    sync::{Condvar, Mutex},
    time::Duration,
};

/// One-shot wakeup: `signal` latches at most one pending wakeup and
/// `wait` consumes it. Signaling before the waiter arrives does not
/// lose the wakeup, which is what lets a requester send its packet
/// first and park afterwards.
#[derive(Debug, Default)]
pub struct AutoResetEvent {
    signaled: Mutex<bool>,
    cvar: Condvar,
}

impl AutoResetEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        self.cvar.notify_one();
    }

    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.cvar.wait(signaled).unwrap();
        }
        *signaled = false;
    }

    /// Bounded wait; true if the event fired, false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (mut signaled, result) = self
            .cvar
            .wait_timeout_while(self.signaled.lock().unwrap(), timeout, |signaled| !*signaled)
            .unwrap();
        if result.timed_out() {
            return false;
        }
        *signaled = false;
        true
    }
}

/// Stays signaled until explicitly reset.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    signaled: Mutex<bool>,
    cvar: Condvar,
}

impl ManualResetEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        self.cvar.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.cvar.wait(signaled).unwrap();
        }
    }
}

/// Rendezvous slot pairing an auto-reset wakeup with a payload.
///
/// The reader posts at most one value before the waiter consumes it;
/// the one-outstanding-request discipline upstream guarantees the slot
/// is never overwritten while armed.
#[derive(Debug)]
pub struct Mailbox<T> {
    event: AutoResetEvent,
    slot: Mutex<Option<T>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self { event: AutoResetEvent::new(), slot: Mutex::new(None) }
    }

    pub fn post(&self, value: T) {
        *self.slot.lock().unwrap() = Some(value);
        self.event.signal();
    }

    /// Wakes the waiter with an empty slot; it observes `None` and
    /// bails out. Used by teardown.
    pub fn release(&self) {
        self.event.signal();
    }

    /// Parks until posted or released. `None` means released without a
    /// value.
    pub fn wait(&self) -> Option<T> {
        self.event.wait();
        self.slot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn signal_before_wait_is_not_lost() {
        let event = AutoResetEvent::new();
        event.signal();
        event.wait();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn signal_is_consumed_by_one_wait() {
        let event = AutoResetEvent::new();
        event.signal();
        event.signal();
        assert!(event.wait_timeout(Duration::from_secs(1)));
        // Latched, not counted: the second signal coalesced.
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wakes_a_parked_waiter() {
        let event = Arc::new(AutoResetEvent::new());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait())
        };
        thread::sleep(Duration::from_millis(20));
        event.signal();
        waiter.join().unwrap();
    }

    #[test]
    fn manual_reset_stays_signaled() {
        let event = ManualResetEvent::new();
        event.signal();
        event.wait();
        event.wait();
        event.reset();
    }

    #[test]
    fn mailbox_delivers_the_payload() {
        let mailbox = Mailbox::new();
        mailbox.post(7u32);
        assert_eq!(mailbox.wait(), Some(7));
    }

    #[test]
    fn released_mailbox_yields_none() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        mailbox.release();
        assert_eq!(mailbox.wait(), None);
    }
}
