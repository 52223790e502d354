//! Lock-free system event queue.
//!
//! BLE GATT callbacks run in the Bluedroid task and cannot capture Rust
//! closures, so they communicate with the provisioning state machine
//! through a lock-free ring buffer instead of registered callback objects.
//! The pulse loop and console feed the same queue.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ GATT callbacks,  │────▶│  Event Queue │────▶│ provisioning /   │
//! │ pulse loop, tty  │     │  (lock-free) │     │ control task     │
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
const EVENT_QUEUE_CAP: usize = 16;

/// System events.  Producers: the BLE stack task, the pulse loop (limit
/// edges), and the console.  Consumed first by the provisioning machine,
/// then by the control task once provisioning hands off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// A controller device attached to the channel.
    PeerConnected = 0,
    /// The attached controller device detached (advertising restarts
    /// inside the transport, not here).
    PeerDisconnected = 1,
    /// The identity-in slot received a write.
    IdentityWritten = 2,
    /// The secret-in slot received a write.
    SecretWritten = 3,
    /// The tilt axis hit its home limit switch (inactive-to-active edge).
    LimitEdge = 4,
    /// Console requested a credential wipe and restart.
    FactoryReset = 5,
}

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// Slots hold the event discriminant + 1; 0 marks a slot whose payload is
// not yet published, so the consumer never reads a half-finished push.
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] = {
    const EMPTY: AtomicU8 = AtomicU8::new(0);
    [EMPTY; EVENT_QUEUE_CAP]
};

/// Push an event.  Lock-free, multi-producer; safe from the BLE stack
/// task, the pulse loop, and the console.  Returns `false` if the queue
/// is full (event dropped).
pub fn push_event(event: Event) -> bool {
    loop {
        let head = EVENT_HEAD.load(Ordering::Relaxed);
        let tail = EVENT_TAIL.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false; // Queue full — drop event.
        }

        // Reserve the slot; a concurrent producer that wins retries us.
        if EVENT_HEAD
            .compare_exchange(head, next_head, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            continue;
        }

        EVENT_BUFFER[head as usize].store(event as u8 + 1, Ordering::Release);
        return true;
    }
}

/// Pop the next event.  Single consumer only.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    // A reserved slot may not be published yet; treat it as empty until
    // the producer's Release store lands.
    let raw = EVENT_BUFFER[tail as usize].swap(0, Ordering::Acquire);
    if raw == 0 {
        return None;
    }
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw - 1)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::PeerConnected),
        1 => Some(Event::PeerDisconnected),
        2 => Some(Event::IdentityWritten),
        3 => Some(Event::SecretWritten),
        4 => Some(Event::LimitEdge),
        5 => Some(Event::FactoryReset),
        _ => None,
    }
}
