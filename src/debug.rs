//! Realtime-safe diagnostics.
//!
//! `mv_log!` formats into a fixed-size entry and pushes it onto a lock-free
//! single-producer ring, so the audio thread can report dropped frames and
//! skipped blocks without allocating. The presenter thread drains the ring
//! into the `log` crate. Compiled out unless the `debug` feature is enabled.

use std::fmt;

#[cfg(feature = "debug")]
pub mod ring {
    use std::cell::UnsafeCell;
    use std::fmt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    const RING_CAP: usize = 256;
    const MSG_MAX: usize = 256;

    #[derive(Copy, Clone)]
    struct Entry {
        len: u16,
        bytes: [u8; MSG_MAX],
    }

    impl Default for Entry {
        fn default() -> Self {
            Self {
                len: 0,
                bytes: [0; MSG_MAX],
            }
        }
    }

    impl Entry {
        fn as_str(&self) -> &str {
            std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("<invalid>")
        }
    }

    struct Ring {
        head: AtomicUsize,
        tail: AtomicUsize,
        slots: Box<[UnsafeCell<Entry>]>,
    }

    // One producer (audio thread), one consumer (presenter thread).
    unsafe impl Sync for Ring {}

    impl Ring {
        fn new() -> Self {
            Self {
                head: AtomicUsize::new(0),
                tail: AtomicUsize::new(0),
                slots: (0..RING_CAP)
                    .map(|_| UnsafeCell::new(Entry::default()))
                    .collect(),
            }
        }

        fn push(&self, entry: Entry) {
            let head = self.head.load(Ordering::Relaxed);
            let next = (head + 1) % RING_CAP;
            if next == self.tail.load(Ordering::Acquire) {
                // Full: newest message is lost
                return;
            }
            unsafe {
                *self.slots[head].get() = entry;
            }
            self.head.store(next, Ordering::Release);
        }

        fn pop(&self) -> Option<Entry> {
            let tail = self.tail.load(Ordering::Relaxed);
            if tail == self.head.load(Ordering::Acquire) {
                return None;
            }
            let entry = unsafe { *self.slots[tail].get() };
            self.tail.store((tail + 1) % RING_CAP, Ordering::Release);
            Some(entry)
        }
    }

    static RING: OnceLock<Ring> = OnceLock::new();
    static ENABLED: AtomicBool = AtomicBool::new(false);

    /// Allocate the ring. Call from a non-realtime context before processing.
    pub fn init() {
        let _ = RING.get_or_init(Ring::new);
        ENABLED.store(true, Ordering::Relaxed);
    }

    struct FixedWriter {
        entry: Entry,
    }

    impl fmt::Write for FixedWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let len = self.entry.len as usize;
            let n = s.len().min(MSG_MAX - len);
            self.entry.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.entry.len += n as u16;
            Ok(())
        }
    }

    pub fn push_args(args: fmt::Arguments) {
        if !ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(ring) = RING.get() else {
            return;
        };
        let mut writer = FixedWriter {
            entry: Entry::default(),
        };
        let _ = fmt::write(&mut writer, args);
        ring.push(writer.entry);
    }

    /// Hand every queued message to `sink`, oldest first.
    pub fn drain(mut sink: impl FnMut(&str)) {
        let Some(ring) = RING.get() else {
            return;
        };
        while let Some(entry) = ring.pop() {
            if entry.len > 0 {
                sink(entry.as_str());
            }
        }
    }
}

#[cfg(feature = "debug")]
pub(crate) fn mv_log_inner(args: fmt::Arguments) {
    ring::push_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn mv_log_inner(_args: fmt::Arguments) {}

/// Forward queued realtime diagnostics to the `log` crate.
pub fn forward_to_log() {
    #[cfg(feature = "debug")]
    ring::drain(|msg| log::debug!(target: "music_vis_backend::rt", "{}", msg));
}

#[macro_export]
macro_rules! mv_log {
    ($($arg:tt)*) => {
        $crate::debug::mv_log_inner(format_args!($($arg)*))
    };
}
