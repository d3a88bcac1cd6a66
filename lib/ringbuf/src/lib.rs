// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static trace ring buffers for instrumenting drivers.
//!
//! A ring buffer declared with [`ringbuf!`] is a fixed-size static that
//! records the most recent events of interest in a module, for inspection
//! from a debugger or a RAM dump. Entries record the source line that
//! generated them, and consecutive identical entries are coalesced into a
//! repeat count so that a hot polling loop does not flush the rest of the
//! buffer.
//!
//! The payload type must implement `Copy` and `PartialEq`. If you use the
//! variants of the macros that leave the buffer name implicit, you can only
//! have one buffer per module; provide a name to lift that constraint.
//!
//! ```ignore
//! ringbuf!(Trace, 16, Trace::None);
//!
//! // ...
//!
//! ringbuf_entry!(Trace::I2cError(code));
//! ```
//!
//! The buffer lives behind a spinlock so that entries can be recorded from
//! any context. Recording never blocks: if the lock is contended, the entry
//! is dropped rather than spinning, on the theory that a trace facility must
//! not deadlock the thing it is tracing.

#![cfg_attr(not(test), no_std)]

/// Re-export the bits we use from `spin` so that code generated by the
/// macros is guaranteed to be able to find them.
pub use spin::Mutex;

/// Declares a ring buffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ring buffer named `NAME`,
/// containing entries of type `Type`, with room for `N` such entries, all of
/// which are initialized to `expr`.
///
/// The resulting ring buffer will be static, so `NAME` should be uppercase.
/// The actual type of `NAME` will be `Mutex<Ringbuf<Type, N>>`.
///
/// To support the common case of having one quickly-installed ring buffer
/// per module, if you omit the name, it will default to `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::Mutex<$crate::Ringbuf<$t, $n>> =
            $crate::Mutex::new($crate::Ringbuf {
                next: 0,
                buffer: [$crate::RingbufEntry {
                    line: 0,
                    count: 0,
                    payload: $init,
                }; $n],
            });
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Inserts data into a named ring buffer (which should have been declared
/// with the [`ringbuf!`] macro).
///
/// `ringbuf_entry!(NAME, expr)` will insert `expr` into the ring buffer
/// called `NAME`. If you declared your ring buffer without a name, you can
/// also use this without a name, and it will default to `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate both buf and payload before taking the lock, in a tuple
        // where neither can accidentally use the other's binding.
        let (p, buf) = ($payload, &$buf);
        // Qualified call syntax so a local fn named try_lock or record
        // can't capture these.
        if let Some(mut rb) = $crate::Mutex::try_lock(buf) {
            $crate::Ringbuf::record(&mut *rb, line!() as u16, p);
        }
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

/// Inserts data into a ring buffer at the root of this crate.
#[allow(clippy::crate_in_macro_def)]
#[macro_export]
macro_rules! ringbuf_entry_root {
    ($buf:ident, $payload:expr) => {
        $crate::ringbuf_entry!(crate::$buf, $payload);
    };
    ($payload:expr) => {
        $crate::ringbuf_entry!(crate::__RINGBUF, $payload);
    };
}

/// The structure of a single [`Ringbuf`] entry, carrying a payload of
/// arbitrary type. When an entry is generated with the same line and payload
/// as the most recent entry, `count` is incremented rather than a new entry
/// being written. A `count` of zero marks a slot that has never been
/// written.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size. In practice, instantiating
/// this directly is strange -- see the [`ringbuf!`] macro. The fields are
/// public so that a debugger can walk the static without help.
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    /// Index of the slot the next distinct entry will be written to.
    pub next: usize,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub fn record(&mut self, line: u16, payload: T) {
        // The most recent entry is the one just behind the write index. Its
        // count is zero only if nothing has been recorded yet, in which case
        // it must not be coalesced with.
        let prev = if self.next == 0 { N - 1 } else { self.next - 1 };
        if let Some(ent) = self.buffer.get_mut(prev) {
            if ent.count != 0 && ent.line == line && ent.payload == payload {
                // A saturated count keeps coalescing; the exact repeat
                // count stops being meaningful long before 4 billion.
                ent.count = ent.count.saturating_add(1);
                return;
            }
        }

        self.buffer[self.next] = RingbufEntry {
            line,
            count: 1,
            payload,
        };
        self.next = if self.next + 1 >= N { 0 } else { self.next + 1 };
    }
}
