//! Triple-buffered frame handoff between the emulation thread and the
//! presentation thread.
//!
//! The back buffer belongs to the writer: the video chip draws into it
//! directly, without any locking. The consumer owns the front buffer and
//! reads it without any locking. The mid buffer sits in a shared slot;
//! both sides only ever swap their own buffer with it, under a
//! `try_lock`. A swap exchanges `Vec` handles, never pixel data. When the
//! lock is contended the swap is skipped: the writer keeps drawing into
//! its back buffer and the consumer shows its previous front buffer again,
//! at most one frame stale.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug)]
struct Slot {
    mid: Vec<u8>,
    /// The mid buffer holds a frame the consumer hasn't taken yet.
    fresh: bool,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
}

/// Dimensions shared by all three buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
}

impl FrameFormat {
    /// Bytes per row.
    #[must_use]
    pub const fn pitch(&self) -> usize {
        self.width * self.bytes_per_pixel
    }

    /// Bytes per frame.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.pitch() * self.height
    }
}

/// Writing half, owned by the emulation thread. The back buffer it
/// publishes is held by the writer.
#[derive(Debug)]
pub struct FrameProducer {
    shared: Arc<Shared>,
}

/// Reading half, owned by the presentation thread.
#[derive(Debug)]
pub struct FrameConsumer {
    front: Vec<u8>,
    format: FrameFormat,
    shared: Arc<Shared>,
}

/// Create the zeroed mid and front buffers and split the slot between a
/// producer and a consumer. The third buffer is the writer's back buffer
/// of `format.size()` bytes.
#[must_use]
pub fn frame_handoff(format: FrameFormat) -> (FrameProducer, FrameConsumer) {
    let size = format.size();
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            mid: vec![0; size],
            fresh: false,
        }),
    });
    (
        FrameProducer {
            shared: Arc::clone(&shared),
        },
        FrameConsumer {
            front: vec![0; size],
            format,
            shared,
        },
    )
}

impl FrameProducer {
    /// Hand the finished frame in `back` over; `back` comes back holding
    /// the spare buffer to draw the next frame into. Returns `false` if
    /// the slot was contended, leaving `back` untouched.
    pub fn publish(&mut self, back: &mut Vec<u8>) -> bool {
        let Some(mut slot) = self.shared.slot.try_lock() else {
            return false;
        };
        mem::swap(back, &mut slot.mid);
        slot.fresh = true;
        true
    }
}

impl FrameConsumer {
    /// Take the newest published frame, if there is one and the slot is
    /// free. Returns whether `front` changed.
    pub fn acquire(&mut self) -> bool {
        let Some(mut slot) = self.shared.slot.try_lock() else {
            return false;
        };
        if !slot.fresh {
            return false;
        }
        mem::swap(&mut self.front, &mut slot.mid);
        slot.fresh = false;
        true
    }

    /// The frame to present.
    #[must_use]
    pub fn front(&self) -> &[u8] {
        &self.front
    }

    /// Bytes per row of `front`.
    #[must_use]
    pub fn pitch(&self) -> usize {
        self.format.pitch()
    }

    #[must_use]
    pub fn format(&self) -> FrameFormat {
        self.format
    }
}
