use crate::frame::CapturedFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Latest-frame slot shared between the preview poll task and callers.
///
/// The poller overwrites the slot at the preview rate while enabled; the
/// engine disables it for the capture and post-shot display windows so
/// preview requests never interleave with a capture on the same camera
/// handle.
pub struct PreviewSlot {
    frame: Mutex<Option<CapturedFrame>>,
    enabled: AtomicBool,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(None),
            enabled: AtomicBool::new(false),
        }
    }

    pub fn store(&self, frame: CapturedFrame) {
        *self.frame.lock() = Some(frame);
    }

    /// Most recent frame, if any; frames share their byte buffers so this is
    /// cheap
    pub fn latest(&self) -> Option<CapturedFrame> {
        self.frame.lock().clone()
    }

    pub fn clear(&self) {
        *self.frame.lock() = None;
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl Default for PreviewSlot {
    fn default() -> Self {
        Self::new()
    }
}
