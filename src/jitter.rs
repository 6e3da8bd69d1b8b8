//! Sub-pixel jitter sequence and history invalidation.
//!
//! Temporal accumulation needs every frame to sample a slightly different
//! sub-pixel position. [`JitterController`] walks a fixed eight-entry Halton
//! (2, 3) sequence and reports both the current and the previous offset, so
//! the accumulation stage can undo last frame's shift when it reads history.
//!
//! The controller also owns the history invalidation flag. Anything that
//! makes last frame's image meaningless for this frame (a new field of view,
//! a new aspect ratio, a resized viewport, re-enabling accumulation) calls
//! [`JitterController::invalidate`]. For exactly one frame the previous
//! jitter then equals the current one, and the flag clears in
//! [`JitterController::end_frame`].

use glam::{Mat4, Vec2, Vec4};

/// Number of offsets before the sequence repeats.
pub const JITTER_SEQUENCE_LENGTH: u32 = 8;

/// Radical inverse of `index` in `base`, in `[0, 1)`.
///
/// # Arguments
///
/// * `index` - Sample index; 0 maps to 0, so callers start at 1
/// * `base` - Prime base (2 and 3 for the jitter sequence)
pub fn halton(index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut f = 1.0f32;
    let mut i = index;

    while i > 0 {
        f /= base as f32;
        result += f * (i % base) as f32;
        i /= base;
    }

    result
}

/// Raw offset for sequence position `index`, scaled into `[-1, 1]`.
pub fn jitter_sample(index: u32) -> Vec2 {
    let i = index % JITTER_SEQUENCE_LENGTH + 1;
    Vec2::new(halton(i, 2), halton(i, 3)) * 2.0 - Vec2::ONE
}

/// Shifts a projection matrix by a clip-space offset.
///
/// A clip-space translation moves every projected point by `offset * w`,
/// which is exactly `offset` after the perspective divide.
pub fn apply_jitter(projection: Mat4, offset: Vec2) -> Mat4 {
    Mat4::from_translation(offset.extend(0.0)) * projection
}

/// Walks the jitter sequence and tracks history invalidation.
#[derive(Clone, Copy, Debug)]
pub struct JitterController {
    index: u32,
    invalidate_history: bool,
}

impl Default for JitterController {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterController {
    /// Starts at sequence position 0 with history invalidated, since no
    /// previous frame exists yet.
    pub fn new() -> Self {
        Self {
            index: 0,
            invalidate_history: true,
        }
    }

    /// Current position in the sequence.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Requests that the next completed frame ignores its history.
    pub fn invalidate(&mut self) {
        if !self.invalidate_history {
            log::debug!("temporal history invalidated");
        }
        self.invalidate_history = true;
    }

    pub fn is_history_invalidated(&self) -> bool {
        self.invalidate_history
    }

    /// Offset for this frame, normalized by the viewport size.
    pub fn current(&self, viewport: Vec2) -> Vec2 {
        jitter_sample(self.index) / viewport
    }

    /// Offset used by the previous frame, normalized by the viewport size.
    pub fn previous(&self, viewport: Vec2) -> Vec2 {
        let previous = (self.index + JITTER_SEQUENCE_LENGTH - 1) % JITTER_SEQUENCE_LENGTH;
        jitter_sample(previous) / viewport
    }

    /// Packs `(current.xy, previous.xy)` for the frame constants.
    ///
    /// While history is invalidated the previous half repeats the current
    /// one. A disabled controller produces zero jitter.
    pub fn frame_jitter(&self, viewport: Vec2, enabled: bool) -> Vec4 {
        if !enabled {
            return Vec4::ZERO;
        }
        let current = self.current(viewport);
        let previous = if self.invalidate_history {
            current
        } else {
            self.previous(viewport)
        };
        Vec4::new(current.x, current.y, previous.x, previous.y)
    }

    /// Advances the sequence and clears invalidation.
    pub fn end_frame(&mut self) {
        self.index = (self.index + 1) % JITTER_SEQUENCE_LENGTH;
        self.invalidate_history = false;
    }
}
