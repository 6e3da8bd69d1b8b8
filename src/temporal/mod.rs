//! Frame-to-frame state for temporal accumulation.
//!
//! [`TemporalTargets`] owns two color and two depth images that alternate
//! between "current" and "history" roles, a velocity image and the
//! accumulation output. [`AccumulationPass`] blends the current frame with
//! reprojected history. Whether history may be used at all is decided by
//! [`FrameConstants`](crate::FrameConstants) and passed in per frame.

mod accumulation;
mod ping_pong;
mod targets;

pub use accumulation::{AccumulationInputs, AccumulationPass, blend_history};
pub use ping_pong::{HistorySlot, PingPong};
pub use targets::{COLOR_FORMAT, DEPTH_FORMAT, TemporalTargets, VELOCITY_FORMAT};
