//! Error types for the transparency and temporal core.
//!
//! Errors fall into three groups:
//!
//! - [`ConfigError`]: invalid construction parameters. Returned before any GPU
//!   resource is touched.
//! - [`SceneError`]: a scene whose node/mesh/material indices do not line up.
//! - [`RenderError`]: everything that can go wrong while talking to the device,
//!   including the two groups above when they surface through a GPU call.
//!
//! Fragment-list overflow has no variant: excess fragments are dropped
//! by the writer and never reported.

/// Invalid renderer parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("resolution must be non-zero, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },

    #[error("fragment list multiplier must be at least 1")]
    ZeroListMultiplier,

    #[error("frames in flight must be at least 1")]
    ZeroFramesInFlight,

    #[error("resolution scale must be finite and positive, got {0}")]
    InvalidResolutionScale(f32),

    #[error("history weight must lie in [0, 1), got {0}")]
    InvalidHistoryWeight(f32),

    #[error("fragment capacity {multiplier} x {pixels} pixels does not fit in 32 bits")]
    CapacityOverflow { multiplier: u32, pixels: u64 },

    #[error("fragment list needs {required} bytes but the device allows {limit}")]
    ListBufferTooLarge { required: u64, limit: u64 },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// A scene referencing something that does not exist.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node index {0} is out of range")]
    InvalidNode(u32),

    #[error("node {node} references missing mesh {mesh}")]
    InvalidMesh { node: u32, mesh: u32 },

    #[error("mesh {mesh} draw call {draw_call} references missing material {material}")]
    InvalidMaterial {
        mesh: u32,
        draw_call: usize,
        material: u32,
    },

    #[error("node {0} is reachable more than once from the root list")]
    NodeReused(u32),
}

/// Errors raised while creating or driving GPU resources.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("{label} creation failed: {message}")]
    Pipeline { label: &'static str, message: String },

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Result alias used across the crate.
pub type RenderResult<T> = Result<T, RenderError>;
