//! Core GPU context and device management.
//!
//! This module provides [`GpuContext`], the struct that holds the wgpu device and
//! queue every pass in the crate is created from. Unlike a windowed renderer the
//! transparency core never presents, so the context carries no surface: the host
//! either builds one headless with [`GpuContext::headless`] or wraps the device
//! and queue it already owns with [`GpuContext::from_parts`].
//!
//! # Example
//!
//! ```no_run
//! use lucent::GpuContext;
//!
//! let gpu = GpuContext::headless().expect("no GPU available");
//!
//! let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
//!     label: Some("My Buffer"),
//!     size: 1024,
//!     usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
//!     mapped_at_creation: false,
//! });
//! gpu.queue.write_buffer(&buffer, 0, &[0u8; 1024]);
//! ```

use crate::error::{RenderError, RenderResult};

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
/// The context is created once at startup and passed by reference to every
/// pass in the crate.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a context without a surface.
    ///
    /// This performs the usual wgpu initialization:
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Requests a high-performance adapter
    /// 3. Creates the logical device and command queue with default limits
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::AdapterUnavailable`] if no adapter is found and
    /// [`RenderError::Device`] if device creation fails.
    pub fn headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Lucent Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        Ok(Self { device, queue })
    }

    /// Wrap a device and queue owned by the host renderer.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Alignment every dynamic or offset uniform binding must respect.
    pub fn uniform_offset_alignment(&self) -> u32 {
        self.device.limits().min_uniform_buffer_offset_alignment
    }

    /// Largest storage buffer range a single binding may cover.
    pub fn max_storage_binding_size(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }

    /// Runs `create` inside a validation error scope.
    ///
    /// wgpu reports pipeline and shader errors asynchronously through the
    /// device's error handler. Wrapping creation in a scope turns them into a
    /// [`RenderError::Pipeline`] returned to the caller instead.
    pub fn checked<T>(&self, label: &'static str, create: impl FnOnce(&wgpu::Device) -> T) -> RenderResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(RenderError::Pipeline {
                label,
                message: error.to_string(),
            }),
            None => {
                log::info!("created {label}");
                Ok(value)
            }
        }
    }

    /// Compiles WGSL inside [`checked`](Self::checked), so parse and
    /// validation errors come back as [`RenderError::Pipeline`].
    pub fn create_shader(&self, label: &'static str, source: &str) -> RenderResult<wgpu::ShaderModule> {
        self.checked(label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> Option<GpuContext> {
        match GpuContext::headless() {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn broken_wgsl_is_returned_as_an_error() {
        let Some(gpu) = gpu() else { return };
        let result = gpu.create_shader("Broken Shader", "fn main( -> { return 1 }");
        match result {
            Err(RenderError::Pipeline { label, .. }) => assert_eq!(label, "Broken Shader"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("broken WGSL compiled"),
        }
    }

    #[test]
    fn valid_wgsl_compiles() {
        let Some(gpu) = gpu() else { return };
        let source = "@compute @workgroup_size(1) fn main() {}";
        assert!(gpu.create_shader("Empty Compute Shader", source).is_ok());
    }
}
