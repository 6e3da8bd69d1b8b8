//! Sizes and byte layout of the fragment list buffers.

use crate::error::ConfigError;

/// End-of-chain marker stored in list heads and links.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// Bytes before the first entry: the bump allocator counter.
pub const LIST_HEADER_SIZE: u64 = 4;

/// One appended fragment, as stored in the list buffer.
///
/// `color` is `pack4x8unorm(rgba)` with red in the low byte. `link` is the
/// slot of the fragment appended to the same pixel just before this one, or
/// [`SENTINEL`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FragmentEntry {
    pub depth: f32,
    pub color: u32,
    pub link: u32,
}

/// Byte stride of [`FragmentEntry`] in the list buffer.
pub const FRAGMENT_ENTRY_SIZE: u64 = std::mem::size_of::<FragmentEntry>() as u64;

/// Resolution-dependent sizing of the head map and fragment list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ABufferLayout {
    width: u32,
    height: u32,
    multiplier: u32,
    capacity: u32,
}

impl ABufferLayout {
    /// Sizes the buffers for a `width` x `height` target.
    ///
    /// `capacity = multiplier * width * height` must fit below [`SENTINEL`]
    /// so that every valid slot index differs from the end marker.
    pub fn new(width: u32, height: u32, multiplier: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height });
        }
        if multiplier == 0 {
            return Err(ConfigError::ZeroListMultiplier);
        }

        let pixels = width as u64 * height as u64;
        let capacity = pixels * multiplier as u64;
        if capacity >= SENTINEL as u64 {
            return Err(ConfigError::CapacityOverflow { multiplier, pixels });
        }

        Ok(Self {
            width,
            height,
            multiplier,
            capacity: capacity as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Number of fragment slots in the list buffer.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Row-major index of pixel `(x, y)` in the head map.
    pub fn pixel_index(&self, x: u32, y: u32) -> u32 {
        y * self.width + x
    }

    pub fn head_buffer_size(&self) -> u64 {
        self.pixel_count() as u64 * 4
    }

    /// Counter plus `capacity` entries.
    pub fn list_buffer_size(&self) -> u64 {
        LIST_HEADER_SIZE + self.capacity as u64 * FRAGMENT_ENTRY_SIZE
    }

    /// Rejects layouts whose list buffer exceeds a single storage binding.
    pub fn check_binding_limit(&self, limit: u64) -> Result<(), ConfigError> {
        let required = self.list_buffer_size();
        if required > limit {
            return Err(ConfigError::ListBufferTooLarge { required, limit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_twelve_bytes() {
        assert_eq!(FRAGMENT_ENTRY_SIZE, 12);
    }

    #[test]
    fn sizes_follow_resolution_and_multiplier() {
        let layout = ABufferLayout::new(64, 32, 4).unwrap();
        assert_eq!(layout.pixel_count(), 2048);
        assert_eq!(layout.capacity(), 8192);
        assert_eq!(layout.head_buffer_size(), 8192);
        assert_eq!(layout.list_buffer_size(), 4 + 8192 * 12);
        assert_eq!(layout.pixel_index(3, 2), 131);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert_eq!(
            ABufferLayout::new(0, 8, 4),
            Err(ConfigError::ZeroResolution { width: 0, height: 8 })
        );
        assert_eq!(ABufferLayout::new(8, 8, 0), Err(ConfigError::ZeroListMultiplier));
    }

    #[test]
    fn capacity_must_stay_below_sentinel() {
        let err = ABufferLayout::new(65536, 65536, 1).unwrap_err();
        assert_eq!(
            err,
            ConfigError::CapacityOverflow {
                multiplier: 1,
                pixels: 1 << 32
            }
        );
        assert!(ABufferLayout::new(1 << 15, 1 << 15, 3).is_ok());
    }

    #[test]
    fn binding_limit_is_enforced() {
        let layout = ABufferLayout::new(1920, 1080, 8).unwrap();
        assert!(layout.check_binding_limit(u64::MAX).is_ok());
        assert_eq!(
            layout.check_binding_limit(128 << 20),
            Err(ConfigError::ListBufferTooLarge {
                required: layout.list_buffer_size(),
                limit: 128 << 20
            })
        );
    }
}
