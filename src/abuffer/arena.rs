//! Host-side fragment arena with the same append protocol as the writer.
//!
//! The arena is a flat array of entries plus one head per pixel. Appending is
//! lock-free and may be called from any number of threads at once:
//!
//! 1. `slot = counter.fetch_add(1)`
//! 2. if `slot >= capacity` the fragment is dropped
//! 3. otherwise `link = heads[pixel].swap(slot)` and the entry is written
//!
//! Each pixel therefore owns a singly linked, most-recent-first chain of
//! slot indices ending in [`SENTINEL`]. Nothing is ever freed individually;
//! [`reset`](FragmentArena::reset) empties the whole arena at once.
//!
//! This mirrors `shaders/abuffer_write.wgsl` and `shaders/abuffer_resolve.wgsl`
//! and exists so the protocol can be exercised without a device.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec4;

use super::composite::{MAX_FRAGMENTS_PER_PIXEL, blend_sorted, insert_nearest};
use super::layout::{ABufferLayout, FragmentEntry, SENTINEL};

#[derive(Debug)]
struct AtomicEntry {
    depth: AtomicU32,
    color: AtomicU32,
    link: AtomicU32,
}

impl AtomicEntry {
    fn empty() -> Self {
        Self {
            depth: AtomicU32::new(0),
            color: AtomicU32::new(0),
            link: AtomicU32::new(SENTINEL),
        }
    }

    fn load(&self) -> FragmentEntry {
        FragmentEntry {
            depth: f32::from_bits(self.depth.load(Ordering::Acquire)),
            color: self.color.load(Ordering::Acquire),
            link: self.link.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug)]
pub struct FragmentArena {
    layout: ABufferLayout,
    counter: AtomicU32,
    heads: Vec<AtomicU32>,
    entries: Vec<AtomicEntry>,
}

impl FragmentArena {
    pub fn new(layout: ABufferLayout) -> Self {
        Self {
            layout,
            counter: AtomicU32::new(0),
            heads: (0..layout.pixel_count())
                .map(|_| AtomicU32::new(SENTINEL))
                .collect(),
            entries: (0..layout.capacity()).map(|_| AtomicEntry::empty()).collect(),
        }
    }

    pub fn layout(&self) -> &ABufferLayout {
        &self.layout
    }

    /// Appends a fragment to `pixel`'s chain.
    ///
    /// Returns the slot used, or `None` when the fragment was dropped: either
    /// the arena is full or `pixel` lies outside the layout. Out-of-range
    /// pixels are rejected before a slot is taken, as in the writer shader.
    pub fn append(&self, pixel: u32, depth: f32, color: u32) -> Option<u32> {
        if pixel >= self.layout.pixel_count() {
            return None;
        }
        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        if slot >= self.layout.capacity() {
            return None;
        }

        let link = self.heads[pixel as usize].swap(slot, Ordering::AcqRel);
        let entry = &self.entries[slot as usize];
        entry.depth.store(depth.to_bits(), Ordering::Release);
        entry.color.store(color, Ordering::Release);
        entry.link.store(link, Ordering::Release);
        Some(slot)
    }

    /// Clears every head to [`SENTINEL`] and the counter to zero.
    pub fn reset(&mut self) {
        for head in &mut self.heads {
            *head.get_mut() = SENTINEL;
        }
        *self.counter.get_mut() = 0;
    }

    /// Raw counter value; exceeds capacity once fragments were dropped.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Number of stored fragments.
    pub fn len(&self) -> u32 {
        self.counter().min(self.layout.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.counter() == 0
    }

    /// Number of fragments dropped for lack of space.
    pub fn dropped(&self) -> u32 {
        self.counter().saturating_sub(self.layout.capacity())
    }

    /// [`SENTINEL`] for empty and out-of-range pixels.
    pub fn head(&self, pixel: u32) -> u32 {
        self.heads
            .get(pixel as usize)
            .map_or(SENTINEL, |head| head.load(Ordering::Acquire))
    }

    /// Walks `pixel`'s chain from the most recent fragment.
    pub fn chain(&self, pixel: u32) -> impl Iterator<Item = FragmentEntry> + '_ {
        let mut next = self.head(pixel);
        std::iter::from_fn(move || {
            if next == SENTINEL {
                return None;
            }
            let entry = self.entries.get(next as usize)?.load();
            next = entry.link;
            Some(entry)
        })
    }

    /// Resolves one pixel the way the resolver shader does.
    pub fn resolve_pixel(&self, pixel: u32) -> Vec4 {
        let mut kept = Vec::with_capacity(MAX_FRAGMENTS_PER_PIXEL);
        for fragment in self.chain(pixel) {
            insert_nearest(&mut kept, fragment);
        }
        blend_sorted(&kept)
    }
}
