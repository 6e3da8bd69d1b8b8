//! Per-pixel sort and blend shared by the resolver and its host-side model.
//!
//! The WGSL resolver in `shaders/abuffer_resolve.wgsl` performs exactly the
//! steps below; keeping a host copy lets the blending rules be tested without
//! a device.

use glam::Vec4;

use super::layout::FragmentEntry;

/// Most fragments the resolver blends for a single pixel.
///
/// When a pixel holds more, the nearest ones are kept and the farthest are
/// dropped, whatever order they were appended in.
pub const MAX_FRAGMENTS_PER_PIXEL: usize = 16;

/// `pack4x8unorm`: each channel clamped to `[0, 1]`, red in the low byte.
pub fn pack_color(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    (c.x as u32) | (c.y as u32) << 8 | (c.z as u32) << 16 | (c.w as u32) << 24
}

/// `unpack4x8unorm`, the inverse of [`pack_color`].
pub fn unpack_color(packed: u32) -> Vec4 {
    Vec4::new(
        (packed & 0xFF) as f32,
        (packed >> 8 & 0xFF) as f32,
        (packed >> 16 & 0xFF) as f32,
        (packed >> 24) as f32,
    ) / 255.0
}

/// Back-to-front order: farther (larger depth) first, ties broken on color.
///
/// The tie-break makes the result independent of append order even for
/// coplanar fragments.
fn draws_before(a: &FragmentEntry, b: &FragmentEntry) -> bool {
    a.depth > b.depth || (a.depth == b.depth && a.color > b.color)
}

/// Sorts `fragments` back to front with the resolver's insertion sort.
pub fn sort_back_to_front(fragments: &mut [FragmentEntry]) {
    for i in 1..fragments.len() {
        let key = fragments[i];
        let mut j = i;
        while j > 0 && draws_before(&key, &fragments[j - 1]) {
            fragments[j] = fragments[j - 1];
            j -= 1;
        }
        fragments[j] = key;
    }
}

/// Adds `fragment` to `kept`, a back-to-front list of at most
/// [`MAX_FRAGMENTS_PER_PIXEL`] entries.
///
/// A full list evicts its farthest entry when `fragment` is nearer and
/// otherwise ignores `fragment`, so the kept set is the nearest fragments of
/// the whole chain.
pub fn insert_nearest(kept: &mut Vec<FragmentEntry>, fragment: FragmentEntry) {
    if kept.len() >= MAX_FRAGMENTS_PER_PIXEL {
        if !draws_before(&kept[0], &fragment) {
            return;
        }
        kept.remove(0);
    }
    let at = kept.partition_point(|k| draws_before(k, &fragment));
    kept.insert(at, fragment);
}

/// Blends already sorted fragments with src-over, starting from transparent.
///
/// The result is premultiplied: `rgb` already carries its coverage, so it is
/// layered over an opaque target with `dst = src + dst * (1 - src.a)`.
pub fn blend_sorted(fragments: &[FragmentEntry]) -> Vec4 {
    fragments.iter().fold(Vec4::ZERO, |acc, fragment| {
        let c = unpack_color(fragment.color);
        let rgb = c.truncate() * c.w + acc.truncate() * (1.0 - c.w);
        rgb.extend(c.w + acc.w * (1.0 - c.w))
    })
}

/// Sorts then blends; an empty slice gives `(0, 0, 0, 0)`.
pub fn composite(fragments: &mut [FragmentEntry]) -> Vec4 {
    sort_back_to_front(fragments);
    blend_sorted(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abuffer::layout::SENTINEL;

    const EPS: f32 = 1e-5;

    fn fragment(depth: f32, color: Vec4) -> FragmentEntry {
        FragmentEntry {
            depth,
            color: pack_color(color),
            link: SENTINEL,
        }
    }

    /// Heap's algorithm over every ordering of `items`.
    fn permutations<T: Copy>(items: &[T]) -> Vec<Vec<T>> {
        let mut items = items.to_vec();
        let mut out = vec![items.clone()];
        let mut c = vec![0; items.len()];
        let mut i = 0;
        while i < items.len() {
            if c[i] < i {
                if i % 2 == 0 {
                    items.swap(0, i);
                } else {
                    items.swap(c[i], i);
                }
                out.push(items.clone());
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
        out
    }

    #[test]
    fn pack_matches_unorm_layout() {
        assert_eq!(pack_color(Vec4::new(1.0, 0.0, 0.0, 0.0)), 0x0000_00FF);
        assert_eq!(pack_color(Vec4::new(0.0, 0.0, 0.0, 1.0)), 0xFF00_0000);
        assert_eq!(pack_color(Vec4::splat(2.0)), 0xFFFF_FFFF);
        assert_eq!(pack_color(Vec4::splat(-1.0)), 0);

        let c = unpack_color(pack_color(Vec4::new(0.2, 0.4, 0.6, 0.8)));
        assert!((c - Vec4::new(0.2, 0.4, 0.6, 0.8)).abs().max_element() < 0.5 / 255.0 + EPS);
    }

    #[test]
    fn empty_pixel_is_transparent() {
        assert_eq!(composite(&mut []), Vec4::ZERO);
    }

    #[test]
    fn sorts_far_to_near() {
        let mut fragments = vec![
            fragment(0.2, Vec4::ONE),
            fragment(0.9, Vec4::ONE),
            fragment(0.5, Vec4::ONE),
        ];
        sort_back_to_front(&mut fragments);
        let depths: Vec<f32> = fragments.iter().map(|f| f.depth).collect();
        assert_eq!(depths, vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn nearest_fragment_lands_on_top() {
        let red = fragment(0.8, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let blue_half = fragment(0.3, Vec4::new(0.0, 0.0, 1.0, 128.0 / 255.0));
        let a = 128.0 / 255.0;

        let result = composite(&mut [blue_half, red]);
        let expected = Vec4::new(1.0 - a, 0.0, a, 1.0);
        assert!((result - expected).abs().max_element() < EPS);
    }

    #[test]
    fn single_fragment_is_premultiplied() {
        let result = composite(&mut [fragment(0.5, Vec4::new(1.0, 1.0, 0.0, 0.4))]);
        let a = unpack_color(pack_color(Vec4::splat(0.4))).w;
        assert!((result - Vec4::new(a, a, 0.0, a)).abs().max_element() < EPS);
    }

    #[test]
    fn full_list_keeps_the_nearest_fragments() {
        let mut kept = Vec::new();
        for i in 0..MAX_FRAGMENTS_PER_PIXEL + 8 {
            insert_nearest(&mut kept, fragment(i as f32 / 100.0, Vec4::ONE));
        }
        assert_eq!(kept.len(), MAX_FRAGMENTS_PER_PIXEL);

        let depths: Vec<f32> = kept.iter().map(|f| f.depth).collect();
        let expected: Vec<f32> = (0..MAX_FRAGMENTS_PER_PIXEL).rev().map(|i| i as f32 / 100.0).collect();
        assert_eq!(depths, expected);

        // A farther fragment than everything kept changes nothing.
        insert_nearest(&mut kept, fragment(0.9, Vec4::ONE));
        assert_eq!(kept.iter().map(|f| f.depth).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn insertion_matches_sorting() {
        let fragments = [
            fragment(0.71, Vec4::new(0.9, 0.1, 0.1, 0.5)),
            fragment(0.12, Vec4::new(0.1, 0.8, 0.2, 0.3)),
            fragment(0.45, Vec4::new(0.2, 0.3, 0.9, 0.6)),
            fragment(0.45, Vec4::new(0.7, 0.7, 0.1, 0.25)),
        ];
        let mut kept = Vec::new();
        for f in fragments {
            insert_nearest(&mut kept, f);
        }
        let mut sorted = fragments;
        sort_back_to_front(&mut sorted);
        assert_eq!(kept, sorted.to_vec());
    }

    #[test]
    fn result_is_independent_of_append_order() {
        let fragments = [
            fragment(0.71, Vec4::new(0.9, 0.1, 0.1, 0.5)),
            fragment(0.12, Vec4::new(0.1, 0.8, 0.2, 0.3)),
            fragment(0.45, Vec4::new(0.2, 0.3, 0.9, 0.6)),
            fragment(0.45, Vec4::new(0.7, 0.7, 0.1, 0.25)),
            fragment(0.99, Vec4::new(1.0, 1.0, 1.0, 0.9)),
            fragment(0.33, Vec4::new(0.0, 0.5, 0.5, 0.45)),
        ];
        let reference = composite(&mut fragments.clone());

        let orderings = permutations(&fragments);
        assert_eq!(orderings.len(), 720);
        for mut ordering in orderings {
            let result = composite(&mut ordering);
            assert!((result - reference).abs().max_element() < EPS);
        }
    }
}
