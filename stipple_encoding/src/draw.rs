// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use peniko::color::{AlphaColor, ColorSpace, PremulColor, Srgb};

/// Draw tag representation.
#[derive(Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawTag(pub u32);

impl DrawTag {
    /// No operation.
    pub const NOP: Self = Self(0);

    /// Solid color fill or stroke.
    pub const COLOR: Self = Self(0x44);

    /// Returns the size of the info stream entry (in u32s) used by this tag.
    pub const fn info_size(self) -> u32 {
        (self.0 >> 6) & 0xf
    }
}

/// Draw data for a solid color.
///
/// The packed word is little endian RGBA with premultiplied alpha in
/// the low byte, matching what the fine stage's `unpack4x8unorm(..).wzyx`
/// swizzle expects.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct DrawColor {
    pub rgba: u32,
}

impl<CS: ColorSpace> From<AlphaColor<CS>> for DrawColor {
    fn from(color: AlphaColor<CS>) -> Self {
        Self {
            rgba: color.convert::<Srgb>().premultiply().to_rgba8().to_u32(),
        }
    }
}

impl<CS: ColorSpace> From<PremulColor<CS>> for DrawColor {
    fn from(color: PremulColor<CS>) -> Self {
        Self {
            rgba: color.convert::<Srgb>().to_rgba8().to_u32(),
        }
    }
}

/// Running totals accumulated over the draw tag stream.
///
/// The exclusive prefix up to a draw object locates its path and its
/// offsets into the draw data and info streams.
#[derive(Copy, Clone, PartialEq, Eq, Pod, Zeroable, Default, Debug)]
#[repr(C)]
pub struct DrawMonoid {
    /// The number of paths preceding this draw object.
    pub path_ix: u32,
    /// The number of clip operations preceding this draw object. Clips
    /// are not rendered by these stages; the field is carried so the
    /// stream layout matches its producer.
    pub clip_ix: u32,
    /// The offset of the encoded draw object in the scene (u32s).
    pub scene_offset: u32,
    /// The offset of the associated info.
    pub info_offset: u32,
}

impl DrawMonoid {
    /// The contribution a single tag makes to the stream prefix: one
    /// path for anything that draws, plus the tag's encoded draw-data
    /// and info footprints.
    pub fn new(tag: DrawTag) -> Self {
        Self {
            path_ix: (tag != DrawTag::NOP) as u32,
            clip_ix: tag.0 & 1,
            scene_offset: (tag.0 >> 2) & 0x7,
            info_offset: tag.info_size(),
        }
    }

    /// Appends a later contribution to this prefix. Associative, with
    /// the zero value as identity, so prefixes can be reduced in any
    /// grouping on the way to the per-object exclusive scan.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            path_ix: self.path_ix + other.path_ix,
            clip_ix: self.clip_ix + other.clip_ix,
            scene_offset: self.scene_offset + other.scene_offset,
            info_offset: self.info_offset + other.info_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DrawColor, DrawMonoid, DrawTag};
    use peniko::Color;

    #[test]
    fn color_tag_field_sizes() {
        // One rgba word of draw data, one linewidth word of info.
        let m = DrawMonoid::new(DrawTag::COLOR);
        assert_eq!(m.path_ix, 1);
        assert_eq!(m.clip_ix, 0);
        assert_eq!(m.scene_offset, 1);
        assert_eq!(m.info_offset, 1);
        assert_eq!(DrawTag::COLOR.info_size(), 1);
    }

    #[test]
    fn nop_is_identity() {
        let m = DrawMonoid::new(DrawTag::NOP);
        assert_eq!(m, DrawMonoid::default());
        let color = DrawMonoid::new(DrawTag::COLOR);
        assert_eq!(color.combine(&m), color);
    }

    #[test]
    fn combine_accumulates_offsets() {
        let one = DrawMonoid::new(DrawTag::COLOR);
        let two = one.combine(&one);
        assert_eq!(two.path_ix, 2);
        assert_eq!(two.scene_offset, 2);
        assert_eq!(two.info_offset, 2);
    }

    #[test]
    fn pack_opaque_colors() {
        assert_eq!(DrawColor::from(Color::WHITE).rgba, 0xffff_ffff);
        assert_eq!(DrawColor::from(Color::new([1.0, 0.0, 0.0, 1.0])).rgba, 0xff00_00ff);
    }

    #[test]
    fn pack_premultiplies_alpha() {
        let half_red = DrawColor::from(Color::new([1.0, 0.0, 0.0, 0.5]));
        let r = half_red.rgba >> 24;
        let a = half_red.rgba & 0xff;
        assert_eq!(a, 128);
        assert_eq!(r, 128);
    }
}
