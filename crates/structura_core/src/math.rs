//! # Block Math
//!
//! Integer positions, axis-aligned orientations and affine transforms.
//!
//! Everything here is exact: rotations are signed permutation matrices, so a
//! transform composed from any number of node attachments maps block cells to
//! block cells without rounding drift.

use std::ops::{Add, Mul, Neg, Sub};

/// A block position (or integer offset) in world or local space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPos {
    /// X component.
    pub x: i32,
    /// Y component (up).
    pub y: i32,
    /// Z component.
    pub z: i32,
}

impl BlockPos {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Creates a position with all components equal.
    #[inline]
    #[must_use]
    pub const fn splat(v: i32) -> Self {
        Self::new(v, v, v)
    }

    /// Converts a sampled `Float3` to a block position (floored).
    #[inline]
    #[must_use]
    pub fn from_float3(v: [f32; 3]) -> Self {
        Self::new(v[0].floor() as i32, v[1].floor() as i32, v[2].floor() as i32)
    }

    /// Converts to a `Float3`.
    #[inline]
    #[must_use]
    pub fn to_float3(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    /// Component-wise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// True if every component is `<=` the other's.
    #[inline]
    #[must_use]
    pub const fn all_le(self, other: Self) -> bool {
        self.x <= other.x && self.y <= other.y && self.z <= other.z
    }

    /// Returns the components as an array.
    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from an array.
    #[inline]
    #[must_use]
    pub const fn from_array(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Product of the components (box volume for an extent).
    #[inline]
    #[must_use]
    pub const fn volume(self) -> i64 {
        self.x as i64 * self.y as i64 * self.z as i64
    }

    /// Cross product.
    #[inline]
    #[must_use]
    pub const fn cross(self, o: Self) -> Self {
        Self::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    /// Dot product.
    #[inline]
    #[must_use]
    pub const fn dot(self, o: Self) -> i32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }
}

impl Add for BlockPos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for BlockPos {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<i32> for BlockPos {
    type Output = Self;
    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// One of the six axis directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facing {
    /// +X
    PosX,
    /// -X
    NegX,
    /// +Y (up)
    PosY,
    /// -Y (down)
    NegY,
    /// +Z
    PosZ,
    /// -Z
    NegZ,
}

impl Facing {
    /// Unit vector of this direction.
    #[must_use]
    pub const fn vector(self) -> BlockPos {
        match self {
            Self::PosX => BlockPos::new(1, 0, 0),
            Self::NegX => BlockPos::new(-1, 0, 0),
            Self::PosY => BlockPos::new(0, 1, 0),
            Self::NegY => BlockPos::new(0, -1, 0),
            Self::PosZ => BlockPos::new(0, 0, 1),
            Self::NegZ => BlockPos::new(0, 0, -1),
        }
    }

    /// The opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::PosX => Self::NegX,
            Self::NegX => Self::PosX,
            Self::PosY => Self::NegY,
            Self::NegY => Self::PosY,
            Self::PosZ => Self::NegZ,
            Self::NegZ => Self::PosZ,
        }
    }

    /// Direction of a unit axis vector, if it is one.
    #[must_use]
    pub const fn from_vector(v: BlockPos) -> Option<Self> {
        match (v.x, v.y, v.z) {
            (1, 0, 0) => Some(Self::PosX),
            (-1, 0, 0) => Some(Self::NegX),
            (0, 1, 0) => Some(Self::PosY),
            (0, -1, 0) => Some(Self::NegY),
            (0, 0, 1) => Some(Self::PosZ),
            (0, 0, -1) => Some(Self::NegZ),
            _ => None,
        }
    }
}

/// Flags controlling how a node orientation is matched onto an anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OrientationFlags(u8);

impl OrientationFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The node sits on a block edge horizontally (pivot at the cell corner in X/Z).
    pub const HORIZONTAL_EDGE: Self = Self(1);
    /// The node sits on a block edge vertically (pivot at the cell corner in Y).
    pub const VERTICAL_EDGE: Self = Self(2);
    /// The attached fragment starts one block beyond the anchor.
    pub const ADJACENT: Self = Self(4);
    /// Mirror the fragment across its node's right axis.
    pub const MIRROR: Self = Self(8);

    /// True if all bits of `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Sets or clears `other`.
    #[inline]
    #[must_use]
    pub const fn with(self, other: Self, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | other.0)
        } else {
            Self(self.0 & !other.0)
        }
    }
}

/// Orientation of an attachment node: where it faces and which way is up.
///
/// `Unspecified` behaves as the canonical frame (forward `+Z`, up `+Y`) when
/// transforms are computed, but never generates rotation variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlockOrientation {
    /// No orientation given.
    #[default]
    Unspecified,
    /// A full frame.
    Facing {
        /// Direction the node faces.
        forward: Facing,
        /// Up direction, perpendicular to `forward`.
        up: Facing,
    },
}

impl BlockOrientation {
    /// The canonical frame.
    pub const CANONICAL: Self = Self::Facing {
        forward: Facing::PosZ,
        up: Facing::PosY,
    };

    /// Creates a specified orientation.
    #[must_use]
    pub const fn new(forward: Facing, up: Facing) -> Self {
        Self::Facing { forward, up }
    }

    /// True unless `Unspecified`.
    #[must_use]
    pub const fn is_specified(self) -> bool {
        matches!(self, Self::Facing { .. })
    }

    /// True if forward and up are perpendicular (or unspecified).
    #[must_use]
    pub const fn is_valid(self) -> bool {
        match self {
            Self::Unspecified => true,
            Self::Facing { forward, up } => forward.vector().dot(up.vector()) == 0,
        }
    }

    /// The orientation a node must have to join this one face to face.
    #[must_use]
    pub const fn adjacent(self) -> Self {
        match self {
            Self::Unspecified => Self::Unspecified,
            Self::Facing { forward, up } => Self::Facing {
                forward: forward.opposite(),
                up,
            },
        }
    }

    /// Rotates forward by 90 degrees around the up axis.
    #[must_use]
    pub fn next_up_variant(self) -> Self {
        match self {
            Self::Unspecified => Self::Unspecified,
            Self::Facing { forward, up } => {
                let rotated = up.vector().cross(forward.vector());
                Self::Facing {
                    forward: Facing::from_vector(rotated).unwrap_or(forward),
                    up,
                }
            }
        }
    }

    /// `(right, up, forward)` basis vectors, canonical frame when unspecified.
    fn basis(self) -> [BlockPos; 3] {
        let (forward, up) = match self {
            Self::Facing { forward, up } => (forward.vector(), up.vector()),
            Self::Unspecified => (Facing::PosZ.vector(), Facing::PosY.vector()),
        };
        [up.cross(forward), up, forward]
    }

    /// Transform that rotates a fragment so this orientation lines up with
    /// `target`.
    ///
    /// The pivot is the node cell itself; edge flags move the pivot to the cell
    /// corner on the flagged axes. `ADJACENT` moves the result one block
    /// against `target`'s forward direction.
    #[must_use]
    pub fn transform_to_match(self, target: Self, flags: OrientationFlags) -> BlockTransform {
        let src = self.basis();
        let dst = target.basis();

        // R = B(dst) * B(src)^T
        let mut rotation = [[0i32; 3]; 3];
        for (r, row) in rotation.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3)
                    .map(|k| dst[k].to_array()[r] * src[k].to_array()[c])
                    .sum();
            }
        }

        if flags.contains(OrientationFlags::MIRROR) {
            // R * M, M reflecting across the source right axis
            let right = src[0].to_array();
            let mut mirror = [[0i32; 3]; 3];
            for (r, row) in mirror.iter_mut().enumerate() {
                for (c, cell) in row.iter_mut().enumerate() {
                    *cell = i32::from(r == c) - 2 * right[r] * right[c];
                }
            }
            rotation = mat_mul(&rotation, &mirror);
        }

        let mut translation = BlockPos::ZERO;

        // Doubled half-block pivot offsets keep the arithmetic integral
        let half = BlockPos::new(
            i32::from(flags.contains(OrientationFlags::HORIZONTAL_EDGE)),
            i32::from(flags.contains(OrientationFlags::VERTICAL_EDGE)),
            i32::from(flags.contains(OrientationFlags::HORIZONTAL_EDGE)),
        );
        if half != BlockPos::ZERO {
            let moved = mat_apply(&rotation, half) - half;
            translation = BlockPos::new(
                moved.x.div_euclid(2),
                moved.y.div_euclid(2),
                moved.z.div_euclid(2),
            );
        }

        if flags.contains(OrientationFlags::ADJACENT) {
            translation = translation - dst[2];
        }

        BlockTransform {
            rotation,
            translation,
        }
    }
}

/// Integer affine transform: `p' = rotation * p + translation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockTransform {
    /// Row-major signed permutation matrix.
    pub rotation: [[i32; 3]; 3],
    /// Translation applied after rotation.
    pub translation: BlockPos,
}

impl Default for BlockTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BlockTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
        translation: BlockPos::ZERO,
    };

    /// Pure translation.
    #[must_use]
    pub const fn translation(offset: BlockPos) -> Self {
        Self {
            rotation: Self::IDENTITY.rotation,
            translation: offset,
        }
    }

    /// Maps a position.
    #[inline]
    #[must_use]
    pub fn apply(&self, p: BlockPos) -> BlockPos {
        mat_apply(&self.rotation, p) + self.translation
    }

    /// Maps a direction (rotation only).
    #[inline]
    #[must_use]
    pub fn apply_vector(&self, v: BlockPos) -> BlockPos {
        mat_apply(&self.rotation, v)
    }

    /// Where the local origin lands.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> BlockPos {
        self.translation
    }

    /// Inverse transform. Rotations here are orthogonal, so the inverse
    /// rotation is the transpose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let mut rotation = [[0i32; 3]; 3];
        for (r, row) in rotation.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = self.rotation[c][r];
            }
        }
        let translation = -mat_apply(&rotation, self.translation);
        Self {
            rotation,
            translation,
        }
    }
}

impl Mul for BlockTransform {
    type Output = Self;

    /// `(a * b).apply(p) == a.apply(b.apply(p))`
    fn mul(self, rhs: Self) -> Self {
        Self {
            rotation: mat_mul(&self.rotation, &rhs.rotation),
            translation: self.apply(rhs.translation),
        }
    }
}

fn mat_mul(a: &[[i32; 3]; 3], b: &[[i32; 3]; 3]) -> [[i32; 3]; 3] {
    let mut out = [[0i32; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

fn mat_apply(m: &[[i32; 3]; 3], p: BlockPos) -> BlockPos {
    let v = p.to_array();
    BlockPos::new(
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_composition() {
        let a = BlockTransform::translation(BlockPos::new(5, 0, 0));
        let rot = BlockOrientation::new(Facing::PosX, Facing::PosY)
            .transform_to_match(BlockOrientation::CANONICAL, OrientationFlags::NONE);
        let p = BlockPos::new(1, 2, 3);

        assert_eq!((a * rot).apply(p), a.apply(rot.apply(p)));
        assert_eq!((rot * a).apply(p), rot.apply(a.apply(p)));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = BlockOrientation::new(Facing::NegX, Facing::PosY)
            .transform_to_match(BlockOrientation::new(Facing::PosZ, Facing::PosY), OrientationFlags::MIRROR)
            * BlockTransform::translation(BlockPos::new(-3, 4, 7));

        for p in [BlockPos::ZERO, BlockPos::new(1, -2, 9), BlockPos::new(-15, 3, 2)] {
            assert_eq!(t.inverse().apply(t.apply(p)), p);
        }
    }

    #[test]
    fn test_match_maps_forward_and_up() {
        let src = BlockOrientation::new(Facing::PosX, Facing::PosY);
        let dst = BlockOrientation::new(Facing::NegZ, Facing::PosY);
        let t = src.transform_to_match(dst, OrientationFlags::NONE);

        assert_eq!(t.apply_vector(Facing::PosX.vector()), Facing::NegZ.vector());
        assert_eq!(t.apply_vector(Facing::PosY.vector()), Facing::PosY.vector());
        assert_eq!(t.origin(), BlockPos::ZERO);
    }

    #[test]
    fn test_up_variants_cycle() {
        let start = BlockOrientation::new(Facing::PosZ, Facing::PosY);
        let mut o = start;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(o);
            o = o.next_up_variant();
        }
        assert_eq!(o, start, "four quarter turns return to the start");
        for (i, a) in seen.iter().enumerate() {
            for b in &seen[i + 1..] {
                assert_ne!(a, b, "variants must be distinct");
            }
        }
    }

    #[test]
    fn test_adjacent_flag_steps_out() {
        let anchor = BlockOrientation::new(Facing::PosX, Facing::PosY);
        let node = BlockOrientation::new(Facing::NegX, Facing::PosY);
        let t = node.transform_to_match(anchor.adjacent(), OrientationFlags::ADJACENT);

        assert_eq!(t.origin(), BlockPos::new(1, 0, 0), "one block along the anchor's facing");
    }

    #[test]
    fn test_mirror_flips_right_axis() {
        let o = BlockOrientation::CANONICAL;
        let t = o.transform_to_match(o, OrientationFlags::MIRROR);

        assert_eq!(t.apply(BlockPos::new(2, 1, 3)), BlockPos::new(-2, 1, 3));
    }

    #[test]
    fn test_orientation_validity() {
        assert!(BlockOrientation::new(Facing::PosX, Facing::PosY).is_valid());
        assert!(!BlockOrientation::new(Facing::PosY, Facing::NegY).is_valid());
        assert!(BlockOrientation::Unspecified.is_valid());
    }
}
