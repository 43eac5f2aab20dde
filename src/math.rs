//! Minimal integer 3-vector.
//!
//! Kept deliberately tiny -- this crate has no need for a full vector-math
//! library. A `Copy` struct with named fields and `const fn` constructors,
//! not a newtype wrapper over a tuple.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IVec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IVec3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn add(self, other: IVec3) -> IVec3 {
        IVec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

/// Floor division: result always lands in `[0, n)` for the paired
/// [`floor_mod`], even for negative coordinates (mathematical modulo, not
/// C's truncating remainder).
#[inline]
pub const fn floor_div(v: i32, n: i32) -> i32 {
    v.div_euclid(n)
}

#[inline]
pub const fn floor_mod(v: i32, n: i32) -> i32 {
    v.rem_euclid(n)
}
