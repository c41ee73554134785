#![warn(unused_extern_crates)]

//! Content-addressable octree: recursive spatial subdivision with
//! merkle-style digest propagation, so every region of 3-D space is
//! identified by a hash and any tampering with stored points is
//! detectable at the root digest.

use glam::{ Vec3, vec3 };

pub use glam;

/// Unit offsets of the 8 octant corners, in slot order.
///
/// Bit 0 of the slot index selects the upper half along x,
/// bit 1 along y, bit 2 along z.
pub const OCTANT_CORNERS: [Vec3; 8] = [
    Vec3::ZERO,
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(1.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0),
    vec3(1.0, 0.0, 1.0),
    vec3(0.0, 1.0, 1.0),
    Vec3::ONE,
];

mod bounds;
pub use bounds::*;

mod error;
pub use error::*;

mod hash;
pub use hash::*;

mod node;
pub use node::*;

mod tree;
pub use tree::*;
