use glam::Vec3;
use crate::{ OCTANT_CORNERS, TreeError };

/// An axis-aligned volume with half-open extent: a point is contained
/// when `min <= p < max` on every axis. Children of a volume share its
/// center as a common corner and exactly partition it.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Build a volume, rejecting any axis where `min >= max`.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self, TreeError> {
        let aabb = Self { min, max };
        if aabb.is_valid() {
            Ok(aabb)
        } else {
            Err(TreeError::InvalidBounds { min, max })
        }
    }

    /// Cubic volume with `origin` as its lower corner.
    pub fn cube(origin: Vec3, size: f32) -> Result<Self, TreeError> {
        Self::new(origin, origin + Vec3::splat(size))
    }

    pub fn is_valid(&self) -> bool {
        self.min.cmplt(self.max).all()
    }

    /// Half-open containment test: `min <= p < max` per axis.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmplt(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// 3-bit octant code for a contained point: bit 0 set when
    /// `x >= mid_x`, bit 1 for y, bit 2 for z. A point exactly on a
    /// midpoint always routes to the upper octant.
    pub fn child_index(&self, point: Vec3) -> usize {
        let mid = self.center();
        usize::from(point.x >= mid.x)
            | usize::from(point.y >= mid.y) << 1
            | usize::from(point.z >= mid.z) << 2
    }

    /// Inverse of [`child_index`](Self::child_index): the child volume
    /// at the given slot. Child corners reuse the parent's `min`,
    /// `center` and `max` coordinates exactly, so
    /// `child_bounds(child_index(p)).contains(p)` holds for every
    /// contained point with no rounding drift.
    pub fn child_bounds(&self, index: usize) -> Aabb {
        let mid = self.center();
        let upper = OCTANT_CORNERS[index].cmpgt(Vec3::ZERO);
        Aabb {
            min: Vec3::select(upper, mid, self.min),
            max: Vec3::select(upper, self.max, mid),
        }
    }

    /// All 8 child volumes in slot order.
    pub fn subdivide(&self) -> [Aabb; 8] {
        std::array::from_fn(|index| self.child_bounds(index))
    }
}

#[cfg(test)]
use glam::vec3;
#[cfg(test)]
use rand::{ rngs::StdRng, Rng, SeedableRng };

#[test]
fn contains_is_half_open() {
    let aabb = Aabb::cube(Vec3::ZERO, 10.0).unwrap();
    assert!(aabb.contains(Vec3::ZERO));
    assert!(aabb.contains(vec3(9.999, 0.0, 5.0)));
    assert!(!aabb.contains(vec3(10.0, 5.0, 5.0)));
    assert!(!aabb.contains(Vec3::splat(10.0)));
    assert!(!aabb.contains(vec3(-0.001, 5.0, 5.0)));
}

#[test]
fn rejects_inverted_or_flat_bounds() {
    assert!(Aabb::new(Vec3::ONE, Vec3::ZERO).is_err());
    assert!(Aabb::new(Vec3::ZERO, vec3(1.0, 0.0, 1.0)).is_err());
    assert!(Aabb::new(Vec3::ZERO, Vec3::ONE).is_ok());
}

#[test]
fn midpoint_routes_to_upper_octant() {
    let aabb = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    // deterministic on every evaluation
    for _ in 0..32 {
        assert_eq!(aabb.child_index(aabb.center()), 7);
    }
    assert_eq!(aabb.child_index(vec3(50.0, 0.0, 0.0)), 1);
    assert_eq!(aabb.child_index(vec3(0.0, 50.0, 0.0)), 2);
    assert_eq!(aabb.child_index(vec3(0.0, 0.0, 50.0)), 4);
}

#[test]
fn child_bounds_inverts_child_index() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..1000 {
        let origin = vec3(
            rng.random_range(-100.0..100.0),
            rng.random_range(-100.0..100.0),
            rng.random_range(-100.0..100.0),
        );
        let size = rng.random_range(0.5..50.0);
        let aabb = Aabb::cube(origin, size).unwrap();
        let point = vec3(
            rng.random_range(aabb.min.x..aabb.max.x),
            rng.random_range(aabb.min.y..aabb.max.y),
            rng.random_range(aabb.min.z..aabb.max.z),
        );
        let slot = aabb.child_index(point);
        assert!(aabb.child_bounds(slot).contains(point), "point {point} escaped slot {slot}");
    }
}

#[test]
fn children_partition_parent() {
    let aabb = Aabb::cube(Vec3::splat(-8.0), 16.0).unwrap();
    let children = aabb.subdivide();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..1000 {
        let point = vec3(
            rng.random_range(aabb.min.x..aabb.max.x),
            rng.random_range(aabb.min.y..aabb.max.y),
            rng.random_range(aabb.min.z..aabb.max.z),
        );
        let owners = children.iter().filter(|child| child.contains(point)).count();
        assert_eq!(owners, 1, "point {point} owned by {owners} children");
    }
    // the shared center corner belongs to the upper octant alone
    let owners = children.iter().filter(|child| child.contains(aabb.center())).count();
    assert_eq!(owners, 1);
    assert!(children[7].contains(aabb.center()));
}
