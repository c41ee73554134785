use glam::Vec3;
use crate::{
    Aabb, Blake3Hasher, Digest, Hasher, InsertOutcome, Node, NodeEntry, Point, TreeError,
};

/// Hard subdivision ceiling. Past roughly 2^-32 of the root extent,
/// f32 midpoints stop separating distinct positions, so deeper
/// configured limits are clamped here.
pub const MAX_DEPTH: u8 = 32;

/// Subdivision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Depth at which subdivision stops and terminal nodes cluster
    /// instead. Clamped to [`MAX_DEPTH`].
    pub max_depth: u8,
    /// Bound on the terminal point list. `None` disables the cluster
    /// fallback entirely: points that collide past `max_depth` then
    /// fail with [`TreeError::CapacityExceeded`]. Values below 2 are
    /// raised to 2, the minimum a collision needs.
    pub cluster_capacity: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            cluster_capacity: Some(8),
        }
    }
}

impl TreeConfig {
    fn validated(self) -> Self {
        Self {
            max_depth: self.max_depth.min(MAX_DEPTH),
            cluster_capacity: self.cluster_capacity.map(|capacity| capacity.max(2)),
        }
    }
}

/// The index over a domain-spanning volume: owns the root node and
/// orchestrates insert, lookup and integrity verification.
///
/// The root digest is a content-addressable identifier of the whole
/// dataset: it changes exactly when the multiset of (position, payload)
/// pairs changes.
///
/// Single-threaded by design. An insert mutates and rehashes one
/// root-to-leaf path, so concurrent use requires per-node exclusive
/// write locking (or single-writer at the root); inserts whose paths
/// share no prefix could then proceed independently.
#[derive(Debug)]
pub struct MerkleOctree<H: Hasher = Blake3Hasher> {
    root: Node,
    bounds: Aabb,
    config: TreeConfig,
    hasher: H,
}

impl MerkleOctree<Blake3Hasher> {
    /// Empty tree over `bounds` with the default BLAKE3 hasher.
    pub fn new(bounds: Aabb, config: TreeConfig) -> Result<Self, TreeError> {
        Self::with_hasher(bounds, config, Blake3Hasher)
    }
}

impl<H: Hasher> MerkleOctree<H> {
    /// Empty tree over `bounds` with a custom digest function.
    pub fn with_hasher(bounds: Aabb, config: TreeConfig, hasher: H) -> Result<Self, TreeError> {
        if !bounds.is_valid() {
            return Err(TreeError::InvalidBounds { min: bounds.min, max: bounds.max });
        }
        Ok(Self {
            root: Node::empty(),
            bounds,
            config: config.validated(),
            hasher,
        })
    }

    /// Insert a point, updating every digest on its root-to-leaf path.
    ///
    /// All-or-nothing: on error nothing was mutated. Re-inserting an
    /// identical point is detected and reported as
    /// [`InsertOutcome::Duplicate`] with digests and node counts
    /// unchanged.
    pub fn insert(&mut self, point: Point) -> Result<InsertOutcome, TreeError> {
        if !self.bounds.contains(point.position) {
            return Err(TreeError::OutOfBounds { position: point.position });
        }
        self.root.insert(point, self.bounds, 0, self.config, &self.hasher)
    }

    /// The stored point at `position`.
    pub fn locate(&self, position: Vec3) -> Result<&Point, TreeError> {
        if !self.bounds.contains(position) {
            return Err(TreeError::OutOfBounds { position });
        }
        self.root
            .locate(position, self.bounds)
            .ok_or(TreeError::NotFound { position })
    }

    /// Current top hash: the content-addressable identifier of the
    /// whole dataset. [`Digest::EMPTY`] for an empty tree.
    pub fn root_digest(&self) -> Digest {
        self.root.hash
    }

    /// Edges traversed from the root to the node holding `position`.
    pub fn depth_of(&self, position: Vec3) -> Result<u8, TreeError> {
        if !self.bounds.contains(position) {
            return Err(TreeError::OutOfBounds { position });
        }
        self.root
            .depth_of(position, self.bounds)
            .ok_or(TreeError::NotFound { position })
    }

    /// Re-walk the path to `position`, recomputing digests and checking
    /// them against stored values and against `expected` (the caller's
    /// record of the payload digest). A [`TreeError::HashMismatch`]
    /// signals possible corruption and names the shallowest divergent
    /// node.
    pub fn verify(&self, position: Vec3, expected: Digest) -> Result<(), TreeError> {
        if !self.bounds.contains(position) {
            return Err(TreeError::OutOfBounds { position });
        }
        self.root.verify(position, expected, self.bounds, 0, &self.hasher)
    }

    /// Full pre-order enumeration of (bounds, depth, hash, occupants),
    /// for external renderers and probes.
    pub fn nodes(&self) -> Vec<NodeEntry<'_>> {
        let mut out = Vec::new();
        self.root.collect_entries(self.bounds, 0, &mut out);
        out
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    pub fn point_count(&self) -> usize {
        self.root.point_count()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }
}

#[cfg(test)]
use glam::vec3;
#[cfg(test)]
use rand::{ rngs::StdRng, seq::SliceRandom, Rng, SeedableRng };

#[cfg(test)]
fn hundred_cube() -> Aabb {
    Aabb::cube(Vec3::ZERO, 100.0).unwrap()
}

#[test]
fn insert_then_locate_round_trips() {
    let mut tree = MerkleOctree::new(hundred_cube(), TreeConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut inserted = Vec::new();
    for i in 0..500 {
        let position = vec3(
            rng.random_range(0.0..100.0),
            rng.random_range(0.0..100.0),
            rng.random_range(0.0..100.0),
        );
        let payload = format!("payload-{i}").into_bytes();
        tree.insert(Point::new(position, payload.clone())).unwrap();
        inserted.push((position, payload));
    }
    for (position, payload) in &inserted {
        assert_eq!(&tree.locate(*position).unwrap().payload, payload);
    }
    assert_eq!(tree.point_count(), 500);
}

#[test]
fn duplicate_insert_is_a_no_op() {
    let mut tree = MerkleOctree::new(hundred_cube(), TreeConfig::default()).unwrap();
    let point = Point::new(vec3(5.0, 6.0, 7.0), b"A".to_vec());
    assert_eq!(tree.insert(point.clone()).unwrap(), InsertOutcome::Inserted);

    let digest = tree.root_digest();
    let nodes = tree.node_count();
    assert_eq!(tree.insert(point).unwrap(), InsertOutcome::Duplicate);
    assert_eq!(tree.root_digest(), digest);
    assert_eq!(tree.node_count(), nodes);
    assert_eq!(tree.point_count(), 1);
}

#[test]
fn duplicate_insert_into_a_cluster_is_a_no_op() {
    let config = TreeConfig { max_depth: 2, cluster_capacity: Some(4) };
    let mut tree = MerkleOctree::new(hundred_cube(), config).unwrap();
    let pos = vec3(1.0, 1.0, 1.0);
    tree.insert(Point::new(pos, b"A".to_vec())).unwrap();
    tree.insert(Point::new(pos, b"B".to_vec())).unwrap();

    let digest = tree.root_digest();
    assert_eq!(
        tree.insert(Point::new(pos, b"B".to_vec())).unwrap(),
        InsertOutcome::Duplicate
    );
    assert_eq!(tree.root_digest(), digest);
    assert_eq!(tree.point_count(), 2);
}

#[test]
fn root_digest_tracks_content() {
    let mut tree = MerkleOctree::new(hundred_cube(), TreeConfig::default()).unwrap();
    assert_eq!(tree.root_digest(), Digest::EMPTY);

    tree.insert(Point::new(vec3(1.0, 1.0, 1.0), b"A".to_vec())).unwrap();
    let after_a = tree.root_digest();
    assert_ne!(after_a, Digest::EMPTY);
    // single occupied leaf at the root: top hash is the payload hash
    assert_eq!(after_a, Blake3Hasher.digest(b"A"));

    tree.insert(Point::new(vec3(80.0, 20.0, 60.0), b"B".to_vec())).unwrap();
    assert_ne!(tree.root_digest(), after_a);
}

#[test]
fn sibling_octants_hash_into_fixed_slots() {
    let bounds = hundred_cube();
    let mut tree = MerkleOctree::new(bounds, TreeConfig::default()).unwrap();
    let a = vec3(1.0, 1.0, 1.0);
    let b = vec3(99.0, 99.0, 99.0);
    tree.insert(Point::new(a, b"A".to_vec())).unwrap();
    tree.insert(Point::new(b, b"B".to_vec())).unwrap();

    // sibling leaves one level below the root, at slots 0 and 7
    assert_eq!(bounds.child_index(a), 0);
    assert_eq!(bounds.child_index(b), 7);
    assert_eq!(tree.depth_of(a).unwrap(), 1);
    assert_eq!(tree.depth_of(b).unwrap(), 1);
    assert_eq!(tree.node_count(), 3);

    // recompute the expectation with raw blake3: H(A) at slot 0, the
    // empty sentinel at slots 1..=6, H(B) at slot 7
    let mut buf = [0u8; 8 * 32];
    buf[..32].copy_from_slice(blake3::hash(b"A").as_bytes());
    buf[224..].copy_from_slice(blake3::hash(b"B").as_bytes());
    let expected = Digest(*blake3::hash(&buf).as_bytes());
    assert_eq!(tree.root_digest(), expected);
}

#[test]
fn bounded_occupancy_under_shallow_limits() {
    // depth 4 over [0,100)^3 gives 16 terminal cells per axis; place
    // 1000 points in distinct random cells with interior jitter
    let config = TreeConfig { max_depth: 4, cluster_capacity: Some(4) };
    let mut tree = MerkleOctree::new(hundred_cube(), config).unwrap();
    let mut rng = StdRng::seed_from_u64(1000);

    let mut cells = Vec::with_capacity(16 * 16 * 16);
    for x in 0..16u32 {
        for y in 0..16u32 {
            for z in 0..16u32 {
                cells.push((x, y, z));
            }
        }
    }
    cells.shuffle(&mut rng);
    cells.truncate(1000);

    let cell_size = 100.0 / 16.0;
    for (i, (x, y, z)) in cells.into_iter().enumerate() {
        let position = vec3(
            (x as f32 + rng.random_range(0.1..0.9)) * cell_size,
            (y as f32 + rng.random_range(0.1..0.9)) * cell_size,
            (z as f32 + rng.random_range(0.1..0.9)) * cell_size,
        );
        tree.insert(Point::new(position, i.to_le_bytes().to_vec())).unwrap();
    }

    assert_eq!(tree.point_count(), 1000);
    let entries = tree.nodes();
    assert_eq!(entries[0].depth, 0);
    assert_eq!(entries[0].hash, tree.root_digest());
    for entry in &entries {
        assert!(entry.depth <= 4, "node at depth {} exceeds the cap", entry.depth);
        assert!(entry.points.len() <= 4, "terminal holds {} points", entry.points.len());
    }
}

#[test]
fn verify_accepts_the_stored_payload_digest() {
    let mut tree = MerkleOctree::new(hundred_cube(), TreeConfig::default()).unwrap();
    let pos = vec3(12.0, 34.0, 56.0);
    tree.insert(Point::new(pos, b"genuine".to_vec())).unwrap();
    tree.insert(Point::new(vec3(90.0, 90.0, 90.0), b"other".to_vec())).unwrap();

    tree.verify(pos, Blake3Hasher.digest(b"genuine")).unwrap();

    let err = tree.verify(pos, Blake3Hasher.digest(b"genuinf")).unwrap_err();
    assert!(matches!(err, TreeError::HashMismatch { .. }));

    let err = tree.verify(vec3(50.0, 50.0, 50.0), Digest::EMPTY).unwrap_err();
    assert!(matches!(err, TreeError::NotFound { .. }));
}

#[test]
fn out_of_bounds_is_rejected_at_the_root() {
    let mut tree = MerkleOctree::new(hundred_cube(), TreeConfig::default()).unwrap();
    let outside = vec3(100.0, 50.0, 50.0); // upper face is excluded
    let err = tree.insert(Point::new(outside, b"x".to_vec())).unwrap_err();
    assert!(matches!(err, TreeError::OutOfBounds { .. }));
    assert_eq!(tree.root_digest(), Digest::EMPTY);
    assert_eq!(tree.point_count(), 0);

    assert!(matches!(tree.locate(outside), Err(TreeError::OutOfBounds { .. })));
}

#[test]
fn rejects_invalid_bounds() {
    let inverted = Aabb { min: Vec3::ONE, max: Vec3::ZERO };
    let err = MerkleOctree::new(inverted, TreeConfig::default()).unwrap_err();
    assert!(matches!(err, TreeError::InvalidBounds { .. }));
}

#[test]
fn capacity_error_without_cluster_fallback() {
    let config = TreeConfig { max_depth: 3, cluster_capacity: None };
    let mut tree = MerkleOctree::new(hundred_cube(), config).unwrap();
    let pos = vec3(33.0, 33.0, 33.0);
    tree.insert(Point::new(pos, b"first".to_vec())).unwrap();

    let digest = tree.root_digest();
    let err = tree.insert(Point::new(pos, b"second".to_vec())).unwrap_err();
    assert!(matches!(err, TreeError::CapacityExceeded { .. }));
    assert_eq!(tree.root_digest(), digest);
    assert_eq!(tree.point_count(), 1);
}
