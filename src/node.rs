use glam::Vec3;
use std::slice;
use crate::{
    combine_slots,
    Aabb, Digest, Hasher, TreeConfig, TreeError,
};

/// A stored datum: a position plus the opaque payload bytes hashed
/// into the tree. Immutable once inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub position: Vec3,
    pub payload: Vec<u8>,
}

impl Point {
    pub fn new(position: Vec3, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            position,
            payload: payload.into(),
        }
    }
}

/// What an insert did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The point was attached and every ancestor digest updated.
    Inserted,
    /// An identical point (same position, same payload) was already
    /// stored; digests and node counts are unchanged.
    Duplicate,
}

/// An octree node together with its verification digest.
///
/// The digest is recomputed immediately after every content or
/// structural change, so it is always consistent with [`NodeKind`]:
/// `H(payload)` for leaves, the member payload digests chained in list
/// order for clusters, and the fixed-arity slot combination for
/// internal nodes.
#[derive(Debug)]
pub struct Node {
    pub hash: Digest,
    pub kind: NodeKind,
}

/// Explicit node state. A node is exactly one of these: it can never
/// simultaneously hold leaf data and children.
#[derive(Debug)]
pub enum NodeKind {
    Empty,
    Leaf(Point),
    /// Ordered, size-bounded point list at a terminal node past the
    /// maximum subdivision depth. Holds colliding points that no
    /// amount of subdividing would separate.
    Cluster(Vec<Point>),
    Internal([Option<Box<Node>>; 8]),
}

fn empty_children() -> [Option<Box<Node>>; 8] {
    [None, None, None, None, None, None, None, None]
}

/// Whether two positions fall into different octants at some depth
/// strictly below `max_depth`, i.e. whether subdividing can ever
/// separate them. Identical positions never route apart.
fn routes_apart(mut bounds: Aabb, a: Vec3, b: Vec3, mut depth: u8, max_depth: u8) -> bool {
    while depth < max_depth {
        let slot = bounds.child_index(a);
        if slot != bounds.child_index(b) {
            return true;
        }
        bounds = bounds.child_bounds(slot);
        depth += 1;
    }
    false
}

fn cluster_digest<H: Hasher>(points: &[Point], hasher: &H) -> Digest {
    let mut buf = Vec::with_capacity(points.len() * 32);
    for point in points {
        buf.extend_from_slice(hasher.digest(&point.payload).as_bytes());
    }
    hasher.digest(&buf)
}

fn child_digests(children: &[Option<Box<Node>>; 8]) -> [Digest; 8] {
    std::array::from_fn(|slot| {
        children[slot].as_ref().map_or(Digest::EMPTY, |child| child.hash)
    })
}

impl Node {
    pub fn empty() -> Self {
        Self {
            hash: Digest::EMPTY,
            kind: NodeKind::Empty,
        }
    }

    /// Insert a point into the subtree rooted here.
    ///
    /// `bounds` must already contain the point; the caller routes via
    /// [`Aabb::child_index`] so recursive calls cannot miss. All
    /// failure cases are detected before any node changes state, so an
    /// error leaves the subtree (and its digests) untouched.
    pub fn insert<H: Hasher>(
        &mut self,
        point: Point,
        bounds: Aabb,
        depth: u8,
        config: TreeConfig,
        hasher: &H,
    ) -> Result<InsertOutcome, TreeError> {
        match &mut self.kind {
            NodeKind::Empty => {
                self.kind = NodeKind::Leaf(point);
                self.recompute_hash(hasher);
                Ok(InsertOutcome::Inserted)
            }
            NodeKind::Leaf(existing) => {
                if existing.position == point.position && existing.payload == point.payload {
                    return Ok(InsertOutcome::Duplicate);
                }
                if depth >= config.max_depth {
                    // terminal level: no further subdivision allowed
                    if config.cluster_capacity.is_none() {
                        return Err(TreeError::CapacityExceeded { position: point.position });
                    }
                    let existing = existing.clone();
                    self.kind = NodeKind::Cluster(vec![existing, point]);
                    self.recompute_hash(hasher);
                    return Ok(InsertOutcome::Inserted);
                }
                // With the cluster fallback disabled, an inseparable
                // pair would only fail deep in the subdivision chain;
                // probe for that before converting this leaf so a
                // failing insert mutates nothing.
                if config.cluster_capacity.is_none()
                    && !routes_apart(bounds, existing.position, point.position, depth, config.max_depth)
                {
                    return Err(TreeError::CapacityExceeded { position: point.position });
                }
                let existing = existing.clone();
                self.kind = NodeKind::Internal(empty_children());
                // re-route both points; neither recursion can fail here
                self.insert(existing, bounds, depth, config, hasher)?;
                self.insert(point, bounds, depth, config, hasher)
            }
            NodeKind::Cluster(points) => {
                if points.iter().any(|p| p.position == point.position && p.payload == point.payload) {
                    return Ok(InsertOutcome::Duplicate);
                }
                let capacity = config.cluster_capacity.unwrap_or(0);
                if points.len() >= capacity {
                    return Err(TreeError::CapacityExceeded { position: point.position });
                }
                points.push(point);
                self.recompute_hash(hasher);
                Ok(InsertOutcome::Inserted)
            }
            NodeKind::Internal(children) => {
                let slot = bounds.child_index(point.position);
                let child = children[slot].get_or_insert_with(|| Box::new(Node::empty()));
                let outcome =
                    child.insert(point, bounds.child_bounds(slot), depth + 1, config, hasher)?;
                if outcome == InsertOutcome::Inserted {
                    self.recompute_hash(hasher);
                }
                Ok(outcome)
            }
        }
    }

    /// Recompute this node's digest from its current content. Pure and
    /// deterministic; children are taken at their stored digests.
    pub fn recompute_hash<H: Hasher>(&mut self, hasher: &H) {
        self.hash = match &self.kind {
            NodeKind::Empty => Digest::EMPTY,
            NodeKind::Leaf(point) => hasher.digest(&point.payload),
            NodeKind::Cluster(points) => cluster_digest(points, hasher),
            NodeKind::Internal(children) => combine_slots(hasher, &child_digests(children)),
        };
    }

    /// The stored point at `position`, if any. For clusters, the first
    /// member at that position.
    pub fn locate(&self, position: Vec3, bounds: Aabb) -> Option<&Point> {
        match &self.kind {
            NodeKind::Empty => None,
            NodeKind::Leaf(point) => (point.position == position).then_some(point),
            NodeKind::Cluster(points) => points.iter().find(|p| p.position == position),
            NodeKind::Internal(children) => {
                let slot = bounds.child_index(position);
                children[slot]
                    .as_ref()?
                    .locate(position, bounds.child_bounds(slot))
            }
        }
    }

    /// Edges traversed from this node down to the node holding
    /// `position`, or `None` if nothing is stored there.
    pub fn depth_of(&self, position: Vec3, bounds: Aabb) -> Option<u8> {
        match &self.kind {
            NodeKind::Empty => None,
            NodeKind::Leaf(point) => (point.position == position).then_some(0),
            NodeKind::Cluster(points) => {
                points.iter().any(|p| p.position == position).then_some(0)
            }
            NodeKind::Internal(children) => {
                let slot = bounds.child_index(position);
                let child = children[slot].as_ref()?;
                child
                    .depth_of(position, bounds.child_bounds(slot))
                    .map(|d| d + 1)
            }
        }
    }

    /// Re-walk the path to `position`, recomputing every digest along
    /// the way and comparing against stored values, then compare the
    /// terminal payload digest against `expected`. The error reports
    /// the shallowest node whose digests diverge.
    pub fn verify<H: Hasher>(
        &self,
        position: Vec3,
        expected: Digest,
        bounds: Aabb,
        depth: u8,
        hasher: &H,
    ) -> Result<(), TreeError> {
        match &self.kind {
            NodeKind::Empty => Err(TreeError::NotFound { position }),
            NodeKind::Leaf(point) => {
                if point.position != position {
                    return Err(TreeError::NotFound { position });
                }
                let computed = hasher.digest(&point.payload);
                if computed != self.hash {
                    return Err(TreeError::HashMismatch { depth, expected: self.hash, computed });
                }
                if computed != expected {
                    return Err(TreeError::HashMismatch { depth, expected, computed });
                }
                Ok(())
            }
            NodeKind::Cluster(points) => {
                let Some(member) = points.iter().find(|p| p.position == position) else {
                    return Err(TreeError::NotFound { position });
                };
                let computed = cluster_digest(points, hasher);
                if computed != self.hash {
                    return Err(TreeError::HashMismatch { depth, expected: self.hash, computed });
                }
                let member_digest = hasher.digest(&member.payload);
                if member_digest != expected {
                    return Err(TreeError::HashMismatch { depth, expected, computed: member_digest });
                }
                Ok(())
            }
            NodeKind::Internal(children) => {
                let computed = combine_slots(hasher, &child_digests(children));
                if computed != self.hash {
                    return Err(TreeError::HashMismatch { depth, expected: self.hash, computed });
                }
                let slot = bounds.child_index(position);
                match &children[slot] {
                    Some(child) => {
                        child.verify(position, expected, bounds.child_bounds(slot), depth + 1, hasher)
                    }
                    None => Err(TreeError::NotFound { position }),
                }
            }
        }
    }

    /// Pre-order traversal, pushing one entry per node.
    pub fn collect_entries<'a>(
        &'a self,
        bounds: Aabb,
        depth: u8,
        out: &mut Vec<NodeEntry<'a>>,
    ) {
        let points: &[Point] = match &self.kind {
            NodeKind::Empty | NodeKind::Internal(_) => &[],
            NodeKind::Leaf(point) => slice::from_ref(point),
            NodeKind::Cluster(points) => points,
        };
        out.push(NodeEntry {
            bounds,
            depth,
            hash: self.hash,
            points,
        });
        if let NodeKind::Internal(children) = &self.kind {
            for (slot, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    child.collect_entries(bounds.child_bounds(slot), depth + 1, out);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.kind {
            NodeKind::Internal(children) => {
                1 + children
                    .iter()
                    .flatten()
                    .map(|child| child.node_count())
                    .sum::<usize>()
            }
            _ => 1,
        }
    }

    pub fn point_count(&self) -> usize {
        match &self.kind {
            NodeKind::Empty => 0,
            NodeKind::Leaf(_) => 1,
            NodeKind::Cluster(points) => points.len(),
            NodeKind::Internal(children) => children
                .iter()
                .flatten()
                .map(|child| child.point_count())
                .sum(),
        }
    }
}

/// One entry of the read-only pre-order enumeration: enough for an
/// external renderer or metrics probe without touching tree internals.
#[derive(Debug)]
pub struct NodeEntry<'a> {
    pub bounds: Aabb,
    pub depth: u8,
    pub hash: Digest,
    pub points: &'a [Point],
}

#[cfg(test)]
use crate::Blake3Hasher;
#[cfg(test)]
use glam::vec3;

#[cfg(test)]
fn config(max_depth: u8, cluster_capacity: Option<usize>) -> TreeConfig {
    TreeConfig { max_depth, cluster_capacity }
}

#[test]
fn first_insert_fills_the_leaf() {
    let bounds = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    let mut node = Node::empty();
    let outcome = node
        .insert(Point::new(vec3(1.0, 2.0, 3.0), b"abc".to_vec()), bounds, 0, config(8, Some(8)), &Blake3Hasher)
        .unwrap();
    assert_eq!(outcome, InsertOutcome::Inserted);
    assert!(matches!(node.kind, NodeKind::Leaf(_)));
    assert_eq!(node.hash, Blake3Hasher.digest(b"abc"));
}

#[test]
fn colliding_points_fall_back_to_a_cluster() {
    let bounds = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    let cfg = config(3, Some(4));
    let pos = vec3(10.0, 10.0, 10.0);
    let mut node = Node::empty();
    for payload in [b"a", b"b", b"c", b"d"] {
        node.insert(Point::new(pos, payload.to_vec()), bounds, 0, cfg, &Blake3Hasher)
            .unwrap();
    }
    // the collision sank to the depth cap and clustered there
    assert_eq!(node.depth_of(pos, bounds), Some(3));
    assert_eq!(node.point_count(), 4);

    let err = node
        .insert(Point::new(pos, b"e".to_vec()), bounds, 0, cfg, &Blake3Hasher)
        .unwrap_err();
    assert!(matches!(err, TreeError::CapacityExceeded { .. }));
    assert_eq!(node.point_count(), 4);
}

#[test]
fn failed_insert_leaves_the_tree_untouched() {
    let bounds = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    let cfg = config(3, None);
    let pos = vec3(42.0, 42.0, 42.0);
    let mut node = Node::empty();
    node.insert(Point::new(pos, b"original".to_vec()), bounds, 0, cfg, &Blake3Hasher)
        .unwrap();

    let hash_before = node.hash;
    let nodes_before = node.node_count();
    let err = node
        .insert(Point::new(pos, b"collides".to_vec()), bounds, 0, cfg, &Blake3Hasher)
        .unwrap_err();
    assert!(matches!(err, TreeError::CapacityExceeded { .. }));
    // no partial subdivision, no partial hash update
    assert_eq!(node.hash, hash_before);
    assert_eq!(node.node_count(), nodes_before);
    assert_eq!(node.locate(pos, bounds).unwrap().payload, b"original");
}

#[cfg(test)]
fn two_leaf_tree(bounds: Aabb) -> Node {
    let mut node = Node::empty();
    node.insert(Point::new(vec3(1.0, 1.0, 1.0), b"a".to_vec()), bounds, 0, config(8, Some(8)), &Blake3Hasher)
        .unwrap();
    node.insert(Point::new(vec3(99.0, 99.0, 99.0), b"b".to_vec()), bounds, 0, config(8, Some(8)), &Blake3Hasher)
        .unwrap();
    node
}

#[test]
fn verify_localizes_a_corrupted_stored_hash() {
    let bounds = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    let mut node = two_leaf_tree(bounds);
    let pos = vec3(1.0, 1.0, 1.0);
    node.verify(pos, Blake3Hasher.digest(b"a"), bounds, 0, &Blake3Hasher)
        .unwrap();

    if let NodeKind::Internal(children) = &mut node.kind {
        children[0].as_mut().unwrap().hash.0[0] ^= 0xff;
    }
    let err = node
        .verify(pos, Blake3Hasher.digest(b"a"), bounds, 0, &Blake3Hasher)
        .unwrap_err();
    // the root no longer matches its recomputation from stored child digests
    assert!(matches!(err, TreeError::HashMismatch { depth: 0, .. }));
}

#[test]
fn verify_detects_a_tampered_payload() {
    let bounds = Aabb::cube(Vec3::ZERO, 100.0).unwrap();
    let mut node = two_leaf_tree(bounds);
    let pos = vec3(1.0, 1.0, 1.0);

    if let NodeKind::Internal(children) = &mut node.kind {
        if let NodeKind::Leaf(point) = &mut children[0].as_mut().unwrap().kind {
            point.payload[0] ^= 0x01;
        }
    }
    let err = node
        .verify(pos, Blake3Hasher.digest(b"a"), bounds, 0, &Blake3Hasher)
        .unwrap_err();
    // ancestors still agree with stored child digests; the leaf itself diverges
    assert!(matches!(err, TreeError::HashMismatch { depth: 1, .. }));
}
