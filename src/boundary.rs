use std::collections::HashSet;

use rstar::{RTree, RTreeObject, AABB};

use crate::datatypes::{BoundaryPoint, Mesh, Rect, Vertex};

/// Tree entry: one boundary point as a degenerate box
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedPoint {
    slot: usize,
    position: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Deduplicated boundary nodes with an R-tree for rectangle queries
///
/// The tree is bulk loaded once. Annotation updates never move a point, so
/// it is never rebalanced.
pub struct BoundaryPointIndex {
    points: Vec<BoundaryPoint>,
    tree: RTree<IndexedPoint>,
}

impl BoundaryPointIndex {
    /// Collects every node referenced by a line cell, once, in first-seen order
    ///
    /// # Arguments
    /// * `mesh` - The imported mesh
    /// * `extent` - The model's drawing area, normally `[0, 0] x [W, H]`
    pub fn build(mesh: &Mesh, extent: Rect) -> BoundaryPointIndex {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut points: Vec<BoundaryPoint> = Vec::new();

        for line in mesh.line_cells() {
            for &node_id in line {
                if !seen.insert(node_id) {
                    continue;
                }
                match mesh.points.get(node_id) {
                    Some(position) => points.push(BoundaryPoint::new(node_id, *position)),
                    None => log::warn!("line cell references missing node {node_id}"),
                }
            }
        }

        let outside = points
            .iter()
            .filter(|p| !extent.contains(&p.position))
            .count();
        if outside > 0 {
            log::warn!("{outside} boundary points lie outside the model extent");
        }

        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(slot, p)| IndexedPoint {
                slot,
                position: [p.position.x, p.position.y],
            })
            .collect();

        log::info!("indexed {} boundary points", points.len());

        BoundaryPointIndex {
            points,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[BoundaryPoint] {
        &self.points
    }

    pub fn get(&self, slot: usize) -> Option<&BoundaryPoint> {
        self.points.get(slot)
    }

    /// Slots of every point inside `rect` (edges included), ascending
    pub fn query(&self, rect: &Rect) -> Vec<usize> {
        let envelope = AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y]);
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    pub fn query_points(&self, rect: &Rect) -> Vec<&BoundaryPoint> {
        self.query(rect).into_iter().map(|s| &self.points[s]).collect()
    }

    /// Runs `f` on the points at `slots`; positions must stay untouched
    pub fn update<F>(&mut self, slots: &[usize], mut f: F)
    where
        F: FnMut(&mut BoundaryPoint),
    {
        for &slot in slots {
            if let Some(point) = self.points.get_mut(slot) {
                let position: Vertex = point.position;
                f(point);
                debug_assert_eq!(point.position, position, "boundary points cannot move");
            }
        }
    }
}
