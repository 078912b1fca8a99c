use std::f64::consts::PI;

use indicatif::ProgressBar;
use nalgebra::Vector2;

use crate::datatypes::{Cells, Element, Mesh, Vertex};

/// Triangles with less area than this are reported as degenerate
pub const DEGENERATE_AREA: f64 = 1e-12;

/// One material patch: the triangles of one mesher block
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLegend {
    pub material_index: usize,
    /// Position of the source block among all cell blocks
    pub cell_block: usize,
    pub element_count: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub elements: Vec<Element>,
    pub legend: Vec<PatchLegend>,
    /// Ids of elements whose vertex order could not be made counter-clockwise
    pub degenerate: Vec<usize>,
}

impl Assembly {
    pub fn patch_count(&self) -> usize {
        self.legend.len()
    }
}

/// Signed area of a triangle, positive when counter-clockwise
pub fn signed_area(v0: &Vertex, v1: &Vertex, v2: &Vertex) -> f64 {
    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Angle of `p` around `center`, in [0, 2pi)
fn polar_angle(p: &Vertex, center: &Vertex) -> f64 {
    let d: Vector2<f64> = p - center;
    let angle = d.y.atan2(d.x);
    if angle < 0.0 {
        angle + 2.0 * PI
    } else {
        angle
    }
}

/// Orders the vertices of a triangle counter-clockwise around its centroid
///
/// Sorting is stable, so exactly equal angles keep the mesher's order.
///
/// # Arguments
/// * `triangle` - Node ids as produced by the mesher
/// * `points` - Mesh points indexed by node id
///
/// # Returns
/// The reordered node ids
pub fn orient_ccw(triangle: &[usize; 3], points: &[Vertex]) -> [usize; 3] {
    let corners = triangle.map(|i| points[i]);
    let centroid = Vertex::from((corners[0].coords + corners[1].coords + corners[2].coords) / 3.0);

    let mut order: [(f64, usize); 3] = [
        (polar_angle(&corners[0], &centroid), triangle[0]),
        (polar_angle(&corners[1], &centroid), triangle[1]),
        (polar_angle(&corners[2], &centroid), triangle[2]),
    ];
    order.sort_by(|a, b| a.0.total_cmp(&b.0));

    order.map(|(_, id)| id)
}

/// Turns every triangle block into elements with one material index per block
///
/// # Arguments
/// * `mesh` - The imported mesh
///
/// # Returns
/// The elements, ids dense in block order, and one legend entry per block
pub fn assemble(mesh: &Mesh) -> Assembly {
    let mut elements: Vec<Element> = Vec::with_capacity(mesh.triangle_count());
    let mut legend: Vec<PatchLegend> = Vec::new();
    let mut degenerate: Vec<usize> = Vec::new();

    let bar = ProgressBar::new(mesh.triangle_count() as u64);

    let triangle_blocks = mesh
        .cell_blocks
        .iter()
        .enumerate()
        .filter_map(|(i, block)| match &block.cells {
            Cells::Triangle(t) => Some((i, t)),
            Cells::Line(_) => None,
        });

    for (material_index, (cell_block, triangles)) in triangle_blocks.enumerate() {
        for triangle in triangles {
            let nodes = orient_ccw(triangle, &mesh.points);
            let id = elements.len();

            let area = signed_area(
                &mesh.points[nodes[0]],
                &mesh.points[nodes[1]],
                &mesh.points[nodes[2]],
            );
            if area <= DEGENERATE_AREA {
                log::warn!(
                    "element {id} ({}, {}, {}) is degenerate, area {area:e}",
                    nodes[0],
                    nodes[1],
                    nodes[2]
                );
                degenerate.push(id);
            }

            elements.push(Element {
                id,
                material_index,
                nodes,
            });
            bar.inc(1);
        }

        legend.push(PatchLegend {
            material_index,
            cell_block,
            element_count: triangles.len(),
            label: format!("Material {}", material_index + 1),
        });
    }
    bar.finish_and_clear();

    log::info!(
        "assembled {} elements in {} material patches",
        elements.len(),
        legend.len()
    );
    if !degenerate.is_empty() {
        log::warn!("{} degenerate elements", degenerate.len());
    }

    Assembly {
        elements,
        legend,
        degenerate,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::datatypes::CellBlock;
    use approx::assert_relative_eq;

    /// Three disjoint triangles, each with its own boundary and triangle block
    pub(crate) fn three_triangles() -> Mesh {
        let mut points = Vec::new();
        let mut cell_blocks = Vec::new();
        for k in 0..3 {
            let x0 = 10.0 * k as f64;
            let base = points.len();
            points.push(Vertex::new(x0, 0.0));
            points.push(Vertex::new(x0 + 4.0, 0.0));
            points.push(Vertex::new(x0, 3.0));
            cell_blocks.push(CellBlock {
                entity_tag: k + 1,
                cells: Cells::Line(vec![
                    [base, base + 1],
                    [base + 1, base + 2],
                    [base + 2, base],
                ]),
            });
            // clockwise on purpose
            cell_blocks.push(CellBlock {
                entity_tag: k + 1,
                cells: Cells::Triangle(vec![[base, base + 2, base + 1]]),
            });
        }
        Mesh {
            points,
            cell_blocks,
        }
    }

    #[test]
    fn one_material_per_triangle_block() {
        let assembly = assemble(&three_triangles());

        let materials: Vec<usize> = assembly.elements.iter().map(|e| e.material_index).collect();
        assert_eq!(materials, vec![0, 1, 2]);
        assert_eq!(assembly.patch_count(), 3);
        assert_eq!(assembly.legend[1].cell_block, 3);
        assert_eq!(assembly.legend[2].label, "Material 3");
        assert!(assembly.degenerate.is_empty());
    }

    #[test]
    fn clockwise_input_becomes_counter_clockwise() {
        let mesh = three_triangles();
        let assembly = assemble(&mesh);

        for element in &assembly.elements {
            let [a, b, c] = element.nodes;
            let area = signed_area(&mesh.points[a], &mesh.points[b], &mesh.points[c]);
            assert!(area > 0.0, "element {} has area {area}", element.id);
        }
        // first vertex has the smallest angle around the centroid
        assert_eq!(assembly.elements[0].nodes, [2, 0, 1]);
    }

    #[test]
    fn angles_wrap_into_one_turn() {
        let center = Vertex::new(1.0, 1.0);
        assert_relative_eq!(polar_angle(&Vertex::new(2.0, 1.0), &center), 0.0);
        assert_relative_eq!(polar_angle(&Vertex::new(1.0, 2.0), &center), PI / 2.0);
        assert_relative_eq!(polar_angle(&Vertex::new(1.0, 0.0), &center), 1.5 * PI);
    }

    #[test]
    fn every_rotation_gives_the_same_order() {
        let points = vec![
            Vertex::new(0.0, 0.0),
            Vertex::new(2.0, 0.5),
            Vertex::new(0.5, 2.0),
        ];
        let expected = orient_ccw(&[0, 1, 2], &points);
        for triangle in [[1, 2, 0], [2, 0, 1], [0, 2, 1], [2, 1, 0], [1, 0, 2]] {
            assert_eq!(orient_ccw(&triangle, &points), expected);
        }
    }

    #[test]
    fn degenerate_triangles_are_flagged_not_dropped() {
        let mesh = Mesh {
            points: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(1.0, 1.0),
                Vertex::new(2.0, 2.0),
            ],
            cell_blocks: vec![CellBlock {
                entity_tag: 1,
                cells: Cells::Triangle(vec![[0, 1, 2]]),
            }],
        };
        let assembly = assemble(&mesh);

        assert_eq!(assembly.elements.len(), 1);
        assert_eq!(assembly.degenerate, vec![0]);
    }

    #[test]
    fn element_ids_continue_across_blocks() {
        let assembly = assemble(&three_triangles());
        let ids: Vec<usize> = assembly.elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
