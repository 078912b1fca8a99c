use nalgebra::Point2;

pub type Vertex = Point2<f64>;

/// Sibling/child links of one traced contour, as produced by the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HierarchyLinks {
    pub next_sibling: Option<usize>,
    pub prev_sibling: Option<usize>,
    pub first_child: Option<usize>,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourNode {
    /// Polyline in pixel coordinates
    pub points: Vec<Vertex>,
    pub links: HierarchyLinks,
}

impl ContourNode {
    pub fn is_outer(&self) -> bool {
        self.links.parent.is_none()
    }
}

/// Arena of traced contours. Links are indexes into `nodes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourHierarchy {
    pub width: u32,
    pub height: u32,
    pub nodes: Vec<ContourNode>,
}

/// Closed polygon in mesh space; point i connects to point (i + 1) % n.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub contour: usize,
    pub points: Vec<Vertex>,
}

/// Outer loop plus hole loops, by index into `PlanarModel::loops`.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub outer: usize,
    pub holes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanarModel {
    pub loops: Vec<Loop>,
    pub surfaces: Vec<Surface>,
    pub characteristic_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cells {
    Line(Vec<[usize; 2]>),
    Triangle(Vec<[usize; 3]>),
}

impl Cells {
    pub fn kind(&self) -> &'static str {
        match self {
            Cells::Line(_) => "line",
            Cells::Triangle(_) => "triangle",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cells::Line(c) => c.len(),
            Cells::Triangle(c) => c.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellBlock {
    pub entity_tag: usize,
    pub cells: Cells,
}

/// Snapshot of the mesher's output. Cell indexes reference `points`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub points: Vec<Vertex>,
    pub cell_blocks: Vec<CellBlock>,
}

impl Mesh {
    pub fn line_cells(&self) -> impl Iterator<Item = &[usize; 2]> {
        self.cell_blocks.iter().flat_map(|block| match &block.cells {
            Cells::Line(lines) => lines.as_slice(),
            Cells::Triangle(_) => &[][..],
        })
    }

    pub fn triangle_blocks(&self) -> impl Iterator<Item = &Vec<[usize; 3]>> {
        self.cell_blocks.iter().filter_map(|block| match &block.cells {
            Cells::Triangle(triangles) => Some(triangles),
            Cells::Line(_) => None,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_blocks().map(|b| b.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint {
    #[default]
    Free,
    Fixed,
}

impl Constraint {
    /// Solver encoding: 0 free, -1 fixed
    pub fn flag(&self) -> i32 {
        match self {
            Constraint::Free => 0,
            Constraint::Fixed => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: usize,
    pub vertex: Vertex,
    pub x_constraint: Constraint,
    pub y_constraint: Constraint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: usize,
    pub material_index: usize,
    /// Node ids, counter-clockwise around the centroid
    pub nodes: [usize; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryPoint {
    pub node_id: usize,
    pub position: Vertex,
    pub x_constraint: Constraint,
    pub y_constraint: Constraint,
    pub force_x: f64,
    pub force_y: f64,
}

impl BoundaryPoint {
    pub fn new(node_id: usize, position: Vertex) -> BoundaryPoint {
        BoundaryPoint {
            node_id,
            position,
            x_constraint: Constraint::Free,
            y_constraint: Constraint::Free,
            force_x: 0.0,
            force_y: 0.0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.force_x != 0.0 || self.force_y != 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub node_id: usize,
    pub force_x: f64,
    pub force_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub young_modulus: f64,
    pub poisson_ratio: f64,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            young_modulus: 1.0,
            poisson_ratio: 1.0,
        }
    }
}

/// Axis-aligned rectangle, inclusive on all sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vertex,
    pub max: Vertex,
}

impl Rect {
    /// Box spanning two corners given in any order
    pub fn from_corners(a: Vertex, b: Vertex) -> Rect {
        Rect {
            min: Vertex::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vertex::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn contains(&self, p: &Vertex) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}
