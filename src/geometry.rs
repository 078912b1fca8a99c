use std::collections::HashSet;

use crate::{
    datatypes::{ContourHierarchy, ContourNode, Loop, PlanarModel, Surface, Vertex},
    error::BoxingFemError,
};

/// Contours with fewer points than this cannot enclose an area
pub const MIN_LOOP_POINTS: usize = 3;

fn check_link(
    link: Option<usize>,
    field: &str,
    contour: usize,
    len: usize,
) -> Result<(), BoxingFemError> {
    match link {
        Some(target) if target >= len => Err(BoxingFemError::Geometry(format!(
            "contour {contour} has {field} link {target} outside a hierarchy of {len} contours"
        ))),
        _ => Ok(()),
    }
}

fn validate_links(contours: &ContourHierarchy) -> Result<(), BoxingFemError> {
    let len = contours.nodes.len();
    for (i, node) in contours.nodes.iter().enumerate() {
        check_link(node.links.next_sibling, "next sibling", i, len)?;
        check_link(node.links.prev_sibling, "previous sibling", i, len)?;
        check_link(node.links.first_child, "first child", i, len)?;
        check_link(node.links.parent, "parent", i, len)?;
    }
    Ok(())
}

/// Scales a contour into mesh space and drops repeated points
///
/// # Arguments
/// * `index` - Index of the contour, for diagnostics
/// * `node` - The contour to convert
/// * `scale` - Pixel to mesh-length factor
///
/// # Returns
/// The closed polygon's points, without a repeated closing point
fn loop_points(index: usize, node: &ContourNode, scale: f64) -> Vec<Vertex> {
    let mut points: Vec<Vertex> = Vec::with_capacity(node.points.len());
    let mut skipped: usize = 0;

    for p in &node.points {
        let vertex = Vertex::new(p.x * scale, p.y * scale);
        if points.last() == Some(&vertex) {
            skipped += 1;
            continue;
        }
        points.push(vertex);
    }
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
        skipped += 1;
    }

    if skipped > 0 {
        log::warn!("skipped {skipped} repeated points in contour {index}");
    }

    points
}

/// Number of parent links above contour `index`
fn depth(contours: &ContourHierarchy, index: usize) -> Result<usize, BoxingFemError> {
    let mut depth: usize = 0;
    let mut cursor = contours.nodes[index].links.parent;
    while let Some(parent) = cursor {
        depth += 1;
        if depth > contours.nodes.len() {
            return Err(BoxingFemError::Geometry(format!(
                "parent chain above contour {index} is a cycle"
            )));
        }
        cursor = contours.nodes[parent].links.parent;
    }
    Ok(depth)
}

/// Output of [`build`] while it is being assembled
struct ModelBuilder<'a> {
    contours: &'a ContourHierarchy,
    scale: f64,
    loops: Vec<Loop>,
    surfaces: Vec<Surface>,
    /// Contours already meshed or already reported as skipped
    covered: Vec<bool>,
}

impl<'a> ModelBuilder<'a> {
    /// Children of `owner` along `first_child -> next_sibling*`
    fn hole_chain(&self, owner: usize) -> Result<Vec<usize>, BoxingFemError> {
        let mut chain: Vec<usize> = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut cursor = self.contours.nodes[owner].links.first_child;

        while let Some(child_idx) = cursor {
            if !visited.insert(child_idx) {
                return Err(BoxingFemError::Geometry(format!(
                    "sibling chain below contour {owner} revisits contour {child_idx}"
                )));
            }

            let child = &self.contours.nodes[child_idx];
            if child.links.parent != Some(owner) {
                return Err(BoxingFemError::Geometry(format!(
                    "contour {child_idx} is linked as a hole of contour {owner} but names parent {:?}",
                    child.links.parent
                )));
            }
            chain.push(child_idx);
            cursor = child.links.next_sibling;
        }

        Ok(chain)
    }

    /// Adds `owner` as an outer loop with its child chain as holes
    fn add_surface(&mut self, owner: usize) -> Result<(), BoxingFemError> {
        let chain = self.hole_chain(owner)?;
        self.covered[owner] = true;
        for &child_idx in &chain {
            self.covered[child_idx] = true;
        }

        let points = loop_points(owner, &self.contours.nodes[owner], self.scale);
        if points.len() < MIN_LOOP_POINTS {
            log::warn!(
                "skipping degenerate outer contour {owner} with {} points, holes included",
                points.len()
            );
            return Ok(());
        }
        self.loops.push(Loop {
            contour: owner,
            points,
        });
        let outer = self.loops.len() - 1;

        let mut holes: Vec<usize> = Vec::with_capacity(chain.len());
        for child_idx in chain {
            let points = loop_points(child_idx, &self.contours.nodes[child_idx], self.scale);
            if points.len() < MIN_LOOP_POINTS {
                log::warn!(
                    "skipping degenerate hole contour {child_idx} with {} points",
                    points.len()
                );
                continue;
            }
            self.loops.push(Loop {
                contour: child_idx,
                points,
            });
            holes.push(self.loops.len() - 1);
        }

        self.surfaces.push(Surface { outer, holes });
        Ok(())
    }
}

/// Builds the planar model handed to the mesher
///
/// Every contour without a parent becomes the outer loop of one surface, and
/// the chain `first_child -> next_sibling*` below it supplies the holes.
/// Contours left over after that are islands or holes nested below a hole.
/// An island (even nesting depth) becomes its own surface, shallowest first,
/// so its holes are claimed by it. A leftover hole is a Geometry error.
///
/// # Arguments
/// * `contours` - The traced hierarchy
/// * `scale` - Pixel to mesh-length factor
/// * `characteristic_length` - Target element size passed through to the mesher
///
/// # Returns
/// The planar model: top level surfaces in input contour order, then islands
pub fn build(
    contours: &ContourHierarchy,
    scale: f64,
    characteristic_length: f64,
) -> Result<PlanarModel, BoxingFemError> {
    if contours.nodes.is_empty() {
        return Err(BoxingFemError::Input("contour hierarchy is empty".to_owned()));
    }
    validate_links(contours)?;

    let mut builder = ModelBuilder {
        contours,
        scale,
        loops: Vec::new(),
        surfaces: Vec::new(),
        covered: vec![false; contours.nodes.len()],
    };

    for (i, node) in contours.nodes.iter().enumerate() {
        if node.is_outer() {
            builder.add_surface(i)?;
        }
    }

    let mut leftover: Vec<(usize, usize)> = Vec::new();
    for i in (0..contours.nodes.len()).filter(|i| !builder.covered[*i]) {
        leftover.push((depth(contours, i)?, i));
    }
    leftover.sort_unstable();

    for (level, i) in leftover {
        if builder.covered[i] {
            continue;
        }
        let parent = contours.nodes[i].links.parent;
        if level % 2 == 1 {
            return Err(BoxingFemError::Geometry(format!(
                "hole contour {i} is not on the child chain of its parent {parent:?}"
            )));
        }
        log::warn!("contour {i} is an island inside hole {parent:?}, meshing it as its own surface");
        builder.add_surface(i)?;
    }

    if builder.surfaces.is_empty() {
        return Err(BoxingFemError::Input(
            "no usable outer contour to mesh".to_owned(),
        ));
    }

    log::info!(
        "built {} surfaces from {} loops",
        builder.surfaces.len(),
        builder.loops.len()
    );

    Ok(PlanarModel {
        loops: builder.loops,
        surfaces: builder.surfaces,
        characteristic_length,
    })
}

/// Renders a planar model as a gmsh .geo script
///
/// # Arguments
/// * `model` - The planar model
///
/// # Returns
/// The script text. Entity tags start at 1.
pub fn geo_script(model: &PlanarModel) -> String {
    let mut geo = String::new();
    let cl = model.characteristic_length;

    let mut point_tag: usize = 1;
    let mut line_tag: usize = 1;
    let mut loop_tags: Vec<usize> = Vec::with_capacity(model.loops.len());

    for (loop_idx, lp) in model.loops.iter().enumerate() {
        geo.push_str(&format!("\n// Loop {} from contour {}\n", loop_idx + 1, lp.contour));

        let first_point = point_tag;
        for vertex in &lp.points {
            geo.push_str(&format!(
                "Point({}) = {{ {}, {}, 0, {} }};\n",
                point_tag, vertex.x, vertex.y, cl
            ));
            point_tag += 1;
        }

        let n = lp.points.len();
        let first_line = line_tag;
        for i in 0..n {
            geo.push_str(&format!(
                "Line({}) = {{ {}, {} }};\n",
                line_tag,
                first_point + i,
                first_point + (i + 1) % n
            ));
            line_tag += 1;
        }

        let lines: Vec<String> = (first_line..line_tag).map(|l| l.to_string()).collect();
        geo.push_str(&format!(
            "Curve Loop({}) = {{ {} }};\n",
            loop_idx + 1,
            lines.join(", ")
        ));
        loop_tags.push(loop_idx + 1);
    }

    geo.push_str("\n// Surfaces\n");
    for (i, surface) in model.surfaces.iter().enumerate() {
        let members: Vec<String> = std::iter::once(surface.outer)
            .chain(surface.holes.iter().copied())
            .map(|l| loop_tags[l].to_string())
            .collect();
        geo.push_str(&format!(
            "Plane Surface({}) = {{ {} }};\n",
            i + 1,
            members.join(", ")
        ));
    }

    geo.push_str(&format!(
        "\n// Mesh settings\n\
        Mesh.ElementOrder = 1;\n\
        Mesh.Algorithm = 1;\n\
        Mesh.CharacteristicLengthMax = {cl};\n"
    ));

    geo
}
