use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    datatypes::{CellBlock, Cells, Constraint, Mesh, Node, PlanarModel, Vertex},
    error::BoxingFemError,
    geometry,
};

/// gmsh element type codes
const GMSH_LINE: usize = 1;
const GMSH_TRIANGLE: usize = 2;
const GMSH_POINT: usize = 15;

/// Cap on capacity reserved from counts in a file header
const MAX_PREALLOCATED: usize = 4096;

/// Triangulates a planar model
pub trait MeshEngine {
    fn generate(&self, model: &PlanarModel) -> Result<Mesh, BoxingFemError>;
}

/// Runs the gmsh executable on a generated .geo script
pub struct GmshEngine {
    pub executable: String,
    pub work_dir: PathBuf,
    pub keep_files: bool,
}

impl GmshEngine {
    pub fn new(executable: &str, work_dir: &Path, keep_files: bool) -> GmshEngine {
        GmshEngine {
            executable: executable.to_owned(),
            work_dir: work_dir.to_path_buf(),
            keep_files,
        }
    }

    fn remove_scratch(&self, paths: &[&Path]) {
        if self.keep_files {
            log::info!("keeping mesher files in {}", self.work_dir.display());
            return;
        }
        for path in paths {
            if let Err(err) = std::fs::remove_file(path) {
                log::warn!("could not remove {}: {err}", path.display());
            }
        }
    }
}

impl MeshEngine for GmshEngine {
    fn generate(&self, model: &PlanarModel) -> Result<Mesh, BoxingFemError> {
        let geo_path = self.work_dir.join("model.geo");
        let msh_path = self.work_dir.join("mesh.msh");

        log::info!(
            "building .geo for gmsh with CL = {:.3}",
            model.characteristic_length
        );
        std::fs::write(&geo_path, geometry::geo_script(model))
            .map_err(|err| BoxingFemError::io(format!("writing {}", geo_path.display()), err))?;

        log::info!("running gmsh...");
        let output = match std::process::Command::new(&self.executable)
            .arg(&geo_path)
            .arg("-2")
            .arg("-format")
            .arg("msh41")
            .arg("-o")
            .arg(&msh_path)
            .output()
        {
            Ok(out) => out,
            Err(err) => {
                self.remove_scratch(&[&geo_path]);
                return Err(BoxingFemError::MeshEngine(format!("Gmsh failed: {err}")));
            }
        };

        if !output.status.success() {
            self.remove_scratch(&[&geo_path]);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BoxingFemError::MeshEngine(format!(
                "gmsh exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let contents = std::fs::read_to_string(&msh_path);
        self.remove_scratch(&[&geo_path, &msh_path]);
        let contents = match contents {
            Ok(c) => c,
            Err(err) => {
                return Err(BoxingFemError::MeshEngine(format!(
                    "Unable to open generated mesh file: {err}"
                )))
            }
        };

        let mesh = parse_msh(&contents)?;
        check_mesh(&mesh)?;
        Ok(mesh)
    }
}

/// Rejects mesher output that cannot be assembled
pub fn check_mesh(mesh: &Mesh) -> Result<(), BoxingFemError> {
    if mesh.points.is_empty() {
        return Err(BoxingFemError::MeshEngine("mesher returned no points".to_owned()));
    }
    if mesh.triangle_count() == 0 {
        return Err(BoxingFemError::MeshEngine(
            "mesher returned no triangles".to_owned(),
        ));
    }
    Ok(())
}

fn numbers<T: FromStr>(line: &str) -> Result<Vec<T>, BoxingFemError> {
    line.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| {
                BoxingFemError::MeshEngine(format!("Unexpected value {token} in mesh data"))
            })
        })
        .collect()
}

fn next_line<'a, I>(lines: &mut I, section: &str) -> Result<&'a str, BoxingFemError>
where
    I: Iterator<Item = &'a str>,
{
    match lines.next() {
        Some(line) => Ok(line),
        None => Err(BoxingFemError::MeshEngine(format!(
            "mesh file ends inside {section}"
        ))),
    }
}

fn parse_nodes<'a, I>(
    lines: &mut I,
    tagged_points: &mut Vec<(usize, Vertex)>,
) -> Result<(), BoxingFemError>
where
    I: Iterator<Item = &'a str>,
{
    let header: Vec<usize> = numbers(next_line(lines, "$Nodes")?)?;
    if header.len() != 4 {
        return Err(BoxingFemError::MeshEngine(
            "malformed $Nodes header".to_owned(),
        ));
    }
    let num_blocks = header[0];
    tagged_points.reserve(header[1].min(MAX_PREALLOCATED));

    for _ in 0..num_blocks {
        let block: Vec<usize> = numbers(next_line(lines, "$Nodes")?)?;
        if block.len() != 4 {
            return Err(BoxingFemError::MeshEngine(
                "malformed node block header".to_owned(),
            ));
        }
        let num_nodes_local = block[3];

        let mut node_tags: Vec<usize> = Vec::with_capacity(num_nodes_local.min(MAX_PREALLOCATED));
        for _ in 0..num_nodes_local {
            let tag: Vec<usize> = numbers(next_line(lines, "$Nodes")?)?;
            match tag.first() {
                Some(t) => node_tags.push(*t),
                None => {
                    return Err(BoxingFemError::MeshEngine("missing node tag".to_owned()))
                }
            }
        }

        for tag in node_tags {
            let coords: Vec<f64> = numbers(next_line(lines, "$Nodes")?)?;
            if coords.len() < 2 {
                return Err(BoxingFemError::MeshEngine(format!(
                    "node {tag} has fewer than two coordinates"
                )));
            }
            tagged_points.push((tag, Vertex::new(coords[0], coords[1])));
        }
    }

    Ok(())
}

fn parse_elements<'a, I>(
    lines: &mut I,
    raw_blocks: &mut Vec<(usize, usize, Vec<Vec<usize>>)>,
) -> Result<(), BoxingFemError>
where
    I: Iterator<Item = &'a str>,
{
    let header: Vec<usize> = numbers(next_line(lines, "$Elements")?)?;
    if header.len() != 4 {
        return Err(BoxingFemError::MeshEngine(
            "malformed $Elements header".to_owned(),
        ));
    }

    for _ in 0..header[0] {
        let block: Vec<usize> = numbers(next_line(lines, "$Elements")?)?;
        if block.len() != 4 {
            return Err(BoxingFemError::MeshEngine(
                "malformed element block header".to_owned(),
            ));
        }
        let entity_tag = block[1];
        let element_type = block[2];
        let num_elements = block[3];

        let expected_nodes = match element_type {
            GMSH_POINT => 1,
            GMSH_LINE => 2,
            GMSH_TRIANGLE => 3,
            other => {
                return Err(BoxingFemError::MeshEngine(format!(
                    "unsupported gmsh element type {other}"
                )))
            }
        };

        let mut cells: Vec<Vec<usize>> = Vec::with_capacity(num_elements.min(MAX_PREALLOCATED));
        for _ in 0..num_elements {
            let data: Vec<usize> = numbers(next_line(lines, "$Elements")?)?;
            if data.len() != expected_nodes + 1 {
                return Err(BoxingFemError::MeshEngine(format!(
                    "element {:?} in block {entity_tag} should list {expected_nodes} nodes",
                    data.first()
                )));
            }
            cells.push(data[1..].to_vec());
        }

        if element_type != GMSH_POINT {
            raw_blocks.push((entity_tag, element_type, cells));
        }
    }

    Ok(())
}

/// Parses gmsh MSH 4.1 ASCII text into a Mesh
///
/// Node tags are renumbered into dense 0-based ids in ascending tag order.
/// Each element entity block becomes one cell block, in file order.
///
/// # Arguments
/// * `contents` - The text of the .msh file
///
/// # Returns
/// The parsed mesh
pub fn parse_msh(contents: &str) -> Result<Mesh, BoxingFemError> {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut tagged_points: Vec<(usize, Vertex)> = Vec::new();
    let mut raw_blocks: Vec<(usize, usize, Vec<Vec<usize>>)> = Vec::new();

    while let Some(line) = lines.next() {
        match line {
            "$MeshFormat" => {
                let format = next_line(&mut lines, "$MeshFormat")?;
                if !format.starts_with('4') {
                    return Err(BoxingFemError::MeshEngine(format!(
                        "unsupported mesh format {format}, expected 4.1 ASCII"
                    )));
                }
            }
            "$Nodes" => parse_nodes(&mut lines, &mut tagged_points)?,
            "$Elements" => parse_elements(&mut lines, &mut raw_blocks)?,
            section if section.starts_with("$End") => continue,
            section if section.starts_with('$') => {
                // sections we do not need, e.g. $Entities
                let end = format!("$End{}", &section[1..]);
                loop {
                    if next_line(&mut lines, section)? == end {
                        break;
                    }
                }
            }
            other => {
                return Err(BoxingFemError::MeshEngine(format!(
                    "unexpected line outside a section: {other}"
                )))
            }
        }
    }

    tagged_points.sort_by_key(|(tag, _)| *tag);
    let mut index_of_tag: HashMap<usize, usize> = HashMap::with_capacity(tagged_points.len());
    let mut points: Vec<Vertex> = Vec::with_capacity(tagged_points.len());
    for (tag, vertex) in tagged_points {
        if index_of_tag.insert(tag, points.len()).is_some() {
            return Err(BoxingFemError::MeshEngine(format!(
                "node tag {tag} defined twice"
            )));
        }
        points.push(vertex);
    }

    let lookup = |tag: usize| -> Result<usize, BoxingFemError> {
        match index_of_tag.get(&tag) {
            Some(i) => Ok(*i),
            None => Err(BoxingFemError::MeshEngine(format!(
                "element references unknown node {tag}"
            ))),
        }
    };

    let mut cell_blocks: Vec<CellBlock> = Vec::with_capacity(raw_blocks.len());
    for (entity_tag, element_type, raw_cells) in raw_blocks {
        let cells = if element_type == GMSH_LINE {
            let mut lines = Vec::with_capacity(raw_cells.len());
            for c in raw_cells {
                lines.push([lookup(c[0])?, lookup(c[1])?]);
            }
            Cells::Line(lines)
        } else {
            let mut triangles = Vec::with_capacity(raw_cells.len());
            for c in raw_cells {
                triangles.push([lookup(c[0])?, lookup(c[1])?, lookup(c[2])?]);
            }
            Cells::Triangle(triangles)
        };
        log::debug!(
            "entity {entity_tag}: {} {} cells",
            cells.len(),
            cells.kind()
        );
        cell_blocks.push(CellBlock { entity_tag, cells });
    }

    log::info!(
        "loaded {} points in {} cell blocks",
        points.len(),
        cell_blocks.len()
    );

    Ok(Mesh {
        points,
        cell_blocks,
    })
}

/// Creates one free node per mesh point; ids are point positions
pub fn import_nodes(mesh: &Mesh) -> Vec<Node> {
    mesh.points
        .iter()
        .enumerate()
        .map(|(id, vertex)| Node {
            id,
            vertex: *vertex,
            x_constraint: Constraint::Free,
            y_constraint: Constraint::Free,
        })
        .collect()
}
