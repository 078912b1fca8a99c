use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use crate::{
    datatypes::{BoundaryPoint, Element, Load, Material, Node},
    error::BoxingFemError,
};

pub const NODES_FILE: &str = "nodes.txt";
pub const ELEMENTS_FILE: &str = "eles.txt";
pub const LOADS_FILE: &str = "loads.txt";
pub const MATERIALS_FILE: &str = "mater.txt";

/// Material parameters keyed by material index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTable {
    materials: BTreeMap<usize, Material>,
}

impl MaterialTable {
    /// One default material per patch
    pub fn with_defaults(patch_count: usize) -> MaterialTable {
        MaterialTable {
            materials: (0..patch_count).map(|i| (i, Material::default())).collect(),
        }
    }

    pub fn set(&mut self, material_index: usize, material: Material) {
        self.materials.insert(material_index, material);
    }

    pub fn get(&self, material_index: usize) -> Option<&Material> {
        self.materials.get(&material_index)
    }

    /// Materials in index order, which must be exactly the indexes in `used`
    pub fn resolve(&self, used: &BTreeSet<usize>) -> Result<Vec<Material>, BoxingFemError> {
        let defined: BTreeSet<usize> = self.materials.keys().copied().collect();
        if &defined != used {
            let missing: Vec<&usize> = used.difference(&defined).collect();
            let unused: Vec<&usize> = defined.difference(used).collect();
            return Err(BoxingFemError::ExportPrecondition(format!(
                "elements use {} materials but {} are defined (missing {:?}, unused {:?})",
                used.len(),
                defined.len(),
                missing,
                unused
            )));
        }
        Ok(self.materials.values().copied().collect())
    }
}

/// The four solver input tables
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTables {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub loads: Vec<Load>,
    pub materials: Vec<Material>,
}

/// Merges annotations into the solver tables
///
/// # Arguments
/// * `nodes` - Every mesh node, flags as imported
/// * `elements` - The assembled elements
/// * `boundary` - Annotated boundary points
/// * `materials` - Material per material index
///
/// # Returns
/// The tables, or an ExportPrecondition error when they would be inconsistent
pub fn export(
    nodes: &[Node],
    elements: &[Element],
    boundary: &[BoundaryPoint],
    materials: &MaterialTable,
) -> Result<ExportTables, BoxingFemError> {
    let mut nodes: Vec<Node> = nodes.to_vec();
    nodes.sort_by_key(|n| n.id);
    if let Some((i, node)) = nodes.iter().enumerate().find(|(i, n)| n.id != *i) {
        return Err(BoxingFemError::ExportPrecondition(format!(
            "node ids are not dense: position {i} holds node {}",
            node.id
        )));
    }

    let mut loads: Vec<Load> = Vec::new();
    for point in boundary {
        let node = match nodes.get_mut(point.node_id) {
            Some(n) => n,
            None => {
                return Err(BoxingFemError::ExportPrecondition(format!(
                    "boundary point references missing node {}",
                    point.node_id
                )))
            }
        };
        node.x_constraint = point.x_constraint;
        node.y_constraint = point.y_constraint;

        if point.is_loaded() {
            loads.push(Load {
                node_id: point.node_id,
                force_x: point.force_x,
                force_y: point.force_y,
            });
        }
    }

    let mut elements: Vec<Element> = elements.to_vec();
    elements.sort_by_key(|e| e.id);
    for element in &elements {
        if let Some(missing) = element.nodes.iter().find(|&&n| n >= nodes.len()) {
            return Err(BoxingFemError::ExportPrecondition(format!(
                "element {} references missing node {missing}",
                element.id
            )));
        }
    }

    let used: BTreeSet<usize> = elements.iter().map(|e| e.material_index).collect();
    let materials = materials.resolve(&used)?;

    log::info!(
        "exporting {} nodes, {} elements, {} loads, {} materials",
        nodes.len(),
        elements.len(),
        loads.len(),
        materials.len()
    );

    Ok(ExportTables {
        nodes,
        elements,
        loads,
        materials,
    })
}

impl ExportTables {
    pub fn nodes_table(&self) -> String {
        self.nodes
            .iter()
            .map(|n| {
                format!(
                    "{} {:.4} {:.4} {} {}\n",
                    n.id,
                    n.vertex.x,
                    n.vertex.y,
                    n.x_constraint.flag(),
                    n.y_constraint.flag()
                )
            })
            .collect()
    }

    pub fn elements_table(&self) -> String {
        self.elements
            .iter()
            .map(|e| {
                format!(
                    "{} 3 {} {} {} {}\n",
                    e.id, e.material_index, e.nodes[0], e.nodes[1], e.nodes[2]
                )
            })
            .collect()
    }

    pub fn loads_table(&self) -> String {
        self.loads
            .iter()
            .map(|l| format!("{} {:.6} {:.6}\n", l.node_id, l.force_x, l.force_y))
            .collect()
    }

    pub fn materials_table(&self) -> String {
        self.materials
            .iter()
            .map(|m| format!("{:.6} {:.6}\n", m.young_modulus, m.poisson_ratio))
            .collect()
    }

    /// Writes nodes.txt, eles.txt, loads.txt and mater.txt into `dir`
    pub fn write(&self, dir: &Path) -> Result<(), BoxingFemError> {
        std::fs::create_dir_all(dir)
            .map_err(|err| BoxingFemError::io(format!("creating {}", dir.display()), err))?;

        let tables = [
            (NODES_FILE, self.nodes_table()),
            (ELEMENTS_FILE, self.elements_table()),
            (LOADS_FILE, self.loads_table()),
            (MATERIALS_FILE, self.materials_table()),
        ];
        // every table is staged before any existing one is replaced
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(tables.len());
        for (name, contents) in tables {
            let staging = dir.join(format!("{name}.tmp"));
            if let Err(err) = std::fs::write(&staging, contents) {
                for (written, _) in &staged {
                    if let Err(err) = std::fs::remove_file(written) {
                        log::warn!("could not remove {}: {err}", written.display());
                    }
                }
                return Err(BoxingFemError::io(
                    format!("writing {}", staging.display()),
                    err,
                ));
            }
            staged.push((staging, dir.join(name)));
        }
        for (staging, path) in staged {
            std::fs::rename(&staging, &path)
                .map_err(|err| BoxingFemError::io(format!("replacing {}", path.display()), err))?;
        }

        log::info!("wrote solver tables to {}", dir.display());
        Ok(())
    }
}

/// Runs the external solver command inside the export directory
pub fn run_solver(command: &str, dir: &Path) -> Result<(), BoxingFemError> {
    let mut parts = command.split_whitespace();
    let program = match parts.next() {
        Some(p) => p,
        None => return Ok(()),
    };

    log::info!("running solver: {command}");
    let status = std::process::Command::new(program)
        .args(parts)
        .current_dir(dir)
        .status()
        .map_err(|err| BoxingFemError::io(format!("starting solver {program}"), err))?;

    if !status.success() {
        log::warn!("solver exited with {status}");
    }
    Ok(())
}
