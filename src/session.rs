use std::{collections::VecDeque, path::PathBuf};

use json::JsonValue;

use crate::{
    assembler::{Assembly, PatchLegend},
    boundary::BoundaryPointIndex,
    datatypes::{Element, Material, Node, Vertex},
    error::BoxingFemError,
    export::{self, ExportTables, MaterialTable},
    input::parse_material,
    selection::{Command, SelectionEngine},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SelectStart(Vertex),
    PointerMove(Vertex),
    SelectEnd(Vertex),
    Command(Command),
    SetMaterial { patch: usize, material: Material },
    Export,
    Quit,
}

impl SessionEvent {
    fn point(value: &JsonValue, name: &str, index: usize) -> Result<Vertex, BoxingFemError> {
        match (value["x"].as_f64(), value["y"].as_f64()) {
            (Some(x), Some(y)) => Ok(Vertex::new(x, y)),
            _ => Err(BoxingFemError::Input(format!(
                "Session event {index} ({name}) needs numeric x and y"
            ))),
        }
    }

    /// Parses one entry of the input file's `session` list
    pub fn from_json(value: &JsonValue, index: usize) -> Result<SessionEvent, BoxingFemError> {
        let name = match value["event"].as_str() {
            Some(n) => n,
            None => {
                return Err(BoxingFemError::Input(format!(
                    "Session event {index} is missing its event field"
                )))
            }
        };

        let event = match name {
            "select_start" => SessionEvent::SelectStart(Self::point(value, name, index)?),
            "pointer_move" => SessionEvent::PointerMove(Self::point(value, name, index)?),
            "select_end" => SessionEvent::SelectEnd(Self::point(value, name, index)?),
            "apply_x" => SessionEvent::Command(Command::ApplyXConstraint),
            "apply_y" => SessionEvent::Command(Command::ApplyYConstraint),
            "clear_constraints" => SessionEvent::Command(Command::ClearConstraints),
            "apply_force" => match (value["fx"].as_f64(), value["fy"].as_f64()) {
                (Some(fx), Some(fy)) => SessionEvent::Command(Command::ApplyForce { fx, fy }),
                _ => {
                    return Err(BoxingFemError::Input(format!(
                        "Session event {index} (apply_force) needs numeric fx and fy"
                    )))
                }
            },
            "clear_force" => SessionEvent::Command(Command::ClearForce),
            "set_material" => {
                let (patch, material) = parse_material(value, &format!("Session event {index}"))?;
                SessionEvent::SetMaterial { patch, material }
            }
            "export" => SessionEvent::Export,
            "quit" => SessionEvent::Quit,
            other => {
                return Err(BoxingFemError::Input(format!(
                    "Session event {index} has unknown event {other}"
                )))
            }
        };
        Ok(event)
    }
}

/// Pending interaction, polled once per loop iteration
pub trait EventSource {
    /// `None` once the source is exhausted
    fn poll(&mut self) -> Option<SessionEvent>;
}

/// Replays a recorded event list, one event per frame
pub struct ScriptedEvents {
    events: VecDeque<SessionEvent>,
}

impl ScriptedEvents {
    pub fn new(events: Vec<SessionEvent>) -> ScriptedEvents {
        ScriptedEvents {
            events: events.into(),
        }
    }
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Finished,
}

/// Where exports go and what runs after them
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTarget {
    pub dir: PathBuf,
    pub solver: Option<String>,
}

/// Editing state from mesh import until the last export
pub struct Session {
    lifecycle: Lifecycle,
    nodes: Vec<Node>,
    elements: Vec<Element>,
    legend: Vec<PatchLegend>,
    boundary: BoundaryPointIndex,
    selection: SelectionEngine,
    materials: MaterialTable,
    target: ExportTarget,
    exports: usize,
}

impl Session {
    /// # Arguments
    /// * `nodes` - Imported mesh nodes
    /// * `assembly` - Assembled elements and their patch legend
    /// * `boundary` - Index over the boundary nodes
    /// * `materials` - Materials given up front, by patch
    /// * `target` - Export directory and optional solver command
    pub fn new(
        nodes: Vec<Node>,
        assembly: Assembly,
        boundary: BoundaryPointIndex,
        materials: &[(usize, Material)],
        target: ExportTarget,
    ) -> Result<Session, BoxingFemError> {
        let patch_count = assembly.patch_count();
        let mut table = MaterialTable::with_defaults(patch_count);
        let mut given = vec![false; patch_count];

        for (patch, material) in materials {
            if *patch >= patch_count {
                return Err(BoxingFemError::Input(format!(
                    "material given for patch {patch}, but the mesh has {patch_count} patches"
                )));
            }
            table.set(*patch, *material);
            given[*patch] = true;
        }
        for entry in assembly.legend.iter().filter(|l| !given[l.material_index]) {
            log::warn!(
                "{} (mesh block {}, {} elements) has no material, using E = 1, nu = 1",
                entry.label,
                entry.cell_block,
                entry.element_count
            );
        }

        Ok(Session {
            lifecycle: Lifecycle::Running,
            nodes,
            elements: assembly.elements,
            legend: assembly.legend,
            boundary,
            selection: SelectionEngine::new(),
            materials: table,
            target,
            exports: 0,
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn boundary(&self) -> &BoundaryPointIndex {
        &self.boundary
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn exports(&self) -> usize {
        self.exports
    }

    /// One loop iteration: update the selection, re-query, then apply
    pub fn step(&mut self, event: Option<SessionEvent>) -> Result<(), BoxingFemError> {
        let event = match event {
            Some(e) => e,
            None => {
                self.lifecycle = Lifecycle::Finished;
                return Ok(());
            }
        };
        log::debug!("session event {event:?}");

        let mut command = None;
        match event {
            SessionEvent::SelectStart(p) => self.selection.begin(p),
            SessionEvent::PointerMove(p) => self.selection.move_to(p),
            SessionEvent::SelectEnd(p) => self.selection.end(p),
            SessionEvent::Command(c) => command = Some(c),
            SessionEvent::SetMaterial { patch, material } => {
                if patch < self.legend.len() {
                    self.materials.set(patch, material);
                } else {
                    log::warn!("ignoring material for unknown patch {patch}");
                }
            }
            SessionEvent::Export => {
                self.export()?;
            }
            SessionEvent::Quit => self.lifecycle = Lifecycle::Finished,
        }

        if self.selection.rect().is_some() {
            self.selection.refresh(&self.boundary);
        }
        if let Some(command) = command {
            self.selection.apply(command, &mut self.boundary);
        }

        Ok(())
    }

    /// Polls `source` until it is exhausted or asks to quit
    ///
    /// Exports once on the way out if nothing was exported during the session.
    pub fn run<S: EventSource>(&mut self, source: &mut S) -> Result<(), BoxingFemError> {
        while self.lifecycle == Lifecycle::Running {
            self.step(source.poll())?;
        }
        if self.exports == 0 {
            self.export()?;
        }
        Ok(())
    }

    pub fn tables(&self) -> Result<ExportTables, BoxingFemError> {
        export::export(
            &self.nodes,
            &self.elements,
            self.boundary.points(),
            &self.materials,
        )
    }

    /// Builds and writes the solver tables, then runs the solver if one is set
    pub fn export(&mut self) -> Result<ExportTables, BoxingFemError> {
        let tables = self.tables()?;
        tables.write(&self.target.dir)?;
        if let Some(solver) = &self.target.solver {
            export::run_solver(solver, &self.target.dir)?;
        }
        self.exports += 1;
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::{self, tests::three_triangles},
        datatypes::{Constraint, Rect},
        export::{LOADS_FILE, MATERIALS_FILE, NODES_FILE},
        mesher,
    };

    fn session(dir: &std::path::Path, materials: &[(usize, Material)]) -> Session {
        let mesh = three_triangles();
        let boundary = BoundaryPointIndex::build(
            &mesh,
            Rect::from_corners(Vertex::new(0.0, 0.0), Vertex::new(30.0, 10.0)),
        );
        Session::new(
            mesher::import_nodes(&mesh),
            assembler::assemble(&mesh),
            boundary,
            materials,
            ExportTarget {
                dir: dir.to_path_buf(),
                solver: None,
            },
        )
        .unwrap()
    }

    fn events(json_text: &str) -> Vec<SessionEvent> {
        let value = json::parse(json_text).unwrap();
        value
            .members()
            .enumerate()
            .map(|(i, v)| SessionEvent::from_json(v, i).unwrap())
            .collect()
    }

    #[test]
    fn parses_every_event_kind() {
        let parsed = events(
            r#"[
                {"event": "select_start", "x": 1, "y": 2},
                {"event": "pointer_move", "x": 3, "y": 4},
                {"event": "select_end", "x": 5, "y": 6},
                {"event": "apply_x"}, {"event": "apply_y"},
                {"event": "clear_constraints"},
                {"event": "apply_force", "fx": 1.5, "fy": -2},
                {"event": "clear_force"},
                {"event": "set_material", "patch": 0, "young_modulus": 7, "poisson_ratio": 0.2},
                {"event": "export"}, {"event": "quit"}
            ]"#,
        );
        assert_eq!(parsed.len(), 11);
        assert_eq!(parsed[0], SessionEvent::SelectStart(Vertex::new(1.0, 2.0)));
        assert_eq!(
            parsed[6],
            SessionEvent::Command(Command::ApplyForce { fx: 1.5, fy: -2.0 })
        );
        assert_eq!(parsed[10], SessionEvent::Quit);
    }

    #[test]
    fn unknown_event_is_an_input_error() {
        let value = json::parse(r#"{"event": "undo"}"#).unwrap();
        assert!(matches!(
            SessionEvent::from_json(&value, 0),
            Err(BoxingFemError::Input(_))
        ));
        let value = json::parse(r#"{"event": "select_start", "x": 1}"#).unwrap();
        assert!(SessionEvent::from_json(&value, 0).is_err());
    }

    #[test]
    fn x_constraint_on_two_points_reaches_node_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path(), &[]);

        // nodes 0 (0, 0) and 1 (4, 0) of the first triangle
        let mut source = ScriptedEvents::new(events(
            r#"[
                {"event": "select_start", "x": -1, "y": -1},
                {"event": "pointer_move", "x": 2, "y": 0.5},
                {"event": "pointer_move", "x": 5, "y": 1},
                {"event": "select_end", "x": 5, "y": 1},
                {"event": "apply_x"},
                {"event": "export"},
                {"event": "quit"},
                {"event": "apply_y"}
            ]"#,
        ));
        s.run(&mut source).unwrap();

        assert_eq!(s.lifecycle(), Lifecycle::Finished);
        assert_eq!(s.exports(), 1);
        // the event after quit was never polled
        assert!(source.poll().is_some());

        let nodes = std::fs::read_to_string(dir.path().join(NODES_FILE)).unwrap();
        let fixed: Vec<usize> = nodes
            .lines()
            .filter(|l| l.split_whitespace().nth(3) == Some("-1"))
            .map(|l| l.split_whitespace().next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(fixed, vec![0, 1]);
        assert!(nodes
            .lines()
            .all(|l| l.split_whitespace().nth(4) == Some("0")));
    }

    #[test]
    fn selection_stays_live_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path(), &[]);

        s.step(Some(SessionEvent::SelectStart(Vertex::new(9.0, -1.0)))).unwrap();
        s.step(Some(SessionEvent::SelectEnd(Vertex::new(15.0, 4.0)))).unwrap();
        assert_eq!(s.selection().selected().len(), 3);

        s.step(Some(SessionEvent::Command(Command::ApplyForce { fx: 0.0, fy: -5.0 })))
            .unwrap();
        s.step(Some(SessionEvent::Command(Command::ApplyYConstraint)))
            .unwrap();

        let loaded = s.boundary().points().iter().filter(|p| p.is_loaded()).count();
        assert_eq!(loaded, 3);
        let tables = s.tables().unwrap();
        assert_eq!(tables.loads.len(), 3);
        assert!(tables
            .nodes
            .iter()
            .filter(|n| n.y_constraint == Constraint::Fixed)
            .all(|n| (10.0..=14.0).contains(&n.vertex.x)));
    }

    #[test]
    fn exhausted_source_exports_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(
            dir.path(),
            &[(
                2,
                Material {
                    young_modulus: 9.0,
                    poisson_ratio: 0.25,
                },
            )],
        );
        s.run(&mut ScriptedEvents::new(Vec::new())).unwrap();

        assert_eq!(s.exports(), 1);
        let mater = std::fs::read_to_string(dir.path().join(MATERIALS_FILE)).unwrap();
        assert_eq!(mater.lines().count(), 3);
        assert_eq!(mater.lines().nth(2), Some("9.000000 0.250000"));
        let loads = std::fs::read_to_string(dir.path().join(LOADS_FILE)).unwrap();
        assert!(loads.is_empty());
    }

    #[test]
    fn material_events_update_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path(), &[]);
        let material = Material {
            young_modulus: 70e9,
            poisson_ratio: 0.33,
        };
        s.step(Some(SessionEvent::SetMaterial { patch: 1, material }))
            .unwrap();
        s.step(Some(SessionEvent::SetMaterial { patch: 7, material }))
            .unwrap();

        assert_eq!(s.materials().get(1), Some(&material));
        assert!(s.materials().get(2).is_some());
        assert!(s.materials().get(7).is_none());
    }

    #[test]
    fn material_for_missing_patch_is_rejected() {
        let mesh = three_triangles();
        let boundary = BoundaryPointIndex::build(
            &mesh,
            Rect::from_corners(Vertex::new(0.0, 0.0), Vertex::new(30.0, 10.0)),
        );
        let result = Session::new(
            mesher::import_nodes(&mesh),
            assembler::assemble(&mesh),
            boundary,
            &[(3, Material::default())],
            ExportTarget {
                dir: PathBuf::from("unused"),
                solver: None,
            },
        );
        assert!(matches!(result, Err(BoxingFemError::Input(_))));
    }
}
