use boxingfem::{
    assembler::{self, signed_area},
    boundary::BoundaryPointIndex,
    datatypes::{Mesh, PlanarModel, Rect, Vertex},
    error::BoxingFemError,
    export::{ELEMENTS_FILE, LOADS_FILE, MATERIALS_FILE, NODES_FILE},
    geometry, input,
    mesher::{self, MeshEngine},
    session::{ExportTarget, ScriptedEvents, Session},
};

/// Two unit squares three units apart, each its own surface
const TWO_SQUARES_MSH: &str = "\
$MeshFormat
4.1 0 8
$EndMeshFormat
$Nodes
2 8 1 8
2 1 0 4
1
2
3
4
0 0 0
1 0 0
1 1 0
0 1 0
2 2 0 4
5
6
7
8
3 0 0
4 0 0
4 1 0
3 1 0
$EndNodes
$Elements
4 12 1 12
1 1 1 4
1 1 2
2 2 3
3 3 4
4 4 1
2 1 2 2
5 1 3 2
6 1 4 3
1 2 1 4
7 5 6
8 6 7
9 7 8
10 8 5
2 2 2 2
11 5 7 6
12 5 8 7
$EndElements
";

/// Stands in for gmsh with a fixed answer
struct CannedMesh(&'static str);

impl MeshEngine for CannedMesh {
    fn generate(&self, model: &PlanarModel) -> Result<Mesh, BoxingFemError> {
        assert!(!model.surfaces.is_empty());
        let mesh = mesher::parse_msh(self.0)?;
        mesher::check_mesh(&mesh)?;
        Ok(mesh)
    }
}

fn rows(path: &std::path::Path) -> Vec<Vec<f64>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
        .collect()
}

#[test]
fn contours_to_solver_tables() {
    let contours = input::parse_contours(
        &json::parse(
            r#"{
                "width": 5, "height": 2,
                "contours": [
                    [[0, 0], [1, 0], [1, 1], [0, 1]],
                    [[3, 0], [4, 0], [4, 1], [3, 1]]
                ],
                "hierarchy": [[1, -1, -1, -1], [-1, 0, -1, -1]]
            }"#,
        )
        .unwrap(),
    )
    .unwrap();
    let config = input::parse_input(
        &json::parse(
            r#"{
                "metadata": {"characteristic_length": 0.5},
                "materials": [{"patch": 1, "young_modulus": 210, "poisson_ratio": 0.3}],
                "session": [
                    {"event": "select_start", "x": -0.5, "y": -0.5},
                    {"event": "select_end", "x": 0.5, "y": 1.5},
                    {"event": "apply_x"},
                    {"event": "apply_y"},
                    {"event": "select_start", "x": 3.5, "y": -0.5},
                    {"event": "pointer_move", "x": 4.5, "y": 1.5},
                    {"event": "apply_force", "fx": 0, "fy": -100},
                    {"event": "select_end", "x": 4.5, "y": 1.5},
                    {"event": "export"},
                    {"event": "quit"}
                ]
            }"#,
        )
        .unwrap(),
    )
    .unwrap();

    let model = geometry::build(
        &contours,
        config.metadata.scale,
        config.metadata.characteristic_length(contours.width, contours.height),
    )
    .unwrap();
    assert_eq!(model.surfaces.len(), 2);
    assert_eq!(model.characteristic_length, 0.5);

    let mesh = CannedMesh(TWO_SQUARES_MSH).generate(&model).unwrap();
    let nodes = mesher::import_nodes(&mesh);
    let assembly = assembler::assemble(&mesh);
    for element in &assembly.elements {
        let [a, b, c] = element.nodes.map(|n| mesh.points[n]);
        assert!(signed_area(&a, &b, &c) > 0.0);
    }

    let boundary = BoundaryPointIndex::build(
        &mesh,
        Rect::from_corners(Vertex::new(0.0, 0.0), Vertex::new(5.0, 2.0)),
    );
    assert_eq!(boundary.len(), 8);

    let dir = tempfile::tempdir().unwrap();
    let element_count = assembly.elements.len();
    let mut session = Session::new(
        nodes,
        assembly,
        boundary,
        &config.materials,
        ExportTarget {
            dir: dir.path().to_path_buf(),
            solver: None,
        },
    )
    .unwrap();
    session
        .run(&mut ScriptedEvents::new(config.session))
        .unwrap();
    assert_eq!(session.exports(), 1);

    let loaded = session
        .boundary()
        .points()
        .iter()
        .filter(|p| p.is_loaded())
        .count();

    let node_rows = rows(&dir.path().join(NODES_FILE));
    let element_rows = rows(&dir.path().join(ELEMENTS_FILE));
    let load_rows = rows(&dir.path().join(LOADS_FILE));
    let material_rows = rows(&dir.path().join(MATERIALS_FILE));

    assert_eq!(node_rows.len(), mesh.points.len());
    assert_eq!(element_rows.len(), element_count);
    assert_eq!(load_rows.len(), loaded);
    assert_eq!(load_rows.len(), 2);
    assert_eq!(material_rows, vec![vec![1.0, 1.0], vec![210.0, 0.3]]);

    // nodes 0 (0, 0) and 3 (0, 1) are pinned in both directions
    let pinned: Vec<f64> = node_rows
        .iter()
        .filter(|r| r[3] == -1.0 && r[4] == -1.0)
        .map(|r| r[0])
        .collect();
    assert_eq!(pinned, vec![0.0, 3.0]);

    // the force landed on the right edge of the second square
    let loaded_nodes: Vec<f64> = load_rows.iter().map(|r| r[0]).collect();
    assert_eq!(loaded_nodes, vec![5.0, 6.0]);
    assert!(load_rows.iter().all(|r| r[2] == -100.0));

    let material_indexes: Vec<f64> = element_rows.iter().map(|r| r[2]).collect();
    assert_eq!(material_indexes, vec![0.0, 0.0, 1.0, 1.0]);
}
