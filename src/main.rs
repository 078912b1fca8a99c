use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use boxingfem::{
    assembler,
    boundary::BoundaryPointIndex,
    datatypes::{Rect, Vertex},
    error::BoxingFemError,
    geometry, input,
    mesher::{self, GmshEngine, MeshEngine},
    session::{ExportTarget, ScriptedEvents, Session},
};

/// Meshes a traced part outline and writes solver input tables
#[derive(Parser, Debug)]
#[command(name = "boxingfem", version, about)]
struct Args {
    /// Contour hierarchy traced from the binarized image (json)
    contours: String,

    /// Model metadata, materials and session script (json)
    input: String,

    /// Directory for the solver tables and mesher scratch files
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// gmsh executable
    #[arg(long, default_value = "gmsh")]
    gmsh: String,

    /// Keep the generated .geo and .msh files
    #[arg(long)]
    keep_mesh: bool,

    /// Command run in the output directory after each export
    #[arg(long)]
    solver: Option<String>,

    /// Log level, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn init_logging(level: Option<LevelFilter>) {
    let level = level
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();
}

fn run(args: &Args) -> Result<(), BoxingFemError> {
    let contours = input::load_contours(&args.contours)?;
    let config = input::load_input_file(&args.input)?;

    let scale = config.metadata.scale;
    let characteristic_length = config
        .metadata
        .characteristic_length(contours.width, contours.height);

    log::info!("adding geometry");
    let model = geometry::build(&contours, scale, characteristic_length)?;

    std::fs::create_dir_all(&args.output).map_err(|err| {
        BoxingFemError::io(format!("creating {}", args.output.display()), err)
    })?;

    log::info!("generating mesh");
    let engine = GmshEngine::new(&args.gmsh, &args.output, args.keep_mesh);
    let mesh = engine.generate(&model)?;
    drop(model);

    let nodes = mesher::import_nodes(&mesh);
    let assembly = assembler::assemble(&mesh);

    let extent = Rect::from_corners(
        Vertex::new(0.0, 0.0),
        Vertex::new(
            f64::from(contours.width) * scale,
            f64::from(contours.height) * scale,
        ),
    );
    let boundary = BoundaryPointIndex::build(&mesh, extent);
    if boundary.is_empty() {
        log::warn!("mesh has no boundary lines, selections will be empty");
    }

    let mut session = Session::new(
        nodes,
        assembly,
        boundary,
        &config.materials,
        ExportTarget {
            dir: args.output.clone(),
            solver: args.solver.clone(),
        },
    )?;
    session.run(&mut ScriptedEvents::new(config.session))?;

    log::info!("done after {} exports", session.exports());
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_level);

    if let Err(err) = run(&args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
