use json::JsonValue;

use crate::{
    datatypes::{ContourHierarchy, ContourNode, HierarchyLinks, Material, Vertex},
    error::BoxingFemError,
    session::SessionEvent,
};

/// Default divisor between the shorter image side and the mesh size
pub const DEFAULT_MESH_SIZE_DIVISOR: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub scale: f64,
    pub mesh_size_divisor: f64,
    pub characteristic_length: Option<f64>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        ModelMetadata {
            scale: 1.0,
            mesh_size_divisor: DEFAULT_MESH_SIZE_DIVISOR,
            characteristic_length: None,
        }
    }
}

impl ModelMetadata {
    /// Target element size in mesh units for an image of the given size
    pub fn characteristic_length(&self, width: u32, height: u32) -> f64 {
        match self.characteristic_length {
            Some(cl) => cl,
            None => f64::from(width.min(height)) * self.scale / self.mesh_size_divisor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub metadata: ModelMetadata,
    pub materials: Vec<(usize, Material)>,
    pub session: Vec<SessionEvent>,
}

fn read_json(path: &str, what: &str) -> Result<JsonValue, BoxingFemError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_err) => {
            return Err(BoxingFemError::Input(format!(
                "Unable to open {what} file {path}"
            )))
        }
    };

    match json::parse(&contents) {
        Ok(v) => Ok(v),
        Err(err) => Err(BoxingFemError::Input(format!(
            "Error in {what} file json: {err}"
        ))),
    }
}

/// Reads a point written either as `[x, y]` or OpenCV style `[[x, y]]`
fn parse_point(value: &JsonValue) -> Option<Vertex> {
    let value = if value[0].is_array() { &value[0] } else { value };
    Some(Vertex::new(value[0].as_f64()?, value[1].as_f64()?))
}

fn parse_link(value: &JsonValue, contour: usize, field: &str) -> Result<Option<usize>, BoxingFemError> {
    match value.as_i64() {
        Some(-1) => Ok(None),
        Some(i) if i >= 0 => Ok(Some(i as usize)),
        _ => Err(BoxingFemError::Input(format!(
            "Bad {field} link in hierarchy entry {contour}: {value}"
        ))),
    }
}

/// Parses the contour tracer output into a ContourHierarchy
///
/// # Arguments
/// * `contours_json` - The parsed contour file
///
/// # Returns
/// A ContourHierarchy with unvalidated links; link bounds are checked
/// by the geometry builder.
pub fn parse_contours(contours_json: &JsonValue) -> Result<ContourHierarchy, BoxingFemError> {
    for key in ["width", "height", "contours", "hierarchy"] {
        if !contours_json.has_key(key) {
            return Err(BoxingFemError::Input(format!(
                "Contour file missing {key} field"
            )));
        }
    }

    let width = contours_json["width"].as_u32().unwrap_or(0);
    let height = contours_json["height"].as_u32().unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(BoxingFemError::Input(format!(
            "Image is too small to mesh ({width}x{height})"
        )));
    }

    let contours = &contours_json["contours"];
    let mut hierarchy = &contours_json["hierarchy"];
    // findContours returns the hierarchy wrapped in one extra array
    if hierarchy.len() == 1 && hierarchy[0][0].is_array() {
        hierarchy = &hierarchy[0];
    }

    if contours.is_empty() {
        return Err(BoxingFemError::Input("No contours in contour file".to_owned()));
    }
    if contours.len() != hierarchy.len() {
        return Err(BoxingFemError::Input(format!(
            "Contour file has {} contours but {} hierarchy entries",
            contours.len(),
            hierarchy.len()
        )));
    }

    let mut nodes: Vec<ContourNode> = Vec::with_capacity(contours.len());
    for (i, (contour, info)) in std::iter::zip(contours.members(), hierarchy.members()).enumerate() {
        let mut points: Vec<Vertex> = Vec::with_capacity(contour.len());
        for point in contour.members() {
            match parse_point(point) {
                Some(p) => points.push(p),
                None => {
                    return Err(BoxingFemError::Input(format!(
                        "Non-numeric point {point} in contour {i}"
                    )))
                }
            }
        }

        if info.len() != 4 {
            return Err(BoxingFemError::Input(format!(
                "Hierarchy entry {i} must have 4 links, found {}",
                info.len()
            )));
        }

        let links = HierarchyLinks {
            next_sibling: parse_link(&info[0], i, "next")?,
            prev_sibling: parse_link(&info[1], i, "previous")?,
            first_child: parse_link(&info[2], i, "first child")?,
            parent: parse_link(&info[3], i, "parent")?,
        };

        nodes.push(ContourNode { points, links });
    }

    log::info!(
        "loaded {} contours from a {}x{} image",
        nodes.len(),
        width,
        height
    );

    Ok(ContourHierarchy {
        width,
        height,
        nodes,
    })
}

pub fn load_contours(contour_file: &str) -> Result<ContourHierarchy, BoxingFemError> {
    parse_contours(&read_json(contour_file, "contour")?)
}

fn parse_metadata(input_json: &JsonValue) -> Result<ModelMetadata, BoxingFemError> {
    let mut metadata = ModelMetadata::default();
    let section = &input_json["metadata"];

    if section.has_key("scale") {
        metadata.scale = match section["scale"].as_f64() {
            Some(s) if s > 0.0 => s,
            _ => {
                return Err(BoxingFemError::Input(
                    "metadata.scale must be a positive number".to_owned(),
                ))
            }
        };
    }
    if section.has_key("mesh_size_divisor") {
        metadata.mesh_size_divisor = match section["mesh_size_divisor"].as_f64() {
            Some(d) if d > 0.0 => d,
            _ => {
                return Err(BoxingFemError::Input(
                    "metadata.mesh_size_divisor must be a positive number".to_owned(),
                ))
            }
        };
    }
    if section.has_key("characteristic_length") {
        metadata.characteristic_length = match section["characteristic_length"].as_f64() {
            Some(cl) if cl > 0.0 => Some(cl),
            _ => {
                return Err(BoxingFemError::Input(
                    "metadata.characteristic_length must be a positive number".to_owned(),
                ))
            }
        };
    }

    Ok(metadata)
}

pub(crate) fn parse_material(
    value: &JsonValue,
    context: &str,
) -> Result<(usize, Material), BoxingFemError> {
    let patch = match value["patch"].as_usize() {
        Some(p) => p,
        None => {
            return Err(BoxingFemError::Input(format!(
                "{context} is missing a patch index"
            )))
        }
    };
    let young_modulus = value["young_modulus"].as_f64();
    let poisson_ratio = value["poisson_ratio"].as_f64();

    match (young_modulus, poisson_ratio) {
        (Some(young_modulus), Some(poisson_ratio)) => Ok((
            patch,
            Material {
                young_modulus,
                poisson_ratio,
            },
        )),
        _ => Err(BoxingFemError::Input(format!(
            "{context} for patch {patch} needs young_modulus and poisson_ratio"
        ))),
    }
}

/// Parses the input file: metadata, per-patch materials and the session script
pub fn parse_input(input_json: &JsonValue) -> Result<InputConfig, BoxingFemError> {
    if !input_json.is_object() {
        return Err(BoxingFemError::Input(
            "Input json must be an object".to_owned(),
        ));
    }

    let metadata = parse_metadata(input_json)?;

    let mut materials = Vec::new();
    for (i, entry) in input_json["materials"].members().enumerate() {
        materials.push(parse_material(entry, &format!("Material entry {i}"))?);
    }

    let mut session = Vec::new();
    for (i, entry) in input_json["session"].members().enumerate() {
        session.push(SessionEvent::from_json(entry, i)?);
    }

    log::info!(
        "loaded {} materials and {} session events from input file",
        materials.len(),
        session.len()
    );

    Ok(InputConfig {
        metadata,
        materials,
        session,
    })
}

pub fn load_input_file(input_file: &str) -> Result<InputConfig, BoxingFemError> {
    parse_input(&read_json(input_file, "input")?)
}
