use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoxingFemError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("Mesher error: {0}")]
    MeshEngine(String),
    #[error("Export error: {0}")]
    ExportPrecondition(String),
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BoxingFemError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> BoxingFemError {
        BoxingFemError::Io {
            context: context.into(),
            source,
        }
    }
}
