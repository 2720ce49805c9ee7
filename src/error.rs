use thiserror::Error;

/// Fatal conditions of a run. Data-quality problems in the position table are
/// never reported here, those rows are filtered out instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("column `{column}` not found in {path}")]
    MissingColumn { path: String, column: String },

    #[error("port table {0} has no rows")]
    NoPorts(String),

    #[error("unsupported coordinate reference system `{0}` (expected EPSG:4326 or EPSG:3857)")]
    UnsupportedCrs(String),

    #[error("malformed polygon for port `{port}`: {reason}")]
    MalformedPolygon { port: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
