use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to open video source: {path}")]
    InputOpen { path: String },

    #[error("unable to create video writer: {path}")]
    OutputCreate { path: String },

    #[error("Detector Error: {0}")]
    Detector(String),

    #[error("Optical Flow Error: {0}")]
    Flow(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Yaml Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "video")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}
