use crate::camera::Parameter;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamrelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("System error: {message}")]
    System { message: String },
}

impl CamrelayError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failures reported by a camera collaborator
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera device failure: {details}")]
    Device { details: String },

    #[error("Camera is closed")]
    Closed,

    #[error("Parameter {parameter} is not supported by this camera")]
    UnsupportedParameter { parameter: Parameter },

    #[error("Parameter {parameter} value {value} outside [{min}, {max}]")]
    OutOfRange {
        parameter: Parameter,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Parameter {parameter} is under automatic control")]
    AutoControlled { parameter: Parameter },

    #[error("Parameter {parameter} is read-only")]
    ReadOnly { parameter: Parameter },
}

/// Failures of the shared mapping or its mutexes
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Failed to map {bytes} bytes of shared memory: {source}")]
    Map {
        bytes: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialise {lock}: errno {errno}")]
    LockInit { lock: &'static str, errno: i32 },

    #[error("Failed to acquire {lock}: errno {errno}")]
    Lock { lock: &'static str, errno: i32 },

    #[error("{lock} was recovered from a dead owner but could not be made consistent: errno {errno}")]
    Unrecoverable { lock: &'static str, errno: i32 },

    #[error("Invalid exchange geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Frame of {actual} samples does not fit a slot of {expected} samples")]
    SlotSize { expected: usize, actual: usize },
}

/// Invalid frame shapes and mismatches found while reshaping
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Frame geometry {height}x{width}x{channels} has a zero dimension")]
    Empty {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Cannot reshape {actual} samples into {height}x{width}x{channels}")]
    Reshape {
        actual: usize,
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Frame geometry {height}x{width}x{channels} is too large to address")]
    TooLarge {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Unsupported channel count {channels} for image output")]
    Channels { channels: usize },
}

/// Failures of the presentation sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write {path}: {details}")]
    Write { path: String, details: String },

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Frame cannot be rendered: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Input polling failed: {0}")]
    Input(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CamrelayError>;
