use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Malformed backend reply: {0}")]
    ProtocolParse(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serial write did not complete within {0:?}")]
    DeviceWriteTimeout(Duration),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
