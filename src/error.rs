use std::io;

use thiserror::Error;

use crate::convert::{ConversionFault, Tier};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("scene JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A font family's outline resource could not be resolved.
    #[error("font resource for '{family}' unavailable: {reason}")]
    FontResource { family: String, reason: String },

    #[error("font data for '{family}' could not be parsed: {reason}")]
    FontParse { family: String, reason: String },

    /// A text primitive reached the vector serializer without being vectorized.
    #[error("object '{0}' is still live text at serialization time")]
    LiveText(String),

    #[error("page snapshot failed: {0}")]
    Snapshot(String),

    #[error("page {page} could not be converted ({})", describe_faults(.faults))]
    Conversion {
        page: usize,
        faults: Vec<(Tier, ConversionFault)>,
    },

    #[error("page {page} failed: {reason}")]
    PageFailed { page: usize, reason: String },

    #[error("export cancelled: unsupported glyphs were not accepted")]
    Cancelled,

    #[error("page {0} does not exist")]
    UnknownPage(usize),

    #[error("export request contains no pages")]
    EmptyRequest,

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn describe_faults(faults: &[(Tier, ConversionFault)]) -> String {
    faults
        .iter()
        .map(|(tier, fault)| format!("{tier}: {fault}"))
        .collect::<Vec<_>>()
        .join("; ")
}
