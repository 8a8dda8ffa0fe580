// SPDX-License-Identifier: MPL-2.0

use gst::glib;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No element factory named {0:?}, is the plugin installed?")]
    MissingElement(String),
    #[error("No element named {0:?} in the pipeline")]
    NoSuchElement(String),
    #[error("Invalid {what}: {value:?}")]
    Invalid { what: &'static str, value: String },
    #[error(transparent)]
    Glib(#[from] glib::BoolError),
    #[error("Failed to parse pipeline: {0}")]
    Parse(#[from] glib::Error),
    #[error(transparent)]
    StateChange(#[from] gst::StateChangeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
