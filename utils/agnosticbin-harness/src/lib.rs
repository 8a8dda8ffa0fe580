// SPDX-License-Identifier: MPL-2.0

//! Helpers for driving `agnosticbin` pipelines by hand.
//!
//! A pipeline is built from a [`topology::Topology`], branches are attached
//! and detached on a [`scenario::Scenario`] timeline and failing sinks are
//! taken out of the pipeline by a [`bus::BusPolicy`], leaving the rest of the
//! pipeline running.

use std::sync::LazyLock;

pub mod branch;
pub mod bus;
mod error;
pub mod resize;
pub mod scenario;
pub mod topology;

pub use error::Error;

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "agnosticbin-harness",
        gst::DebugColorFlags::empty(),
        Some("agnosticbin test harness"),
    )
});

/// Creates an element, telling apart missing plugins from other failures.
pub fn make_element(factory: &str, name: Option<&str>) -> Result<gst::Element, Error> {
    if gst::ElementFactory::find(factory).is_none() {
        return Err(Error::MissingElement(factory.to_string()));
    }

    let mut builder = gst::ElementFactory::make(factory);
    if let Some(name) = name {
        builder = builder.name(name);
    }

    Ok(builder.build()?)
}

/// Writes a timestamped graph of `pipeline`, only if `GST_DEBUG_DUMP_DOT_DIR` is set.
pub fn dump_graph(pipeline: &gst::Pipeline, name: &str) {
    use gst::prelude::*;

    pipeline.debug_to_dot_file_with_ts(gst::DebugGraphDetails::ALL, name);
}
