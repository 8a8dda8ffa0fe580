// SPDX-License-Identifier: MPL-2.0
#![allow(unused_doc_comments)]

//! GStreamer element fanning one input out to branches with heterogeneous caps

use gst::glib;

mod agnosticbin;
mod caps;

/**
 * plugin-agnosticbin:
 * @title: Agnostic fan-out bin
 * @short_description: Branch one stream into outputs that each get the format they accept
 *
 * This plugin exposes the `agnosticbin` element. Every requested source pad
 * is fed either directly from the input, from a decoded version of it or
 * from an encoder producing the caps its peer accepts.
 */
fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    agnosticbin::register(plugin)
}

gst::plugin_define!(
    agnosticbin,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    concat!(env!("CARGO_PKG_VERSION"), "-", env!("COMMIT_ID")),
    "MPL-2.0",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
