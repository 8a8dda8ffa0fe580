// SPDX-License-Identifier: MPL-2.0

use gst::glib;
use gst::prelude::*;

mod encoding;
mod imp;

/**
 * SECTION:element-agnosticbin
 *
 * #agnosticbin has one sink pad and any number of `src_%u` request pads.
 * Each source pad gets the input media in the format its peer accepts:
 *
 * - peers accepting the input caps are fed the input as is,
 * - peers accepting raw audio or video are fed the decoded input,
 * - any other peer is fed the output of an encoder, created on demand and
 *   shared between all peers accepting what it produces.
 *
 * Decoding and encoding only run while some branch consumes their output.
 * Pads can be requested, linked, unlinked and released while playing.
 *
 * ## Example launch line
 * ```
 * gst-launch-1.0 videotestsrc is-live=true ! vp8enc ! agnosticbin name=a \
 *     a. ! queue ! vp8dec ! autovideosink \
 *     a. ! queue ! video/x-raw ! videoconvert ! autovideosink
 * ```
 */

glib::wrapper! {
    pub struct AgnosticBin(ObjectSubclass<imp::AgnosticBin>) @extends gst::Bin, gst::Element, gst::Object, @implements gst::ChildProxy;
}

pub fn register(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "agnosticbin",
        gst::Rank::NONE,
        AgnosticBin::static_type(),
    )
}
