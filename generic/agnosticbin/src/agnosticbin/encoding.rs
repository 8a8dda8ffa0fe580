// SPDX-License-Identifier: MPL-2.0

use gst::prelude::*;

use crate::caps;

/// Picks an encoder able to output `caps`, highest rank first.
///
/// Only plain one-in one-out encoders are considered, muxing or
/// multi-stream encoders can't sit in a linear branch.
pub fn find_encoder(caps: &gst::Caps) -> Option<gst::ElementFactory> {
    let mut factories = gst::ElementFactory::factories_with_type(
        gst::ElementFactoryType::ENCODER,
        gst::Rank::NONE,
    )
    .into_iter()
    .filter(|factory| factory.num_pad_templates() == 2 && factory.can_src_any_caps(caps))
    .collect::<Vec<_>>();

    factories.sort_by(|a, b| b.rank().cmp(&a.rank()).then_with(|| a.name().cmp(&b.name())));
    factories.into_iter().next()
}

/// Tunes encoders for low latency, the defaults of some of them are meant
/// for offline encoding.
pub fn configure_encoder(encoder: &gst::Element, factory_name: &str) {
    match factory_name {
        "vp8enc" => {
            encoder.set_property("deadline", 1i64);
            encoder.set_property("threads", 1i32);
            encoder.set_property("cpu-used", 16i32);
        }
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "ultrafast");
            encoder.set_property_from_str("tune", "zerolatency");
            encoder.set_property("threads", 1u32);
        }
        _ => (),
    }
}

/// Name of the element converting `raw_caps` into whatever an encoder wants.
pub fn converter_for(raw_caps: &gst::Caps) -> &'static str {
    if raw_caps.can_intersect(&caps::RAW_VIDEO_CAPS) {
        "videoconvert"
    } else if raw_caps.can_intersect(&caps::RAW_AUDIO_CAPS) {
        "audioconvert"
    } else {
        "identity"
    }
}

/// Framerate enforced after decoding video, the decoded one if known.
pub fn decoded_framerate(caps: &gst::Caps) -> gst::Fraction {
    let fallback = gst::Fraction::new(15, 1);

    if !caps.is_fixed() || caps.size() != 1 {
        return fallback;
    }

    caps.structure(0)
        .and_then(|s| s.get::<gst::Fraction>("framerate").ok())
        .filter(|framerate| framerate.numer() != 0)
        .unwrap_or(fallback)
}
