// SPDX-License-Identifier: MPL-2.0

//! Element factories making up the test pipeline.

use std::path::Path;

use gst::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{CAT, Error, make_element};

/// Name of the video sink linked to the fan-out when the pipeline is built.
pub const FIRST_VIDEO_SINK: &str = "videosink0";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Topology {
    pub source: String,
    pub encoder: String,
    pub decoder: String,
    pub video_sink: String,
    pub audio_sink: String,
    /// Decoder placed in front of branches that force a re-encode.
    pub transcode_decoder: String,
    pub fanout: String,
    pub fanout_name: String,
}

impl Default for Topology {
    fn default() -> Self {
        Topology {
            source: "videotestsrc".into(),
            encoder: "vp8enc".into(),
            decoder: "vp8dec".into(),
            video_sink: "xvimagesink".into(),
            audio_sink: "autoaudiosink".into(),
            transcode_decoder: "theoradec".into(),
            fanout: "agnosticbin".into(),
            fanout_name: "agnostic".into(),
        }
    }
}

impl Topology {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        Topology::from_json(&std::fs::read_to_string(path)?)
    }

    /// Builds `source ! encoder ! fanout`, with the fan-out feeding
    /// `videosink0` directly and a second video sink through `decoder`.
    pub fn build_pipeline(&self) -> Result<gst::Pipeline, Error> {
        let pipeline = gst::Pipeline::with_name("pipeline0");

        let src = make_element(&self.source, None)?;
        if src.find_property("is-live").is_some() {
            src.set_property("is-live", true);
        }
        if src.factory().is_some_and(|f| f.name() == "videotestsrc") {
            src.set_property_from_str("pattern", "ball");
        }

        let encoder = make_element(&self.encoder, None)?;
        let fanout = make_element(&self.fanout, Some(&self.fanout_name))?;
        let videosink0 = make_element(&self.video_sink, Some(FIRST_VIDEO_SINK))?;
        let decoder = make_element(&self.decoder, None)?;
        let videosink = make_element(&self.video_sink, None)?;

        pipeline.add_many([&src, &encoder, &fanout, &videosink0, &decoder, &videosink])?;

        gst::Element::link_many([&src, &encoder, &fanout])?;
        fanout.link(&videosink0)?;
        gst::Element::link_many([&fanout, &decoder, &videosink])?;

        gst::debug!(CAT, obj = &pipeline, "Built pipeline from {self:?}");

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let topology = Topology::from_json(r#"{"video-sink": "fakesink"}"#).unwrap();

        assert_eq!(topology.video_sink, "fakesink");
        assert_eq!(
            topology,
            Topology {
                video_sink: "fakesink".into(),
                ..Topology::default()
            }
        );
    }

    #[test]
    fn unknown_json_field_is_accepted() {
        // Unknown keys are ignored so topology files can carry comments
        let topology = Topology::from_json(r#"{"comment": "x", "fanout": "tee"}"#).unwrap();
        assert_eq!(topology.fanout, "tee");
    }

    #[test]
    fn missing_factory_is_reported() {
        gst::init().unwrap();

        let topology = Topology {
            encoder: "no-such-encoder".into(),
            ..Topology::default()
        };

        match topology.build_pipeline() {
            // The source may be missing too on minimal installs
            Err(Error::MissingElement(name)) => {
                assert!(name == "no-such-encoder" || name == topology.source)
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
