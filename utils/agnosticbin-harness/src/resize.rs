// SPDX-License-Identifier: MPL-2.0

//! Encoder pipeline whose output resolution and bitrate change while running.

use std::fmt;
use std::str::FromStr;

use gst::prelude::*;

use crate::{CAT, Error};

pub const MAX_DIMENSION: u32 = 1280;
pub const MIN_BITRATE: u32 = 100;
pub const MAX_BITRATE: u32 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn parse_dimension(value: &str, what: &'static str) -> Result<u32, Error> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (1..=MAX_DIMENSION).contains(v))
        .ok_or_else(|| Error::Invalid {
            what,
            value: value.to_string(),
        })
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s.split_once(['x', 'X']).ok_or_else(|| Error::Invalid {
            what: "resolution",
            value: s.to_string(),
        })?;

        Ok(Resolution {
            width: parse_dimension(width, "width")?,
            height: parse_dimension(height, "height")?,
        })
    }
}

pub fn parse_bitrate(s: &str) -> Result<u32, Error> {
    s.trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (MIN_BITRATE..=MAX_BITRATE).contains(v))
        .ok_or_else(|| Error::Invalid {
            what: "bitrate",
            value: s.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Resolution(Resolution),
    Bitrate(u32),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Change::Resolution(resolution) => write!(f, "caps to {resolution}"),
            Change::Bitrate(bitrate) => write!(f, "bitrate to {bitrate}"),
        }
    }
}

/// A change applied `at` seconds after start, written `T:WxH` or `T:BITRATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedChange {
    pub at: u32,
    pub change: Change,
}

fn split_time(s: &str) -> Result<(u32, &str), Error> {
    let invalid = || Error::Invalid {
        what: "timed change",
        value: s.to_string(),
    };

    let (at, value) = s.split_once(':').ok_or_else(invalid)?;
    let at = at.trim().parse::<u32>().map_err(|_| invalid())?;

    Ok((at, value))
}

impl TimedChange {
    pub fn parse_resize(s: &str) -> Result<Self, Error> {
        let (at, value) = split_time(s)?;
        Ok(TimedChange {
            at,
            change: Change::Resolution(value.parse()?),
        })
    }

    pub fn parse_bitrate(s: &str) -> Result<Self, Error> {
        let (at, value) = split_time(s)?;
        Ok(TimedChange {
            at,
            change: Change::Bitrate(parse_bitrate(value)?),
        })
    }
}

/// Handles on the elements a [`TimedChange`] acts on.
#[derive(Debug, Clone)]
pub struct ResizeControl {
    capsfilter: gst::Element,
    encoder: gst::Element,
}

impl ResizeControl {
    pub fn new(capsfilter: gst::Element, encoder: gst::Element) -> Self {
        ResizeControl {
            capsfilter,
            encoder,
        }
    }

    pub fn set_resolution(&self, resolution: Resolution) {
        let caps = gst::Caps::builder("video/x-raw")
            .field("width", resolution.width as i32)
            .field("height", resolution.height as i32)
            .build();

        gst::info!(CAT, obj = &self.capsfilter, "Restricting to {caps}");
        self.capsfilter.set_property("caps", &caps);
    }

    pub fn set_bitrate(&self, bitrate: u32) {
        gst::info!(CAT, obj = &self.encoder, "Target bitrate {bitrate}");
        self.encoder.set_property("target-bitrate", bitrate as i32);
    }

    pub fn apply(&self, change: Change) {
        match change {
            Change::Resolution(resolution) => self.set_resolution(resolution),
            Change::Bitrate(bitrate) => self.set_bitrate(bitrate),
        }
    }
}

/// Builds `source ! videoscale ! clockoverlay ! capsfilter ! vp8enc ! vp8dec ! sink`
/// with a constant bitrate encoder allowed to follow the requested size.
pub fn build_pipeline(source: &str, sink: &str) -> Result<(gst::Pipeline, ResizeControl), Error> {
    let description = format!(
        "{source} ! videoscale ! clockoverlay ! capsfilter name=caps caps=video/x-raw,height=720 ! \
         vp8enc name=enc end-usage=cbr resize-allowed=true target-bitrate=500000 \
         deadline=200000 threads=1 cpu-used=16 ! vp8dec ! {sink} name=sink"
    );

    let pipeline = gst::parse::launch(&description)?
        .downcast::<gst::Pipeline>()
        .map_err(|_| Error::Invalid {
            what: "pipeline description",
            value: description.clone(),
        })?;

    let by_name = |name: &str| {
        pipeline
            .by_name(name)
            .ok_or_else(|| Error::NoSuchElement(name.to_string()))
    };

    let sink = by_name("sink")?;
    if sink.find_property("sync").is_some() {
        sink.set_property("sync", false);
    }

    let control = ResizeControl::new(by_name("caps")?, by_name("enc")?);

    Ok((pipeline, control))
}
