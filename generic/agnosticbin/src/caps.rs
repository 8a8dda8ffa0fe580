// SPDX-License-Identifier: MPL-2.0

use std::sync::LazyLock;

const RAW_AUDIO: &str = "audio/x-raw";
const RAW_VIDEO: &str = "video/x-raw";

const AUDIO: &[&str] = &[
    RAW_AUDIO,
    "audio/x-sbc",
    "audio/x-mulaw",
    "audio/x-flac",
    "audio/x-alaw",
    "audio/x-speex",
    "audio/x-ac3",
    "audio/x-alac",
    "audio/mpeg,mpegversion=1,layer=2",
    "audio/x-nellymoser",
    "audio/x-gst_ff-sonic",
    "audio/x-gst_ff-sonicls",
    "audio/x-wma,wmaversion=1",
    "audio/x-wma,wmaversion=2",
    "audio/x-dpcm,layout=roq",
    "audio/x-adpcm,layout=adx",
    "audio/x-adpcm,layout=g726",
    "audio/x-adpcm,layout=quicktime",
    "audio/x-adpcm,layout=dvi",
    "audio/x-adpcm,layout=microsoft",
    "audio/x-adpcm,layout=swf",
    "audio/x-adpcm,layout=yamaha",
    "audio/mpeg,mpegversion=4",
    "audio/mpeg,mpegversion=1,layer=3",
    "audio/x-celt",
    "audio/mpeg,mpegversion=[2, 4]",
    "audio/x-vorbis",
    "audio/x-opus",
    "audio/AMR,rate=[8000, 16000],channels=1",
    "audio/x-gsm",
];

const VIDEO: &[&str] = &[
    RAW_VIDEO,
    "video/x-dirac",
    "image/png",
    "image/jpeg",
    "video/x-smoke",
    "video/x-asus,asusversion=1",
    "video/x-asus,asusversion=2",
    "image/bmp",
    "video/x-dnxhd",
    "video/x-dv",
    "video/x-ffv,ffvversion=1",
    "video/x-gst_ff-ffvhuff",
    "video/x-flash-screen",
    "video/x-flash-video,flvversion=1",
    "video/x-h261",
    "video/x-h263,variant=itu,h263version=h263",
    "video/x-h263,variant=itu,h263version=h263p",
    "video/x-huffyuv",
    "video/mpeg,mpegversion=1",
    "video/mpeg,mpegversion=2",
    "video/mpeg,mpegversion=4",
    "video/x-msmpeg,msmpegversion=41",
    "video/x-msmpeg,msmpegversion=42",
    "video/x-msmpeg,msmpegversion=43",
    "video/x-gst_ff-pam",
    "image/pbm",
    "video/x-gst_ff-pgm",
    "video/x-gst_ff-pgmyuv",
    "image/ppm",
    "video/x-rle,layout=quicktime",
    "video/x-gst_ff-roqvideo",
    "video/x-pn-realvideo,rmversion=1",
    "video/x-pn-realvideo,rmversion=2",
    "video/x-gst_ff-snow",
    "video/x-svq,svqversion=1",
    "video/x-wmv,wmvversion=1",
    "video/x-wmv,wmvversion=2",
    "video/x-gst_ff-zmbv",
    "video/x-theora",
    "video/x-h264",
    "video/x-gst_ff-libxvid",
    "video/x-xvid",
    "video/mpeg,mpegversion=[1, 2]",
    "video/x-vp8",
    "application/x-yuv4mpeg,y4mversion=2",
];

fn parse(structures: &[&str]) -> gst::Caps {
    structures
        .join("; ")
        .parse::<gst::Caps>()
        .expect("agnostic caps description must be valid")
}

/// Everything `agnosticbin` can take in and hand out.
pub static AGNOSTIC: LazyLock<gst::Caps> = LazyLock::new(|| parse(&[AUDIO, VIDEO].concat()));

pub static RAW_VIDEO_CAPS: LazyLock<gst::Caps> =
    LazyLock::new(|| gst::Caps::new_empty_simple(RAW_VIDEO));

pub static RAW_AUDIO_CAPS: LazyLock<gst::Caps> =
    LazyLock::new(|| gst::Caps::new_empty_simple(RAW_AUDIO));

pub static RAW_CAPS: LazyLock<gst::Caps> = LazyLock::new(|| parse(&[RAW_AUDIO, RAW_VIDEO]));
