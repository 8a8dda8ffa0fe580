// SPDX-License-Identifier: MPL-2.0

use anyhow::Error;
use clap::Parser;
use gst::glib;
use gst::prelude::*;

use gst_agnosticbin_harness::bus::BusPolicy;
use gst_agnosticbin_harness::resize::{TimedChange, build_pipeline};

#[derive(Parser, Debug)]
#[command(name = "screensize-test")]
#[command(version, about = "Changes the size and bitrate of a running vp8enc", long_about = None)]
struct Cli {
    #[clap(long, default_value = "videotestsrc is-live=true")]
    source: String,
    #[clap(long, default_value = "autovideosink")]
    sink: String,
    /// Resolution change, as SECONDS:WIDTHxHEIGHT
    #[clap(long, value_parser = TimedChange::parse_resize)]
    resize: Vec<TimedChange>,
    /// Bitrate change in bits per second, as SECONDS:BITRATE
    #[clap(long, value_parser = TimedChange::parse_bitrate)]
    bitrate: Vec<TimedChange>,
    /// Stop after this many seconds
    #[clap(long)]
    quit_after: Option<u32>,
}

fn main() -> Result<(), Error> {
    gst::init()?;

    let cli = Cli::parse();

    let (pipeline, control) = build_pipeline(&cli.source, &cli.sink)?;
    let main_loop = glib::MainLoop::new(None, false);

    // No fan-out in this pipeline, errors are only reported
    let _bus_watch = BusPolicy::new("agnosticbin")
        .console(true)
        .watch(&pipeline, &main_loop)?;

    for TimedChange { at, change } in cli.resize.into_iter().chain(cli.bitrate) {
        let control = control.clone();
        glib::timeout_add_seconds_local_once(at, move || {
            println!("setting {change}");
            control.apply(change);
        });
    }

    if let Some(secs) = cli.quit_after {
        let main_loop = main_loop.clone();
        glib::timeout_add_seconds_local_once(secs, move || main_loop.quit());
    }

    pipeline.set_state(gst::State::Playing)?;
    main_loop.run();
    pipeline.set_state(gst::State::Null)?;

    Ok(())
}
