// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Error;
use clap::Parser;
use gst::glib;
use gst::prelude::*;

use gst_agnosticbin_harness::bus::BusPolicy;
use gst_agnosticbin_harness::dump_graph;
use gst_agnosticbin_harness::scenario::{Context, Scenario};
use gst_agnosticbin_harness::topology::Topology;

#[derive(Parser, Debug)]
#[command(name = "agnosticbin-test")]
#[command(version, about = "Attaches and detaches agnosticbin branches on a timeline", long_about = None)]
struct Cli {
    /// JSON file overriding the element factories
    #[clap(long)]
    topology: Option<PathBuf>,
    /// JSON file with the steps to run instead of the built-in timeline
    #[clap(long)]
    scenario: Option<PathBuf>,
    #[clap(long)]
    video_sink: Option<String>,
    #[clap(long)]
    audio_sink: Option<String>,
    /// Stop after this many seconds
    #[clap(long)]
    quit_after: Option<u32>,
    /// Stop on errors that do not come from a video sink
    #[clap(long, action)]
    quit_on_error: bool,
}

fn main() -> Result<(), Error> {
    gst::init()?;
    gstagnosticbin::plugin_register_static()?;

    let cli = Cli::parse();

    let mut topology = match &cli.topology {
        Some(path) => Topology::from_path(path)?,
        None => Topology::default(),
    };
    if let Some(video_sink) = cli.video_sink {
        topology.video_sink = video_sink;
    }
    if let Some(audio_sink) = cli.audio_sink {
        topology.audio_sink = audio_sink;
    }

    let scenario = match &cli.scenario {
        Some(path) => Scenario::from_path(path)?,
        None => Scenario::default(),
    };

    let pipeline = topology.build_pipeline()?;
    let main_loop = glib::MainLoop::new(None, false);

    let _bus_watch = BusPolicy::for_topology(&topology)
        .quit_on_error(cli.quit_on_error)
        .console(true)
        .watch(&pipeline, &main_loop)?;

    pipeline.set_state(gst::State::Playing)?;
    dump_graph(&pipeline, "playing");

    let ctx = Rc::new(Context {
        pipeline: pipeline.clone(),
        topology,
        main_loop: main_loop.clone(),
        console: true,
    });
    scenario.schedule(&ctx);

    if let Some(secs) = cli.quit_after {
        let main_loop = main_loop.clone();
        glib::timeout_add_seconds_local_once(secs, move || main_loop.quit());
    }

    main_loop.run();

    dump_graph(&pipeline, "end");
    pipeline.set_state(gst::State::Null)?;

    Ok(())
}
