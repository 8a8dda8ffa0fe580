// SPDX-License-Identifier: MPL-2.0

//! Timeline of branch changes applied to a running pipeline.

use std::path::Path;
use std::rc::Rc;

use gst::glib;
use serde::{Deserialize, Serialize};

use crate::branch::{attach_chain, attach_sink, detach_sink};
use crate::topology::{FIRST_VIDEO_SINK, Topology};
use crate::{CAT, Error, dump_graph};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Attaches a video sink called `name`, detaching it again after
    /// `detach_after` seconds if set.
    ConnectSink {
        name: String,
        #[serde(default, rename = "detach-after")]
        detach_after: Option<u32>,
    },
    /// Attaches the transcode decoder followed by a video sink.
    ConnectChain,
    ConnectAudioSink,
    Disconnect {
        name: String,
    },
    Quit,
}

impl Action {
    /// Prefix of the graphs dumped around the action.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::ConnectSink { .. } => "videosink",
            Action::ConnectChain => "encvideosink",
            Action::ConnectAudioSink => "audiosink",
            Action::Disconnect { .. } => "removevideosink",
            Action::Quit => "quit",
        }
    }

    pub fn apply(&self, ctx: &Rc<Context>) -> Result<(), Error> {
        let topology = &ctx.topology;
        let pipeline = &ctx.pipeline;

        dump_graph(pipeline, &format!("{}0", self.tag()));

        match self {
            Action::ConnectSink { name, detach_after } => {
                attach_sink(
                    pipeline,
                    &topology.fanout_name,
                    &topology.video_sink,
                    Some(name),
                )?;

                if let Some(secs) = detach_after.filter(|secs| *secs > 0) {
                    schedule_action(ctx, secs, Action::Disconnect { name: name.clone() });
                }
            }
            Action::ConnectChain => {
                attach_chain(
                    pipeline,
                    &topology.fanout_name,
                    &[&topology.transcode_decoder, &topology.video_sink],
                    None,
                )?;
            }
            Action::ConnectAudioSink => {
                attach_sink(pipeline, &topology.fanout_name, &topology.audio_sink, None)?;
            }
            Action::Disconnect { name } => {
                if let Some(removal) = detach_sink(pipeline, name, &topology.fanout)? {
                    gst::info!(CAT, "Detached {name}: {removal:?}");
                }
            }
            Action::Quit => ctx.main_loop.quit(),
        }

        dump_graph(pipeline, &format!("{}1", self.tag()));

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Step {
    /// Seconds after scheduling.
    pub at: u32,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Scenario {
    pub steps: Vec<Step>,
}

impl Default for Scenario {
    fn default() -> Self {
        let connect = |at, name: &str, detach_after| Step {
            at,
            action: Action::ConnectSink {
                name: name.into(),
                detach_after,
            },
        };

        Scenario {
            steps: vec![
                connect(2, "videosink1", Some(4)),
                Step {
                    at: 2,
                    action: Action::ConnectChain,
                },
                Step {
                    at: 4,
                    action: Action::ConnectAudioSink,
                },
                Step {
                    at: 10,
                    action: Action::Disconnect {
                        name: FIRST_VIDEO_SINK.into(),
                    },
                },
                connect(16, "videosink3", None),
                Step {
                    at: 18,
                    action: Action::ConnectChain,
                },
            ],
        }
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        Scenario::from_json(&std::fs::read_to_string(path)?)
    }

    /// Arms a one-shot timer per step on the thread default main context.
    pub fn schedule(&self, ctx: &Rc<Context>) {
        for step in &self.steps {
            schedule_action(ctx, step.at, step.action.clone());
        }
    }
}

/// Everything the actions operate on.
#[derive(Debug)]
pub struct Context {
    pub pipeline: gst::Pipeline,
    pub topology: Topology,
    pub main_loop: glib::MainLoop,
    /// Report failed actions on stderr too.
    pub console: bool,
}

fn schedule_action(ctx: &Rc<Context>, secs: u32, action: Action) {
    let ctx = ctx.clone();

    glib::timeout_add_seconds_local_once(secs, move || {
        gst::debug!(CAT, "Running {action:?}");

        if let Err(err) = action.apply(&ctx) {
            gst::error!(CAT, "{action:?} failed: {err}");
            if ctx.console {
                eprintln!("Failed to {}: {err}", action.tag());
            }
        }
    });
}
