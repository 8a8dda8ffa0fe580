// SPDX-License-Identifier: MPL-2.0

//! Bus handling: stop on end-of-stream, report errors and drop the branches
//! of sinks that failed.

use gst::glib;
use gst::prelude::*;

use crate::branch::{Removal, remove_branch};
use crate::topology::Topology;
use crate::{CAT, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

#[derive(Debug, Clone)]
pub struct BusPolicy {
    fanout_factory: String,
    recoverable: Vec<String>,
    quit_on_error: bool,
    console: bool,
}

impl BusPolicy {
    pub fn new(fanout_factory: impl Into<String>) -> Self {
        BusPolicy {
            fanout_factory: fanout_factory.into(),
            recoverable: Vec::new(),
            quit_on_error: false,
            console: false,
        }
    }

    /// Errors from the video sinks of `topology` remove their branch.
    pub fn for_topology(topology: &Topology) -> Self {
        BusPolicy::new(&topology.fanout).recover(&topology.video_sink)
    }

    /// Errors posted by elements of `factory` remove the failing branch
    /// instead of stopping the pipeline.
    pub fn recover(mut self, factory: impl Into<String>) -> Self {
        self.recoverable.push(factory.into());
        self
    }

    pub fn quit_on_error(mut self, quit_on_error: bool) -> Self {
        self.quit_on_error = quit_on_error;
        self
    }

    /// Also reports end-of-stream and errors on stdout/stderr.
    pub fn console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn handle(&self, msg: &gst::Message) -> Outcome {
        use gst::MessageView;

        match msg.view() {
            MessageView::Eos(..) => {
                gst::info!(CAT, "End-of-stream");
                if self.console {
                    println!("End-of-stream");
                }
                Outcome::Quit
            }
            MessageView::Error(err) => {
                let debug = err.debug();
                let debug = debug.as_deref().unwrap_or("");

                gst::error!(
                    CAT,
                    "Error from {:?}: {}: {debug}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                );
                if self.console {
                    eprintln!("Error: {}: {debug}", err.error());
                }

                let failing = msg
                    .src()
                    .and_then(|src| src.downcast_ref::<gst::Element>())
                    .filter(|element| self.is_recoverable(element));

                match failing {
                    Some(element) => {
                        match remove_branch(element, &self.fanout_factory) {
                            Ok(Removal {
                                released_pad,
                                removed,
                            }) => gst::info!(
                                CAT,
                                obj = element,
                                "Removed {removed:?}, released {released_pad:?}"
                            ),
                            Err(err) => gst::error!(
                                CAT,
                                obj = element,
                                "Failed to remove failing branch: {err}"
                            ),
                        }
                        Outcome::Continue
                    }
                    None if self.quit_on_error => Outcome::Quit,
                    None => Outcome::Continue,
                }
            }
            MessageView::Warning(warning) => {
                gst::warning!(
                    CAT,
                    "Warning from {:?}: {} ({:?})",
                    warning.src().map(|s| s.path_string()),
                    warning.error(),
                    warning.debug()
                );
                Outcome::Continue
            }
            _ => Outcome::Continue,
        }
    }

    fn is_recoverable(&self, element: &gst::Element) -> bool {
        element
            .factory()
            .is_some_and(|f| self.recoverable.iter().any(|name| f.name() == name.as_str()))
    }

    /// Installs the policy on the bus of `pipeline`, quitting `main_loop` when
    /// it asks to. The watch lives as long as the returned guard.
    pub fn watch(
        self,
        pipeline: &gst::Pipeline,
        main_loop: &glib::MainLoop,
    ) -> Result<gst::bus::BusWatchGuard, Error> {
        let bus = pipeline.bus().ok_or_else(|| Error::Invalid {
            what: "pipeline without bus",
            value: pipeline.name().to_string(),
        })?;

        let main_loop = main_loop.clone();
        let guard = bus.add_watch_local(move |_, msg| {
            if self.handle(msg) == Outcome::Quit {
                main_loop.quit();
            }

            glib::ControlFlow::Continue
        })?;

        Ok(guard)
    }
}
