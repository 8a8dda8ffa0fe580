// SPDX-License-Identifier: MPL-2.0

use anyhow::{Context, Error, anyhow};
use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use super::encoding;
use crate::caps;

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "agnosticbin",
        gst::DebugColorFlags::empty(),
        Some("Agnostic fan-out bin"),
    )
});

const INPUT_TEE: &str = "input_tee";
const DECODED_TEE: &str = "decoded_tee";

/// Decoded media re-encoded into the format of one or more consumers.
struct EncodedBranch {
    queue: gst::Element,
    convert: gst::Element,
    encoder: gst::Element,
    tee: gst::Element,
}

impl EncodedBranch {
    fn elements(&self) -> [&gst::Element; 4] {
        [&self.queue, &self.convert, &self.encoder, &self.tee]
    }
}

#[derive(Default)]
struct State {
    input_caps: Option<gst::Caps>,
    pad_count: u32,
    /// Queue behind each source pad, by pad name
    branches: HashMap<String, gst::Element>,
    decoded_tee: Option<gst::Element>,
    encoded: Vec<EncodedBranch>,
}

pub struct AgnosticBin {
    sinkpad: gst::GhostPad,
    input_tee: gst::Element,
    decode_queue: gst::Element,
    decode_valve: gst::Element,
    decodebin: gst::Element,
    state: Mutex<State>,
}

/// Tee currently feeding `queue`, if any.
fn feeding_tee(queue: &gst::Element) -> Option<gst::Element> {
    queue.static_pad("sink")?.peer()?.parent_element()
}

impl AgnosticBin {
    fn sink_event(&self, pad: &gst::GhostPad, event: gst::Event) -> bool {
        match event.view() {
            gst::EventView::Caps(ev) => {
                let caps = ev.caps_owned();
                let old_caps = pad.current_caps();

                gst::debug!(
                    CAT,
                    imp = self,
                    "Received new caps {caps:?}, old were {old_caps:?}"
                );

                self.state.lock().unwrap().input_caps = Some(caps.clone());

                // The new caps have to reach the input tee before branches get
                // linked to it
                if !gst::Pad::event_default(pad, Some(&*self.obj()), event) {
                    return false;
                }

                if old_caps.as_ref() != Some(&caps) {
                    let mut state = self.state.lock().unwrap();
                    self.connect_previous_srcpads(&mut state);
                }

                true
            }
            _ => gst::Pad::event_default(pad, Some(&*self.obj()), event),
        }
    }

    fn src_event(&self, pad: &gst::GhostPad, event: gst::Event) -> bool {
        match event.view() {
            gst::EventView::Reconfigure(..) => {
                gst::debug!(CAT, obj = pad, "Reconfiguring");

                if let Some(peer) = pad.peer() {
                    let mut state = self.state.lock().unwrap();
                    self.connect_srcpad(&mut state, pad.upcast_ref(), &peer);
                }

                true
            }
            _ => gst::Pad::event_default(pad, Some(&*self.obj()), event),
        }
    }

    fn src_linked(&self, pad: &gst::Pad, peer: &gst::Pad) {
        gst::debug!(CAT, obj = pad, "Linked to {}", peer.name());

        let mut state = self.state.lock().unwrap();
        self.connect_srcpad(&mut state, pad, peer);
    }

    fn src_unlinked(&self, pad: &gst::Pad) {
        gst::debug!(CAT, obj = pad, "Unlinked");

        let mut state = self.state.lock().unwrap();
        if let Some(queue) = state.branches.get(pad.name().as_str()).cloned() {
            self.unlink_from_tee(&mut state, &queue);
        }
    }

    fn connect_previous_srcpads(&self, state: &mut State) {
        for srcpad in self.obj().src_pads() {
            if let Some(peer) = srcpad.peer() {
                self.connect_srcpad(state, &srcpad, &peer);
            }
        }
    }

    /// Feeds the branch of `srcpad` from the tee producing what `peer` accepts.
    fn connect_srcpad(&self, state: &mut State, srcpad: &gst::Pad, peer: &gst::Pad) {
        let Some(queue) = state.branches.get(srcpad.name().as_str()).cloned() else {
            gst::debug!(CAT, obj = srcpad, "Not one of our branches");
            return;
        };

        let allowed = peer.query_caps(None);
        if allowed.is_empty() {
            gst::debug!(CAT, obj = srcpad, "Peer accepts nothing, disconnecting");
            self.unlink_from_tee(state, &queue);
            return;
        }

        let Some(input_caps) = state.input_caps.clone() else {
            gst::debug!(CAT, obj = srcpad, "No input caps yet, disconnecting");
            self.unlink_from_tee(state, &queue);
            return;
        };

        let tee = match feeding_tee(&queue) {
            Some(tee) if allowed.is_any() => {
                gst::debug!(CAT, obj = srcpad, "Peer accepts anything and is already fed");
                Some(tee)
            }
            _ if input_caps.can_intersect(&allowed) => Some(self.input_tee.clone()),
            _ if caps::RAW_CAPS.can_intersect(&allowed) => {
                gst::debug!(CAT, obj = srcpad, "Peer wants raw media");
                state.decoded_tee.clone()
            }
            _ => self.encoded_tee_for(state, &allowed),
        };

        match tee {
            Some(tee) => {
                if let Err(err) = self.link_to_tee(state, &tee, &queue) {
                    gst::warning!(CAT, obj = srcpad, "Failed to connect: {err:#}");
                }
            }
            None => {
                gst::debug!(CAT, obj = srcpad, "Nothing can feed {allowed:?} yet");
                self.unlink_from_tee(state, &queue);
            }
        }
    }

    fn encoded_tee_for(&self, state: &mut State, allowed: &gst::Caps) -> Option<gst::Element> {
        // Encoders are fed from the decoded tee
        state.decoded_tee.as_ref()?;

        let existing = state.encoded.iter().find(|branch| {
            branch
                .tee
                .static_pad("sink")
                .and_then(|pad| pad.allowed_caps())
                .is_some_and(|caps| caps.can_intersect(allowed))
        });
        if let Some(branch) = existing {
            return Some(branch.tee.clone());
        }

        match self.create_encoded_branch(state, allowed) {
            Ok(tee) => Some(tee),
            Err(err) => {
                gst::warning!(CAT, imp = self, "Can't encode to {allowed:?}: {err:#}");
                None
            }
        }
    }

    fn create_encoded_branch(
        &self,
        state: &mut State,
        allowed: &gst::Caps,
    ) -> Result<gst::Element, Error> {
        let decoded_tee = state
            .decoded_tee
            .clone()
            .ok_or_else(|| anyhow!("Nothing decoded yet"))?;
        let raw_caps = decoded_tee
            .static_pad("sink")
            .and_then(|pad| pad.allowed_caps())
            .context("Decoded caps are unknown")?;
        let factory = encoding::find_encoder(allowed).context("No suitable encoder")?;

        gst::debug!(
            CAT,
            imp = self,
            "Encoding with {} for {allowed:?}",
            factory.name()
        );

        let branch = EncodedBranch {
            queue: gst::ElementFactory::make("queue").build()?,
            convert: gst::ElementFactory::make(encoding::converter_for(&raw_caps)).build()?,
            encoder: factory.create().build()?,
            tee: gst::ElementFactory::make("tee")
                .property("allow-not-linked", true)
                .build()?,
        };
        encoding::configure_encoder(&branch.encoder, &factory.name());

        let obj = self.obj();
        obj.add_many(branch.elements())?;
        if let Err(err) = gst::Element::link_many(branch.elements()) {
            let _ = obj.remove_many(branch.elements());
            return Err(err.into());
        }
        for element in branch.elements() {
            element.sync_state_with_parent()?;
        }

        let tee = branch.tee.clone();
        state.encoded.push(branch);

        Ok(tee)
    }

    fn link_to_tee(
        &self,
        state: &mut State,
        tee: &gst::Element,
        queue: &gst::Element,
    ) -> Result<(), Error> {
        let queue_sink = queue.static_pad("sink").context("Queue has no sink pad")?;

        if let Some(tee_src) = queue_sink.peer() {
            if tee_src.parent_element().as_ref() == Some(tee) {
                // Already fed by this tee, only let downstream know the caps again
                if let Some(caps) = tee.static_pad("sink").and_then(|pad| pad.current_caps()) {
                    let _ = tee_src.push_event(gst::event::Caps::new(&caps));
                }
                return Ok(());
            }

            self.unlink_from_tee(state, queue);
        }

        let tee_src = tee
            .request_pad_simple("src_%u")
            .with_context(|| format!("{} has no free src pad", tee.name()))?;

        if let Err(err) = tee_src.link(&queue_sink) {
            tee.release_request_pad(&tee_src);
            return Err(anyhow!(
                "Failed to link {} to {}: {err:?}",
                tee.name(),
                queue.name()
            ));
        }

        gst::debug!(
            CAT,
            imp = self,
            "Fed {} from {}",
            queue.name(),
            tee.name()
        );

        self.tee_started(state, tee);

        let event = gst_video::UpstreamForceKeyUnitEvent::builder()
            .all_headers(true)
            .build();
        let _ = tee_src.send_event(event);

        Ok(())
    }

    fn unlink_from_tee(&self, state: &mut State, queue: &gst::Element) {
        let Some(queue_sink) = queue.static_pad("sink") else {
            return;
        };
        let Some(tee_src) = queue_sink.peer() else {
            return;
        };
        let Some(tee) = tee_src.parent_element() else {
            return;
        };

        let last = tee.property::<i32>("num-src-pads") == 1;

        // Nothing may flow through the pads while the branch goes away
        let probe_pad = if last {
            tee.static_pad("sink")
        } else {
            Some(tee_src.clone())
        };
        let probe = probe_pad.and_then(|pad| {
            pad.add_probe(gst::PadProbeType::ALL_BOTH, |_, _| {
                gst::PadProbeReturn::Drop
            })
            .map(|id| (pad, id))
        });

        if let Err(err) = tee_src.unlink(&queue_sink) {
            gst::warning!(CAT, imp = self, "Failed to unlink {}: {err}", queue.name());
        }
        tee.release_request_pad(&tee_src);

        if let Some((pad, id)) = probe {
            pad.remove_probe(id);
        }

        gst::debug!(
            CAT,
            imp = self,
            "Disconnected {} from {}",
            queue.name(),
            tee.name()
        );

        if last {
            self.tee_stopped(state, &tee);
        }
    }

    fn tee_started(&self, state: &mut State, tee: &gst::Element) {
        if state.decoded_tee.as_ref() == Some(tee) {
            self.set_decoding(true);
            return;
        }

        let Some(queue) = state
            .encoded
            .iter()
            .find(|branch| &branch.tee == tee)
            .map(|branch| branch.queue.clone())
        else {
            return;
        };

        if feeding_tee(&queue).is_some() {
            return;
        }

        gst::info!(
            CAT,
            imp = self,
            "First consumer of {}, feeding its encoder",
            tee.name()
        );

        if let Some(decoded_tee) = state.decoded_tee.clone() {
            if let Err(err) = self.link_to_tee(state, &decoded_tee, &queue) {
                gst::warning!(CAT, imp = self, "Can't feed encoder: {err:#}");
            }
        }
    }

    fn tee_stopped(&self, state: &mut State, tee: &gst::Element) {
        if state.decoded_tee.as_ref() == Some(tee) {
            self.set_decoding(false);
            return;
        }

        let Some(idx) = state.encoded.iter().position(|branch| &branch.tee == tee) else {
            return;
        };
        let branch = state.encoded.remove(idx);

        gst::info!(
            CAT,
            imp = self,
            "Last consumer of {} gone, removing encoder {}",
            tee.name(),
            branch.encoder.name()
        );

        self.unlink_from_tee(state, &branch.queue);

        for element in branch.elements() {
            let _ = element.set_locked_state(true);
            let _ = element.set_state(gst::State::Null);
        }
        if let Err(err) = self.obj().remove_many(branch.elements()) {
            gst::warning!(CAT, imp = self, "Failed to remove encoder: {err}");
        }
    }

    fn set_decoding(&self, decoding: bool) {
        gst::debug!(CAT, imp = self, "Decoding: {decoding}");
        self.decode_valve.set_property("drop", !decoding);
    }

    fn decoded_pad_added(&self, pad: &gst::Pad) {
        if pad.direction() != gst::PadDirection::Src {
            return;
        }

        let mut state = self.state.lock().unwrap();

        if state.decoded_tee.is_some() {
            gst::debug!(CAT, obj = pad, "Only one decoded stream is used, discarding");
            if let Err(err) = self.discard_decoded_pad(pad) {
                gst::warning!(CAT, obj = pad, "Failed to discard: {err:#}");
            }
            return;
        }

        match self.build_decoded_branch(pad) {
            Ok(tee) => {
                state.decoded_tee = Some(tee);
                // Until somebody consumes raw or re-encoded media
                self.set_decoding(false);
                self.connect_previous_srcpads(&mut state);
            }
            Err(err) => {
                gst::error!(CAT, obj = pad, "Failed to handle decoded stream: {err:#}");
            }
        }
    }

    fn build_decoded_branch(&self, pad: &gst::Pad) -> Result<gst::Element, Error> {
        let obj = self.obj();

        let tee = gst::ElementFactory::make("tee")
            .name(DECODED_TEE)
            .property("allow-not-linked", true)
            .build()?;
        obj.add(&tee)?;
        tee.sync_state_with_parent()?;

        let caps = pad.query_caps(None);
        if caps.can_intersect(&caps::RAW_VIDEO_CAPS) {
            let framerate = encoding::decoded_framerate(&caps);
            gst::debug!(CAT, imp = self, "Decoded video, enforcing {framerate} fps");

            let videorate = gst::ElementFactory::make("videorate")
                .property(
                    "average-period",
                    gst::ClockTime::from_mseconds(200).nseconds(),
                )
                .build()?;
            let capsfilter = gst::ElementFactory::make("capsfilter")
                .property(
                    "caps",
                    gst::Caps::builder("video/x-raw")
                        .field("framerate", framerate)
                        .build(),
                )
                .build()?;

            obj.add_many([&videorate, &capsfilter])?;
            videorate.sync_state_with_parent()?;
            capsfilter.sync_state_with_parent()?;

            pad.link(&videorate.static_pad("sink").context("videorate without sink")?)?;
            gst::Element::link_many([&videorate, &capsfilter, &tee])?;
        } else {
            pad.link(&tee.static_pad("sink").context("tee without sink")?)?;
        }

        Ok(tee)
    }

    fn discard_decoded_pad(&self, pad: &gst::Pad) -> Result<(), Error> {
        let fakesink = gst::ElementFactory::make("fakesink")
            .property("async", false)
            .build()?;

        self.obj().add(&fakesink)?;
        fakesink.sync_state_with_parent()?;
        pad.link(&fakesink.static_pad("sink").context("fakesink without sink")?)?;

        Ok(())
    }

    fn next_pad_name(&self, state: &mut State, name: Option<&str>) -> Option<String> {
        let idx = match name {
            None => state.pad_count,
            Some(name) => {
                let Some(idx) = name
                    .strip_prefix("src_")
                    .and_then(|idx| idx.parse::<u32>().ok())
                else {
                    gst::error!(CAT, imp = self, "Invalid pad name requested: {name:?}");
                    return None;
                };
                idx
            }
        };

        // `src_01` and `src_1` are the same pad
        let pad_name = format!("src_{idx}");
        if state.branches.contains_key(&pad_name) {
            gst::error!(CAT, imp = self, "Pad {pad_name} already exists");
            return None;
        }

        let Some(next) = idx.checked_add(1) else {
            gst::error!(CAT, imp = self, "No pad names left after {pad_name}");
            return None;
        };

        state.pad_count = state.pad_count.max(next);
        Some(pad_name)
    }

    fn is_running(&self) -> bool {
        let obj = self.obj();
        obj.current_state() >= gst::State::Paused || obj.pending_state() >= gst::State::Paused
    }
}

#[glib::object_subclass]
impl ObjectSubclass for AgnosticBin {
    const NAME: &'static str = "GstAgnosticBin";
    type Type = super::AgnosticBin;
    type ParentType = gst::Bin;

    fn with_class(klass: &Self::Class) -> Self {
        let templ = klass.pad_template("sink").unwrap();
        let sinkpad = gst::GhostPad::builder_from_template(&templ)
            .name("sink")
            .event_function(|pad, parent, event| {
                AgnosticBin::catch_panic_pad_function(
                    parent,
                    || false,
                    |agnosticbin| agnosticbin.sink_event(pad, event),
                )
            })
            .flags(gst::PadFlags::PROXY_CAPS)
            .build();

        let input_tee = gst::ElementFactory::make("tee")
            .name(INPUT_TEE)
            .build()
            .unwrap();
        let decode_queue = gst::ElementFactory::make("queue").build().unwrap();
        let decode_valve = gst::ElementFactory::make("valve").build().unwrap();
        let decodebin = gst::ElementFactory::make("decodebin").build().unwrap();

        Self {
            sinkpad,
            input_tee,
            decode_queue,
            decode_valve,
            decodebin,
            state: Mutex::new(State::default()),
        }
    }
}

impl ObjectImpl for AgnosticBin {
    fn constructed(&self) {
        self.parent_constructed();

        let obj = self.obj();
        obj.set_property("async-handling", true);

        let decode_chain = [
            &self.input_tee,
            &self.decode_queue,
            &self.decode_valve,
            &self.decodebin,
        ];
        obj.add_many(decode_chain).unwrap();
        gst::Element::link_many(decode_chain).unwrap();

        let obj_weak = obj.downgrade();
        self.decodebin.connect_pad_added(move |_, pad| {
            let Some(obj) = obj_weak.upgrade() else {
                return;
            };
            obj.imp().decoded_pad_added(pad);
        });

        self.sinkpad
            .set_target(Some(&self.input_tee.static_pad("sink").unwrap()))
            .unwrap();
        obj.add_pad(&self.sinkpad).unwrap();
    }
}

impl GstObjectImpl for AgnosticBin {}

impl ElementImpl for AgnosticBin {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: LazyLock<gst::subclass::ElementMetadata> = LazyLock::new(|| {
            gst::subclass::ElementMetadata::new(
                "Agnostic connector",
                "Generic/Bin/Connector",
                "Automatically encodes/decodes media to match sink and source pads caps",
                "José Antonio Santos Cadenas <santoscadenas@kurento.com>, \
                 Miguel París Díaz <mparisdiaz@gmail.com>",
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: LazyLock<Vec<gst::PadTemplate>> = LazyLock::new(|| {
            let sink_pad_template = gst::PadTemplate::new(
                "sink",
                gst::PadDirection::Sink,
                gst::PadPresence::Always,
                &caps::AGNOSTIC,
            )
            .unwrap();

            let src_pad_template = gst::PadTemplate::new(
                "src_%u",
                gst::PadDirection::Src,
                gst::PadPresence::Request,
                &caps::AGNOSTIC,
            )
            .unwrap();

            vec![sink_pad_template, src_pad_template]
        });

        PAD_TEMPLATES.as_ref()
    }

    fn request_new_pad(
        &self,
        templ: &gst::PadTemplate,
        name: Option<&str>,
        _caps: Option<&gst::Caps>,
    ) -> Option<gst::Pad> {
        let obj = self.obj();
        let mut state = self.state.lock().unwrap();
        let pad_name = self.next_pad_name(&mut state, name)?;

        let queue = match gst::ElementFactory::make("queue").build() {
            Ok(queue) => queue,
            Err(err) => {
                gst::error!(CAT, imp = self, "Failed to create queue: {err}");
                return None;
            }
        };
        if let Err(err) = obj.add(&queue) {
            gst::error!(CAT, imp = self, "Failed to add queue: {err}");
            return None;
        }
        let _ = queue.sync_state_with_parent();

        let pad = gst::GhostPad::builder_from_template(templ)
            .name(pad_name.as_str())
            .event_function(|pad, parent, event| {
                AgnosticBin::catch_panic_pad_function(
                    parent,
                    || false,
                    |agnosticbin| agnosticbin.src_event(pad, event),
                )
            })
            .build();
        pad.set_target(queue.static_pad("src").as_ref()).unwrap();

        pad.connect_linked(|pad, peer| {
            if let Some(agnosticbin) = pad.parent().and_downcast::<super::AgnosticBin>() {
                agnosticbin.imp().src_linked(pad.upcast_ref(), peer);
            }
        });
        pad.connect_unlinked(|pad, _peer| {
            if let Some(agnosticbin) = pad.parent().and_downcast::<super::AgnosticBin>() {
                agnosticbin.imp().src_unlinked(pad.upcast_ref());
            }
        });

        state.branches.insert(pad_name.clone(), queue.clone());
        drop(state);

        if self.is_running() {
            let _ = pad.set_active(true);
        }

        // The application may link the pad from pad-added
        if let Err(err) = obj.add_pad(&pad) {
            gst::error!(CAT, imp = self, "Failed to add pad {pad_name}: {err}");
            self.state.lock().unwrap().branches.remove(&pad_name);
            let _ = obj.remove(&queue);
            let _ = queue.set_state(gst::State::Null);
            return None;
        }

        gst::debug!(CAT, imp = self, "Created {pad_name}");

        Some(pad.upcast())
    }

    fn release_pad(&self, pad: &gst::Pad) {
        let obj = self.obj();

        let queue = {
            let mut state = self.state.lock().unwrap();
            let queue = state.branches.remove(pad.name().as_str());
            if let Some(queue) = &queue {
                self.unlink_from_tee(&mut state, queue);
            }
            queue
        };

        gst::debug!(CAT, imp = self, "Releasing {}", pad.name());

        if self.is_running() {
            let _ = pad.set_active(false);
        }
        if let Err(err) = obj.remove_pad(pad) {
            gst::warning!(CAT, imp = self, "Failed to remove {}: {err}", pad.name());
        }

        if let Some(queue) = queue {
            let _ = obj.remove(&queue);
            let _ = queue.set_state(gst::State::Null);
        }
    }
}

impl BinImpl for AgnosticBin {}
