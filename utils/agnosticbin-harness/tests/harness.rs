// SPDX-License-Identifier: MPL-2.0

use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gst::glib;
use gst::prelude::*;

use gst_agnosticbin_harness::Error;
use gst_agnosticbin_harness::branch::{
    Removal, attach_chain, attach_sink, detach_sink, remove_branch,
};
use gst_agnosticbin_harness::bus::{BusPolicy, Outcome};
use gst_agnosticbin_harness::scenario::{Action, Context};
use gst_agnosticbin_harness::topology::Topology;

fn init() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        gst::init().unwrap();
        gstagnosticbin::plugin_register_static().expect("harness test");
    });
}

fn make(factory: &str, name: &str) -> gst::Element {
    gst::ElementFactory::make(factory).name(name).build().unwrap()
}

/// `tee name=fan` with a `queue ! identity ! fakesink` branch.
fn tee_pipeline() -> (gst::Pipeline, gst::Element) {
    let pipeline = gst::Pipeline::new();
    let tee = make("tee", "fan");
    let queue = make("queue", "queue0");
    let identity = make("identity", "identity0");
    let sink = make("fakesink", "sink0");

    pipeline
        .add_many([&tee, &queue, &identity, &sink])
        .unwrap();
    gst::Element::link_many([&tee, &queue, &identity, &sink]).unwrap();

    (pipeline, tee)
}

#[test]
fn test_remove_branch_walks_to_fanout() {
    init();

    let (pipeline, tee) = tee_pipeline();
    let sink = pipeline.by_name("sink0").unwrap();
    let pad = sink.static_pad("sink").unwrap();
    assert!(pad.is_linked());

    let removal = remove_branch(&sink, "tee").unwrap();
    assert_eq!(
        removal,
        Removal {
            released_pad: Some("src_0".into()),
            removed: vec!["queue0".into(), "identity0".into(), "sink0".into()],
        }
    );

    assert!(tee.src_pads().is_empty());
    assert_eq!(pipeline.children().len(), 1);
    assert!(sink.parent().is_none());
}

#[test]
fn test_remove_branch_without_fanout() {
    init();

    let pipeline = gst::Pipeline::new();
    let identity = make("identity", "identity0");
    let sink = make("fakesink", "sink0");
    pipeline.add_many([&identity, &sink]).unwrap();
    identity.link(&sink).unwrap();

    let removal = remove_branch(&sink, "tee").unwrap();
    assert_eq!(removal.released_pad, None);
    assert_eq!(removal.removed, ["identity0", "sink0"]);
    assert!(pipeline.children().is_empty());
}

#[test]
fn test_remove_branch_unparented() {
    init();

    let sink = make("fakesink", "sink0");
    assert_eq!(remove_branch(&sink, "tee").unwrap(), Removal::default());
}

#[test]
fn test_attach_and_detach() {
    init();

    let (pipeline, tee) = tee_pipeline();

    let sink = attach_sink(&pipeline, "fan", "fakesink", Some("sink1")).unwrap();
    assert_eq!(sink.name(), "sink1");
    assert_eq!(tee.src_pads().len(), 2);
    assert!(sink.static_pad("sink").unwrap().is_linked());

    let chain = attach_chain(&pipeline, "fan", &["queue", "fakesink"], Some("sink2")).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].name(), "sink2");
    assert_eq!(tee.src_pads().len(), 3);

    let removal = detach_sink(&pipeline, "sink1", "tee").unwrap().unwrap();
    assert_eq!(removal.removed, ["sink1"]);
    assert_eq!(tee.src_pads().len(), 2);

    assert_eq!(detach_sink(&pipeline, "sink1", "tee").unwrap(), None);
}

#[test]
fn test_attach_errors() {
    init();

    let (pipeline, _tee) = tee_pipeline();
    let children = pipeline.children().len();

    assert!(matches!(
        attach_sink(&pipeline, "nofan", "fakesink", None),
        Err(Error::NoSuchElement(name)) if name == "nofan"
    ));
    assert!(matches!(
        attach_sink(&pipeline, "fan", "nosuchsink", None),
        Err(Error::MissingElement(name)) if name == "nosuchsink"
    ));
    assert!(matches!(
        attach_chain(&pipeline, "fan", &[], None),
        Err(Error::Invalid { .. })
    ));

    assert_eq!(pipeline.children().len(), children);
}

#[test]
fn test_attach_chain_name_collision() {
    init();

    let (pipeline, tee) = tee_pipeline();
    let children = pipeline.children().len();

    // The head gets added before the tail clashes with the existing sink0
    let res = attach_chain(&pipeline, "fan", &["identity", "fakesink"], Some("sink0"));
    assert!(matches!(res, Err(Error::Glib(_))));

    assert_eq!(pipeline.children().len(), children);
    assert_eq!(tee.src_pads().len(), 1);
}

#[test]
fn test_bus_policy_removes_failing_sink() {
    init();

    let (pipeline, tee) = tee_pipeline();
    let sink = pipeline.by_name("sink0").unwrap();

    let msg = gst::message::Error::builder(gst::ResourceError::Failed, "Sink died")
        .src(&sink)
        .build();

    let policy = BusPolicy::new("tee").recover("fakesink").quit_on_error(true);
    assert_eq!(policy.handle(&msg), Outcome::Continue);

    assert!(pipeline.by_name("sink0").is_none());
    assert!(pipeline.by_name("queue0").is_none());
    assert!(tee.src_pads().is_empty());
}

#[test]
fn test_bus_policy_other_errors() {
    init();

    let (pipeline, _tee) = tee_pipeline();
    let identity = pipeline.by_name("identity0").unwrap();

    let msg = gst::message::Error::builder(gst::StreamError::Failed, "Broken")
        .src(&identity)
        .build();

    let policy = BusPolicy::new("tee").recover("fakesink");
    assert_eq!(policy.handle(&msg), Outcome::Continue);
    assert_eq!(policy.quit_on_error(true).handle(&msg), Outcome::Quit);

    // Nothing was removed
    assert_eq!(pipeline.children().len(), 4);
}

#[test]
fn test_attach_while_playing() {
    init();

    let pipeline = gst::Pipeline::new();
    let src = gst::ElementFactory::make("audiotestsrc")
        .property("is-live", true)
        .build()
        .unwrap();
    let tee = make("tee", "fan");
    let queue = make("queue", "queue0");
    let sink = make("fakesink", "sink0");
    pipeline.add_many([&src, &tee, &queue, &sink]).unwrap();
    gst::Element::link_many([&src, &tee, &queue, &sink]).unwrap();

    pipeline.set_state(gst::State::Playing).unwrap();
    let (res, state, _) = pipeline.state(gst::ClockTime::from_seconds(5));
    assert!(res.is_ok());
    assert_eq!(state, gst::State::Playing);

    let chain = attach_chain(&pipeline, "fan", &["queue", "fakesink"], Some("sink1")).unwrap();
    let (res, state, _) = chain[1].state(gst::ClockTime::from_seconds(5));
    assert!(res.is_ok());
    assert_eq!(state, gst::State::Playing);

    std::thread::sleep(std::time::Duration::from_millis(200));

    let removal = detach_sink(&pipeline, "sink1", "tee").unwrap().unwrap();
    assert_eq!(removal.released_pad.as_deref(), Some("src_1"));
    assert_eq!(chain[1].current_state(), gst::State::Null);

    let bus = pipeline.bus().unwrap();
    assert!(
        bus.pop_filtered(&[gst::MessageType::Error]).is_none(),
        "pipeline posted an error"
    );

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn test_scenario_actions_on_agnosticbin() {
    init();

    if ["vp8enc", "vp8dec", "videotestsrc"]
        .iter()
        .any(|name| gst::ElementFactory::find(name).is_none())
    {
        println!("Skipping, vp8enc, vp8dec or videotestsrc not available");
        return;
    }

    let topology = Topology {
        video_sink: "fakesink".into(),
        audio_sink: "fakesink".into(),
        ..Topology::default()
    };

    let pipeline = topology.build_pipeline().unwrap();
    assert!(pipeline.by_name("agnostic").is_some());
    assert!(pipeline.by_name("videosink0").is_some());

    let ctx = Rc::new(Context {
        pipeline: pipeline.clone(),
        topology,
        main_loop: glib::MainLoop::new(None, false),
        console: false,
    });

    pipeline.set_state(gst::State::Playing).unwrap();

    Action::ConnectSink {
        name: "videosink1".into(),
        detach_after: None,
    }
    .apply(&ctx)
    .unwrap();
    assert!(pipeline.by_name("videosink1").is_some());

    Action::Disconnect {
        name: "videosink0".into(),
    }
    .apply(&ctx)
    .unwrap();
    assert!(pipeline.by_name("videosink0").is_none());

    // Unknown names are ignored
    Action::Disconnect {
        name: "videosink9".into(),
    }
    .apply(&ctx)
    .unwrap();

    let agnostic = pipeline.by_name("agnostic").unwrap();
    assert_eq!(agnostic.src_pads().len(), 2);

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn test_bus_policy_releases_agnosticbin_pad() {
    init();

    let pipeline = gst::Pipeline::new();
    let src = gst::ElementFactory::make("audiotestsrc")
        .property("is-live", true)
        .build()
        .unwrap();
    let agnosticbin = make("agnosticbin", "agnostic");
    let sink0 = make("fakesink", "sink0");
    let sink1 = make("fakesink", "sink1");

    let buffers = Arc::new(AtomicUsize::new(0));
    let buffers_clone = buffers.clone();
    sink1.set_property("signal-handoffs", true);
    sink1.connect("handoff", false, move |_| {
        buffers_clone.fetch_add(1, Ordering::SeqCst);
        None
    });

    pipeline
        .add_many([&src, &agnosticbin, &sink0, &sink1])
        .unwrap();
    src.link(&agnosticbin).unwrap();
    agnosticbin.link(&sink0).unwrap();
    agnosticbin.link(&sink1).unwrap();

    pipeline.set_state(gst::State::Playing).unwrap();
    let (res, _, _) = pipeline.state(gst::ClockTime::from_seconds(5));
    assert!(res.is_ok());

    let msg = gst::message::Error::builder(gst::ResourceError::Failed, "Sink died")
        .src(&sink0)
        .build();
    let policy = BusPolicy::new("agnosticbin").recover("fakesink");
    assert_eq!(policy.handle(&msg), Outcome::Continue);

    assert!(pipeline.by_name("sink0").is_none());
    assert!(agnosticbin.static_pad("src_0").is_none());
    assert_eq!(agnosticbin.src_pads().len(), 1);
    assert_eq!(sink0.current_state(), gst::State::Null);

    // The remaining branch keeps running
    let before = buffers.load(Ordering::SeqCst);
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while buffers.load(Ordering::SeqCst) == before {
        assert!(std::time::Instant::now() < deadline, "sink1 starved");
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    pipeline.set_state(gst::State::Null).unwrap();
}
