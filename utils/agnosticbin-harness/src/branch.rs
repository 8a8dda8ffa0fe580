// SPDX-License-Identifier: MPL-2.0

//! Attaching branches to the fan-out element and taking them out again.

use gst::prelude::*;

use crate::{CAT, Error, make_element};

/// What [`remove_branch`] took out of the pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Request pad given back to the fan-out element, if the walk reached it.
    pub released_pad: Option<String>,
    /// Removed elements, most upstream first.
    pub removed: Vec<String>,
}

fn fanout_element(pipeline: &gst::Pipeline, fanout_name: &str) -> Result<gst::Element, Error> {
    pipeline
        .by_name(fanout_name)
        .ok_or_else(|| Error::NoSuchElement(fanout_name.to_string()))
}

/// Adds a chain of elements created from `factories`, links them in order and
/// links the fan-out to the first one. The last element gets `name`.
pub fn attach_chain(
    pipeline: &gst::Pipeline,
    fanout_name: &str,
    factories: &[&str],
    name: Option<&str>,
) -> Result<Vec<gst::Element>, Error> {
    let fanout = fanout_element(pipeline, fanout_name)?;

    let Some(last) = factories.len().checked_sub(1) else {
        return Err(Error::Invalid {
            what: "branch",
            value: String::new(),
        });
    };

    let elements = factories
        .iter()
        .enumerate()
        .map(|(idx, factory)| make_element(factory, if idx == last { name } else { None }))
        .collect::<Result<Vec<_>, _>>()?;

    if let Err(err) = add_branch(pipeline, &fanout, &elements) {
        gst::warning!(CAT, obj = &fanout, "Failed to attach branch: {err}");

        // Adding stops at the first failure, only some may be in the pipeline
        let parent = Some(pipeline.upcast_ref::<gst::Object>());
        for element in &elements {
            if element.parent().as_ref() == parent {
                let _ = element.set_state(gst::State::Null);
                let _ = pipeline.remove(element);
            }
        }
        return Err(err);
    }

    gst::info!(
        CAT,
        obj = &fanout,
        "Attached {}",
        elements
            .iter()
            .map(|e| e.name().to_string())
            .collect::<Vec<_>>()
            .join(" ! ")
    );

    Ok(elements)
}

fn add_branch(
    pipeline: &gst::Pipeline,
    fanout: &gst::Element,
    elements: &[gst::Element],
) -> Result<(), Error> {
    pipeline.add_many(elements)?;

    if elements.len() > 1 {
        gst::Element::link_many(elements)?;
    }

    // Downstream first, so the branch is running before data reaches it
    for element in elements.iter().rev() {
        element.sync_state_with_parent()?;
    }

    fanout.link(&elements[0])?;

    Ok(())
}

/// Adds a single sink named `name` linked to the fan-out.
pub fn attach_sink(
    pipeline: &gst::Pipeline,
    fanout_name: &str,
    factory: &str,
    name: Option<&str>,
) -> Result<gst::Element, Error> {
    let mut elements = attach_chain(pipeline, fanout_name, &[factory], name)?;
    Ok(elements.remove(0))
}

/// Removes the branch ending in the element called `name`. Returns `None`
/// if the pipeline has no such element.
pub fn detach_sink(
    pipeline: &gst::Pipeline,
    name: &str,
    fanout_factory: &str,
) -> Result<Option<Removal>, Error> {
    let Some(element) = pipeline.by_name(name) else {
        gst::info!(CAT, obj = pipeline, "No element named {name} to detach");
        return Ok(None);
    };

    remove_branch(&element, fanout_factory).map(Some)
}

/// Walks upstream from `element` through single-input elements until an
/// element created from `fanout_factory` is found, releases the request pad
/// feeding the branch and removes every element of the branch.
///
/// A branch that is not connected to the fan-out is removed up to its first
/// unlinked element. An element without a parent is left alone.
pub fn remove_branch(element: &gst::Element, fanout_factory: &str) -> Result<Removal, Error> {
    let mut removal = Removal::default();
    remove_upstream(element, fanout_factory, &mut removal)?;
    Ok(removal)
}

fn is_from_factory(element: &gst::Element, factory: &str) -> bool {
    element.factory().is_some_and(|f| f.name() == factory)
}

fn remove_upstream(
    element: &gst::Element,
    fanout_factory: &str,
    removal: &mut Removal,
) -> Result<(), Error> {
    let Some(parent) = element.parent().and_downcast::<gst::Bin>() else {
        return Ok(());
    };

    let peer = element.static_pad("sink").and_then(|pad| pad.peer());
    let upstream = peer
        .as_ref()
        .and_then(|peer| peer.parent_element().map(|upstream| (peer, upstream)));

    if let Some((peer, upstream)) = upstream {
        if is_from_factory(&upstream, fanout_factory) {
            gst::info!(CAT, obj = peer, "Releasing request pad");
            upstream.release_request_pad(peer);
            removal.released_pad = Some(peer.name().to_string());
        } else {
            remove_upstream(&upstream, fanout_factory, removal)?;
        }
    }

    gst::debug!(CAT, obj = element, "Removing from {}", parent.name());
    parent.remove(element)?;
    element.set_state(gst::State::Null)?;
    removal.removed.push(element.name().to_string());

    Ok(())
}
