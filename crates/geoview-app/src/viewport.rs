// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Two-way binding between the map renderer's visible extent and
//! programmatic zoom requests.
//!
//! Extents flow in two terminal directions:
//! - renderer -> binding (`request_extent`): a user pan/zoom. Recorded and
//!   reported to listeners, never forwarded back to the renderer.
//! - binding -> renderer (`zoom_to`): a zoom-to-layer/feature. Forwarded to
//!   the renderer once. The renderer's own change notification for exactly
//!   that extent is swallowed as an echo; any other report is a gesture.

use crate::error::{SyncError, SyncResult};
use crate::model::Extent;

pub const DEFAULT_MIN_SPAN: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentOrigin {
    Map,
    Binding,
}

/// What the binding did with an extent reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtentReport {
    /// Fresh user gesture; listeners should see it.
    Gesture(Extent),
    /// Renderer confirming an extent the binding pushed this cycle.
    Echo(Extent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportBinding {
    current: Extent,
    forwarded: Option<Extent>,
    min_span: f64,
}

impl Default for ViewportBinding {
    fn default() -> Self {
        Self::new(Extent::WORLD)
    }
}

impl ViewportBinding {
    pub fn new(initial: Extent) -> Self {
        Self {
            current: initial,
            forwarded: None,
            min_span: DEFAULT_MIN_SPAN,
        }
    }

    pub fn with_min_span(mut self, min_span: f64) -> Self {
        self.min_span = min_span.abs();
        self
    }

    pub fn current(&self) -> Extent {
        self.current
    }

    /// Extent pushed to the renderer during the current cycle, if any.
    pub fn pending_forward(&self) -> Option<Extent> {
        self.forwarded
    }

    /// The renderer reports its visible extent changed.
    pub fn request_extent(&mut self, extent: Extent) -> SyncResult<ExtentReport> {
        ensure_valid(extent)?;
        self.current = extent;
        // Only the forwarded extent itself is an echo, and only once.
        if self.forwarded.take() == Some(extent) {
            return Ok(ExtentReport::Echo(extent));
        }
        Ok(ExtentReport::Gesture(extent))
    }

    /// Programmatic zoom. Returns the extent the renderer must apply.
    pub fn zoom_to(&mut self, extent: Extent) -> SyncResult<Extent> {
        ensure_valid(extent)?;
        let target = extent.padded(self.min_span);
        self.current = target;
        self.forwarded = Some(target);
        Ok(target)
    }

    /// Closes the update cycle; later renderer reports count as gestures.
    pub fn end_cycle(&mut self) {
        self.forwarded = None;
    }
}

fn ensure_valid(extent: Extent) -> SyncResult<()> {
    if extent.is_valid() {
        return Ok(());
    }
    Err(SyncError::DegenerateExtent {
        west: extent.west,
        south: extent.south,
        east: extent.east,
        north: extent.north,
    })
}
