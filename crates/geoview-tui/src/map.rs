// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The map renderer's own view of the world: which extent it shows and how
//! terminal cells map onto it. It only changes extent through a user gesture
//! (which it reports) or a forwarded extent (which it echoes).

use geoview_app::{Extent, Point};
use ratatui::layout::Rect;

pub const MAX_SPAN_LNG: f64 = 720.0;
pub const MAX_SPAN_LAT: f64 = 360.0;
pub const MIN_SPAN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    extent: Extent,
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(Extent::WORLD)
    }
}

impl MapView {
    pub const fn new(extent: Extent) -> Self {
        Self { extent }
    }

    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Applies an extent pushed by the viewport binding. Returns the change
    /// notification the renderer emits for it.
    pub fn apply_forward(&mut self, extent: Extent) -> Extent {
        self.extent = extent;
        extent
    }

    /// User gesture; the caller reports the returned extent to the binding.
    pub fn gesture(&mut self, extent: Extent) -> Extent {
        self.extent = extent;
        extent
    }

    /// Geographic point under a terminal cell inside `area`, sampled at the
    /// cell center.
    pub fn cell_to_point(&self, area: Rect, column: u16, row: u16) -> Option<Point> {
        if area.width == 0 || area.height == 0 {
            return None;
        }
        if column < area.x
            || row < area.y
            || column >= area.x + area.width
            || row >= area.y + area.height
        {
            return None;
        }
        let fx = (f64::from(column - area.x) + 0.5) / f64::from(area.width);
        let fy = (f64::from(row - area.y) + 0.5) / f64::from(area.height);
        Some(Point::new(
            self.extent.west + fx * self.extent.width(),
            self.extent.north - fy * self.extent.height(),
        ))
    }

    /// Hit radius in degrees for `cells` terminal cells.
    pub fn tolerance(&self, area: Rect, cells: f64) -> f64 {
        if area.width == 0 || area.height == 0 {
            return 0.0;
        }
        let per_column = self.extent.width() / f64::from(area.width);
        let per_row = self.extent.height() / f64::from(area.height);
        per_column.max(per_row) * cells.max(0.0)
    }

    /// Extent shifted by a number of cells; positive `columns` moves the
    /// view east, positive `rows` moves it south.
    pub fn panned(&self, area: Rect, columns: i32, rows: i32) -> Extent {
        let width = f64::from(area.width.max(1));
        let height = f64::from(area.height.max(1));
        let d_lng = self.extent.width() / width * f64::from(columns);
        let d_lat = -self.extent.height() / height * f64::from(rows);
        self.extent.translated(d_lng, d_lat)
    }

    /// Scales around the center, clamped so the view neither collapses nor
    /// grows without bound.
    pub fn zoomed(&self, factor: f64) -> Extent {
        let factor = self.clamp_factor(factor);
        self.extent.scaled(factor)
    }

    /// Scales around `anchor`, keeping it under the same cell.
    pub fn zoomed_at(&self, anchor: Point, factor: f64) -> Extent {
        let factor = self.clamp_factor(factor);
        Extent::new(
            anchor.lng - (anchor.lng - self.extent.west) * factor,
            anchor.lat - (anchor.lat - self.extent.south) * factor,
            anchor.lng + (self.extent.east - anchor.lng) * factor,
            anchor.lat + (self.extent.north - anchor.lat) * factor,
        )
    }

    fn clamp_factor(&self, factor: f64) -> f64 {
        if !factor.is_finite() || factor <= 0.0 {
            return 1.0;
        }
        let width = self.extent.width().max(MIN_SPAN);
        let height = self.extent.height().max(MIN_SPAN);
        let max_factor = (MAX_SPAN_LNG / width).min(MAX_SPAN_LAT / height);
        let min_factor = (MIN_SPAN / width).max(MIN_SPAN / height);
        factor.clamp(min_factor.min(1.0), max_factor.max(1.0))
    }
}
