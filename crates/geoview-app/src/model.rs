// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Extent {
    pub const WORLD: Self = Self {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// A region is usable only when it is finite and not inverted on
    /// either axis. Zero-area regions (a single point) are valid.
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|value| value.is_finite())
            && self.west <= self.east
            && self.south <= self.north
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut extent = Self::new(first.lng, first.lat, first.lng, first.lat);
        for point in rest {
            extent.west = extent.west.min(point.lng);
            extent.south = extent.south.min(point.lat);
            extent.east = extent.east.max(point.lng);
            extent.north = extent.north.max(point.lat);
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.lng >= self.west
            && point.lng <= self.east
            && point.lat >= self.south
            && point.lat <= self.north
    }

    /// Grows each axis to at least `min_span` degrees around the center so a
    /// single-point layer still produces a usable viewport.
    pub fn padded(&self, min_span: f64) -> Self {
        let center = self.center();
        let half_width = self.width().max(min_span) / 2.0;
        let half_height = self.height().max(min_span) / 2.0;
        Self::new(
            center.lng - half_width,
            center.lat - half_height,
            center.lng + half_width,
            center.lat + half_height,
        )
    }

    pub fn translated(&self, d_lng: f64, d_lat: f64) -> Self {
        Self::new(
            self.west + d_lng,
            self.south + d_lat,
            self.east + d_lng,
            self.north + d_lat,
        )
    }

    /// Scales the extent around its center. `factor < 1` zooms in.
    pub fn scaled(&self, factor: f64) -> Self {
        let center = self.center();
        let half_width = self.width() * factor / 2.0;
        let half_height = self.height() * factor / 2.0;
        Self::new(
            center.lng - half_width,
            center.lat - half_height,
            center.lng + half_width,
            center.lat + half_height,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerColor {
    Red,
    Blue,
    Green,
    Purple,
    Orange,
    Brown,
}

impl LayerColor {
    pub const ALL: [Self; 6] = [
        Self::Red,
        Self::Blue,
        Self::Green,
        Self::Purple,
        Self::Orange,
        Self::Brown,
    ];

    pub const DEFAULT: Self = Self::Red;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "#e41a1c",
            Self::Blue => "#377eb8",
            Self::Green => "#4daf4a",
            Self::Purple => "#984ea3",
            Self::Orange => "#ff7f00",
            Self::Brown => "#a65628",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "#e41a1c" => Some(Self::Red),
            "#377eb8" => Some(Self::Blue),
            "#4daf4a" => Some(Self::Green),
            "#984ea3" => Some(Self::Purple),
            "#ff7f00" => Some(Self::Orange),
            "#a65628" => Some(Self::Brown),
            _ => None,
        }
    }

    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Red => (0xe4, 0x1a, 0x1c),
            Self::Blue => (0x37, 0x7e, 0xb8),
            Self::Green => (0x4d, 0xaf, 0x4a),
            Self::Purple => (0x98, 0x4e, 0xa3),
            Self::Orange => (0xff, 0x7f, 0x00),
            Self::Brown => (0xa6, 0x56, 0x28),
        }
    }

    pub fn next(self) -> Self {
        let current = Self::ALL
            .iter()
            .position(|color| *color == self)
            .unwrap_or(0);
        Self::ALL[(current + 1) % Self::ALL.len()]
    }
}

impl Default for LayerColor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub title: String,
    pub color: LayerColor,
    pub visible: bool,
    pub points: Vec<Point>,
    pub extent: Extent,
}

impl Layer {
    /// A freshly announced layer: visible, default palette color.
    pub fn new(id: LayerId, title: impl Into<String>, points: Vec<Point>, extent: Extent) -> Self {
        Self {
            id,
            title: title.into(),
            color: LayerColor::DEFAULT,
            visible: true,
            points,
            extent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: usize,
    pub direction: SortDirection,
}

impl SortSpec {
    pub const fn new(column: usize, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// Header click: same column flips direction, a new column starts ascending.
    pub const fn toggled(self, column: usize) -> Self {
        if column == self.column {
            Self::new(column, self.direction.flipped())
        } else {
            Self::new(column, SortDirection::Asc)
        }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new(0, SortDirection::Asc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRow {
    pub index: FeatureIndex,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeTable {
    pub headers: Vec<String>,
    pub body: Vec<AttributeRow>,
}
