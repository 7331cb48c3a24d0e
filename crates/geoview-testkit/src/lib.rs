// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use geoview_app::{BusMessage, Extent, LayerId, Point};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const TOWN_PREFIXES: [&str; 14] = [
    "Spring", "Maple", "Cedar", "River", "Oak", "Fair", "Green", "Lake", "Pine", "Stone", "Clear",
    "Red", "Silver", "Elm",
];
const TOWN_SUFFIXES: [&str; 10] = [
    "field", "ton", "ville", "wood", "dale", "port", "ford", "brook", "haven", "ridge",
];
const REGIONS: [&str; 8] = [
    "North", "South", "East", "West", "Central", "Coast", "Valley", "Highlands",
];
const KINDS: [&str; 4] = ["village", "town", "city", "hamlet"];

pub const TOWN_HEADERS: [&str; 4] = ["name", "region", "kind", "population"];

struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    /// Uniform in `[min, max)`, rounded to four decimals so CSV text is stable.
    fn coordinate(&mut self, min: f64, max: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1_u64 << 53) as f64;
        ((min + unit * (max - min)) * 10_000.0).round() / 10_000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Town {
    pub location: Point,
    pub name: String,
    pub region: String,
    pub kind: String,
    pub population: u32,
}

impl Town {
    pub fn values(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.region.clone(),
            self.kind.clone(),
            self.population.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TownsLayer {
    pub title: String,
    pub towns: Vec<Town>,
}

impl TownsLayer {
    pub fn points(&self) -> Vec<Point> {
        self.towns.iter().map(|town| town.location).collect()
    }

    pub fn extent(&self) -> Option<Extent> {
        Extent::from_points(&self.points())
    }

    /// `lng;lat;name;region;kind;population` with a header line.
    pub fn to_csv(&self, delimiter: char) -> String {
        let mut out = String::new();
        let mut header = vec!["lng", "lat"];
        header.extend(TOWN_HEADERS);
        out.push_str(&header.join(&delimiter.to_string()));
        out.push('\n');
        for town in &self.towns {
            let _ = write!(out, "{}{delimiter}{}", town.location.lng, town.location.lat);
            for value in town.values() {
                out.push(delimiter);
                out.push_str(&value);
            }
            out.push('\n');
        }
        out
    }

    /// The announcement a backend would publish after importing this layer.
    pub fn layer_created(&self, id: &str) -> BusMessage {
        BusMessage::LayerCreated {
            id: LayerId::from(id),
            title: self.title.clone(),
            points: self.points(),
            extent: self.extent().unwrap_or(Extent::WORLD),
        }
    }
}

pub struct TownsFaker {
    rng: DeterministicRng,
}

impl TownsFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    /// A town inside `bounds`.
    pub fn town(&mut self, bounds: Extent) -> Town {
        let lng = self.rng.coordinate(bounds.west, bounds.east);
        let lat = self.rng.coordinate(bounds.south, bounds.north);
        let name = format!(
            "{}{}",
            self.pick(&TOWN_PREFIXES),
            self.pick(&TOWN_SUFFIXES)
        );
        Town {
            location: Point::new(lng, lat),
            name,
            region: self.pick(&REGIONS).to_owned(),
            kind: self.pick(&KINDS).to_owned(),
            population: 100 + self.rng.int_n(250_000) as u32,
        }
    }

    pub fn layer(&mut self, title: &str, count: usize, bounds: Extent) -> TownsLayer {
        TownsLayer {
            title: title.to_owned(),
            towns: (0..count).map(|_| self.town(bounds)).collect(),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

/// Three regional layers used by `--demo` and UI tests.
pub fn demo_layers(seed: u64) -> Vec<TownsLayer> {
    let mut faker = TownsFaker::new(seed);
    vec![
        faker.layer("alpine towns", 40, Extent::new(6.0, 45.5, 14.0, 48.0)),
        faker.layer("coastal towns", 60, Extent::new(-9.5, 36.5, -6.0, 42.0)),
        faker.layer("river towns", 25, Extent::new(4.0, 50.0, 8.0, 53.0)),
    ]
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("geoview.db");
    Ok((dir, db_path))
}

pub fn temp_csv_dir() -> Result<tempfile::TempDir> {
    tempfile::tempdir().context("create temp csv dir")
}

pub fn write_csv(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn write_layer_csv(dir: &Path, layer: &TownsLayer, delimiter: char) -> Result<PathBuf> {
    write_csv(dir, &layer.title, &layer.to_csv(delimiter))
}

#[cfg(test)]
mod tests {
    use super::{TOWN_HEADERS, TownsFaker, demo_layers, temp_csv_dir, write_layer_csv};
    use geoview_app::Extent;

    #[test]
    fn new_deterministic_seed() {
        let bounds = Extent::new(0.0, 0.0, 10.0, 10.0);
        let left = TownsFaker::new(42).layer("a", 5, bounds);
        let right = TownsFaker::new(42).layer("a", 5, bounds);
        assert_eq!(left, right);
    }

    #[test]
    fn towns_stay_inside_bounds() {
        let bounds = Extent::new(-3.0, 10.0, 2.0, 12.0);
        let layer = TownsFaker::new(7).layer("bounded", 200, bounds);
        assert!(layer.towns.iter().all(|town| bounds.contains(town.location)));
        let extent = layer.extent().expect("non-empty layer");
        assert!(extent.is_valid());
    }

    #[test]
    fn csv_has_coordinates_then_attributes() {
        let layer = TownsFaker::new(3).layer("towns", 2, Extent::new(0.0, 0.0, 1.0, 1.0));
        let csv = layer.to_csv(';');
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("lng;lat;name;region;kind;population"));
        let first = lines.next().expect("data row");
        assert_eq!(first.split(';').count(), 2 + TOWN_HEADERS.len());
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn demo_layers_are_distinct() {
        let layers = demo_layers(1);
        assert_eq!(layers.len(), 3);
        assert!(layers.iter().all(|layer| !layer.towns.is_empty()));
    }

    #[test]
    fn layer_csv_file_is_named_after_title() -> anyhow::Result<()> {
        let dir = temp_csv_dir()?;
        let layer = TownsFaker::new(9).layer("towns.csv", 3, Extent::new(0.0, 0.0, 1.0, 1.0));
        let path = write_layer_csv(dir.path(), &layer, ';')?;
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("towns.csv")
        );
        assert!(std::fs::read_to_string(path)?.starts_with("lng;lat;"));
        Ok(())
    }
}
