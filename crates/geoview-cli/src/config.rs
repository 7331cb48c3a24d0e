// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use geoview_app::Extent;
use geoview_tui::UiOptions;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_VERSION: i64 = 1;
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_FILE_NAME: &str = "geoview.log";

/// Accepted keys per section; anything else is a typo worth failing on.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("storage", &["db_path"]),
    (
        "map",
        &[
            "west",
            "south",
            "east",
            "north",
            "hit_tolerance_cells",
            "zoom_step",
        ],
    ),
    ("table", &["overscan_rows"]),
    ("import", &["delimiter"]),
    ("log", &["level", "file"]),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub import: Import,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            map: MapConfig::default(),
            table: TableConfig::default(),
            import: Import::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub west: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub north: Option<f64>,
    pub hit_tolerance_cells: Option<f64>,
    pub zoom_step: Option<f64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            west: Some(Extent::WORLD.west),
            south: Some(Extent::WORLD.south),
            east: Some(Extent::WORLD.east),
            north: Some(Extent::WORLD.north),
            hit_tolerance_cells: Some(geoview_tui::DEFAULT_HIT_TOLERANCE_CELLS),
            zoom_step: Some(geoview_tui::DEFAULT_ZOOM_STEP),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub overscan_rows: Option<i64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            overscan_rows: Some(geoview_tui::DEFAULT_OVERSCAN_ROWS as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Import {
    pub delimiter: Option<String>,
}

impl Default for Import {
    fn default() -> Self {
        Self {
            delimiter: Some(geoview_db::DEFAULT_DELIMITER.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("GEOVIEW_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set GEOVIEW_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(geoview_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` at the top",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        reject_unknown_keys(&value, path)?;

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            geoview_db::validate_db_path(db_path)?;
        }

        if !self.initial_extent().is_valid() {
            bail!(
                "[map] extent in {} is inverted or not finite; need west <= east and south <= north",
                path.display()
            );
        }

        if let Some(cells) = self.map.hit_tolerance_cells
            && !(cells.is_finite() && cells >= 0.0)
        {
            bail!(
                "map.hit_tolerance_cells in {} must be non-negative, got {}",
                path.display(),
                cells
            );
        }

        if let Some(step) = self.map.zoom_step
            && !(step.is_finite() && step > 0.0 && step < 1.0)
        {
            bail!(
                "map.zoom_step in {} must be between 0 and 1, got {}",
                path.display(),
                step
            );
        }

        if let Some(rows) = self.table.overscan_rows
            && rows < 0
        {
            bail!(
                "table.overscan_rows in {} must be non-negative, got {}",
                path.display(),
                rows
            );
        }

        if let Some(delimiter) = &self.import.delimiter {
            geoview_db::validation::parse_delimiter(delimiter).with_context(|| {
                format!(
                    "import.delimiter in {} is {delimiter:?}",
                    path.display()
                )
            })?;
        }

        if let Some(level) = &self.log.level {
            tracing_subscriber::EnvFilter::try_new(level).with_context(|| {
                format!("log.level in {} is not a valid filter", path.display())
            })?;
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => geoview_db::default_db_path(),
        }
    }

    pub fn initial_extent(&self) -> Extent {
        let world = Extent::WORLD;
        Extent::new(
            self.map.west.unwrap_or(world.west),
            self.map.south.unwrap_or(world.south),
            self.map.east.unwrap_or(world.east),
            self.map.north.unwrap_or(world.north),
        )
    }

    pub fn ui_options(&self) -> UiOptions {
        let defaults = UiOptions::default();
        UiOptions {
            hit_tolerance_cells: self
                .map
                .hit_tolerance_cells
                .unwrap_or(defaults.hit_tolerance_cells),
            zoom_step: self.map.zoom_step.unwrap_or(defaults.zoom_step),
            overscan_rows: self
                .table
                .overscan_rows
                .and_then(|rows| usize::try_from(rows).ok())
                .unwrap_or(defaults.overscan_rows),
        }
    }

    pub fn delimiter(&self) -> char {
        self.import
            .delimiter
            .as_deref()
            .and_then(|raw| geoview_db::validation::parse_delimiter(raw).ok())
            .unwrap_or(geoview_db::DEFAULT_DELIMITER)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        let app_dir = data_root.join(geoview_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create data directory {}", app_dir.display()))?;
        Ok(app_dir.join(LOG_FILE_NAME))
    }

    pub fn example_config(path: &Path) -> String {
        let world = Extent::WORLD;
        format!(
            "# geoview config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/geoview/geoview.db)\n# db_path = \"/absolute/path/to/geoview.db\"\n\n[map]\nwest = {:.1}\nsouth = {:.1}\neast = {:.1}\nnorth = {:.1}\nhit_tolerance_cells = {:.1}\nzoom_step = {}\n\n[table]\noverscan_rows = {}\n\n[import]\ndelimiter = \"{}\"\n\n[log]\nlevel = \"{}\"\n# file = \"/absolute/path/to/geoview.log\"\n",
            path.display(),
            world.west,
            world.south,
            world.east,
            world.north,
            geoview_tui::DEFAULT_HIT_TOLERANCE_CELLS,
            geoview_tui::DEFAULT_ZOOM_STEP,
            geoview_tui::DEFAULT_OVERSCAN_ROWS,
            geoview_db::DEFAULT_DELIMITER,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn reject_unknown_keys(value: &toml::Value, path: &Path) -> Result<()> {
    let Some(table) = value.as_table() else {
        return Ok(());
    };
    for (key, entry) in table {
        if key == "version" {
            continue;
        }
        let Some((_, known)) = KNOWN_KEYS.iter().find(|(section, _)| *section == key.as_str()) else {
            bail!(
                "unknown config section [{key}] in {}; run `geoview --print-example-config` to see supported keys",
                path.display()
            );
        };
        let Some(entries) = entry.as_table() else {
            bail!("config key {key} in {} must be a table", path.display());
        };
        if let Some(unknown) = entries.keys().find(|name| !known.contains(&name.as_str())) {
            bail!(
                "unknown config key {key}.{unknown} in {}; supported: {}",
                path.display(),
                known.join(", ")
            );
        }
    }
    Ok(())
}
