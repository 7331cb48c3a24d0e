// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod validation;

use anyhow::{Context, Result, anyhow, bail};
use geoview_app::{
    AttributeRow, AttributeTable, BusMessage, Extent, FeatureIndex, Field, LayerId, Point,
    SortSpec,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use uuid::Uuid;

use crate::validation::{ParsedCsv, numeric_sort_key, parse_csv};

pub const APP_NAME: &str = "geoview";
pub const DEFAULT_DELIMITER: char = ';';

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "layers",
        &[
            "id",
            "title",
            "source_path",
            "west",
            "south",
            "east",
            "north",
            "imported_at",
        ],
    ),
    ("layer_columns", &["layer_id", "position", "name"]),
    (
        "features",
        &["layer_id", "feature_index", "lng", "lat", "selected"],
    ),
    (
        "feature_values",
        &["layer_id", "feature_index", "position", "value", "number"],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_features_selected",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_features_selected ON features (layer_id, selected);",
    },
    RequiredIndex {
        name: "idx_feature_values_sort",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_feature_values_sort ON feature_values (layer_id, position, number, value);",
    },
];

/// A layer as announced to the front-end after import or on startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLayer {
    pub id: LayerId,
    pub title: String,
    pub headers: Vec<String>,
    pub points: Vec<Point>,
    pub extent: Extent,
}

impl StoredLayer {
    pub fn layer_created(&self) -> BusMessage {
        BusMessage::LayerCreated {
            id: self.id.clone(),
            title: self.title.clone(),
            points: self.points.clone(),
            extent: self.extent,
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    /// Imports a CSV file; the file name becomes the layer title.
    pub fn import_csv_file(&self, path: &Path, delimiter: char) -> Result<StoredLayer> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
        let parsed =
            parse_csv(&contents, delimiter).with_context(|| format!("parse {}", path.display()))?;
        self.insert_layer(&title, &path.to_string_lossy(), &parsed)
    }

    pub fn import_csv_text(
        &self,
        title: &str,
        contents: &str,
        delimiter: char,
    ) -> Result<StoredLayer> {
        let parsed = parse_csv(contents, delimiter).with_context(|| format!("parse {title}"))?;
        self.insert_layer(title, "", &parsed)
    }

    fn insert_layer(&self, title: &str, source_path: &str, parsed: &ParsedCsv) -> Result<StoredLayer> {
        let points = parsed.points();
        let extent = Extent::from_points(&points)
            .ok_or_else(|| anyhow!("layer {title} has no features"))?;
        let id = LayerId::new(Uuid::new_v4().to_string());

        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin import transaction")?;
        tx.execute(
            "
            INSERT INTO layers (id, title, source_path, west, south, east, north, imported_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                id.as_str(),
                title,
                source_path,
                extent.west,
                extent.south,
                extent.east,
                extent.north,
                now_rfc3339()?,
            ],
        )
        .with_context(|| format!("insert layer {title}"))?;

        for (position, name) in parsed.headers.iter().enumerate() {
            tx.execute(
                "INSERT INTO layer_columns (layer_id, position, name) VALUES (?, ?, ?)",
                params![id.as_str(), position as i64, name],
            )
            .with_context(|| format!("insert column {name}"))?;
        }

        {
            let mut insert_feature = tx
                .prepare(
                    "INSERT INTO features (layer_id, feature_index, lng, lat) VALUES (?, ?, ?, ?)",
                )
                .context("prepare feature insert")?;
            let mut insert_value = tx
                .prepare(
                    "
                    INSERT INTO feature_values (layer_id, feature_index, position, value, number)
                    VALUES (?, ?, ?, ?, ?)
                    ",
                )
                .context("prepare value insert")?;
            for (index, feature) in parsed.features.iter().enumerate() {
                insert_feature
                    .execute(params![
                        id.as_str(),
                        index as i64,
                        feature.location.lng,
                        feature.location.lat
                    ])
                    .with_context(|| format!("insert feature {index}"))?;
                for (position, value) in feature.values.iter().enumerate() {
                    insert_value
                        .execute(params![
                            id.as_str(),
                            index as i64,
                            position as i64,
                            value,
                            numeric_sort_key(value)
                        ])
                        .with_context(|| format!("insert value {position} of feature {index}"))?;
                }
            }
        }
        tx.commit().context("commit import")?;

        info!(layer_id = %id, %title, features = points.len(), "imported layer");
        Ok(StoredLayer {
            id,
            title: title.to_owned(),
            headers: parsed.headers.clone(),
            points,
            extent,
        })
    }

    /// Every stored layer in import order, for replaying announcements.
    pub fn list_layers(&self) -> Result<Vec<StoredLayer>> {
        let ids = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM layers ORDER BY imported_at ASC, rowid ASC")
                .context("prepare layer list")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .context("query layers")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("collect layers")?
        };
        ids.into_iter()
            .map(|id| self.get_layer(&LayerId::new(id)))
            .collect()
    }

    pub fn get_layer(&self, layer_id: &LayerId) -> Result<StoredLayer> {
        let (title, west, south, east, north) = self
            .conn
            .query_row(
                "SELECT title, west, south, east, north FROM layers WHERE id = ?",
                params![layer_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("load layer {layer_id}"))?
            .ok_or_else(|| anyhow!("layer {layer_id} not found"))?;

        let mut stmt = self
            .conn
            .prepare("SELECT lng, lat FROM features WHERE layer_id = ? ORDER BY feature_index ASC")
            .context("prepare feature points")?;
        let points = stmt
            .query_map(params![layer_id.as_str()], |row| {
                Ok(Point::new(row.get(0)?, row.get(1)?))
            })
            .with_context(|| format!("query points of {layer_id}"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect points of {layer_id}"))?;

        Ok(StoredLayer {
            id: layer_id.clone(),
            title,
            headers: self.layer_headers(layer_id)?,
            points,
            extent: Extent::new(west, south, east, north),
        })
    }

    pub fn layer_exists(&self, layer_id: &LayerId) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM layers WHERE id = ?)",
                params![layer_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("check layer {layer_id}"))?;
        Ok(exists == 1)
    }

    /// Returns whether a layer was removed. Deleting an unknown id is not an
    /// error, the front-end may race its own delete.
    pub fn delete_layer(&self, layer_id: &LayerId) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM layers WHERE id = ?", params![layer_id.as_str()])
            .with_context(|| format!("delete layer {layer_id}"))?;
        if removed > 0 {
            info!(%layer_id, "deleted layer");
        }
        Ok(removed > 0)
    }

    pub fn layer_headers(&self, layer_id: &LayerId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM layer_columns WHERE layer_id = ? ORDER BY position ASC")
            .context("prepare column list")?;
        let rows = stmt
            .query_map(params![layer_id.as_str()], |row| row.get::<_, String>(0))
            .with_context(|| format!("query columns of {layer_id}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect columns of {layer_id}"))
    }

    /// Attribute rows sorted by one column. Numeric values order numerically
    /// and after non-numeric text; ties keep feature order. A column outside
    /// the header leaves rows in feature order.
    pub fn layer_attributes(&self, layer_id: &LayerId, sort: SortSpec) -> Result<AttributeTable> {
        if !self.layer_exists(layer_id)? {
            bail!("layer {layer_id} not found");
        }
        let headers = self.layer_headers(layer_id)?;

        let order = {
            let direction = sort.direction.as_str();
            let query = format!(
                "
                SELECT f.feature_index
                FROM features f
                LEFT JOIN feature_values v
                  ON v.layer_id = f.layer_id
                 AND v.feature_index = f.feature_index
                 AND v.position = ?2
                WHERE f.layer_id = ?1
                ORDER BY v.number {direction}, v.value {direction}, f.feature_index ASC
                "
            );
            let mut stmt = self.conn.prepare(&query).context("prepare sorted features")?;
            let rows = stmt
                .query_map(params![layer_id.as_str(), sort.column as i64], |row| {
                    row.get::<_, i64>(0)
                })
                .with_context(|| format!("query sorted features of {layer_id}"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .with_context(|| format!("collect sorted features of {layer_id}"))?
        };

        let mut values = self.feature_values(layer_id, headers.len())?;
        let body = order
            .into_iter()
            .map(|index| AttributeRow {
                index: FeatureIndex::new(index as usize),
                values: values
                    .remove(&index)
                    .unwrap_or_else(|| vec![String::new(); headers.len()]),
            })
            .collect();
        Ok(AttributeTable { headers, body })
    }

    pub fn feature_attributes(
        &self,
        layer_id: &LayerId,
        feature_id: FeatureIndex,
    ) -> Result<Vec<Field>> {
        self.feature_location(layer_id, feature_id)?;
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT c.name, COALESCE(v.value, '')
                FROM layer_columns c
                LEFT JOIN feature_values v
                  ON v.layer_id = c.layer_id
                 AND v.position = c.position
                 AND v.feature_index = ?2
                WHERE c.layer_id = ?1
                ORDER BY c.position ASC
                ",
            )
            .context("prepare feature attributes")?;
        let rows = stmt
            .query_map(
                params![layer_id.as_str(), feature_id.get() as i64],
                |row| {
                    Ok(Field {
                        name: row.get(0)?,
                        value: row.get(1)?,
                    })
                },
            )
            .with_context(|| format!("query attributes of feature {feature_id}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect attributes of feature {feature_id}"))
    }

    pub fn feature_location(&self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<Point> {
        self.conn
            .query_row(
                "SELECT lng, lat FROM features WHERE layer_id = ? AND feature_index = ?",
                params![layer_id.as_str(), feature_id.get() as i64],
                |row| Ok(Point::new(row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("load feature {feature_id} of {layer_id}"))?
            .ok_or_else(|| anyhow!("feature {feature_id} of layer {layer_id} not found"))
    }

    /// Zero-area extent around one feature; callers pad it for display.
    pub fn feature_extent(&self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<Extent> {
        let point = self.feature_location(layer_id, feature_id)?;
        Ok(Extent::new(point.lng, point.lat, point.lng, point.lat))
    }

    /// Returns whether the flag actually changed.
    pub fn set_selected(
        &self,
        layer_id: &LayerId,
        feature_id: FeatureIndex,
        selected: bool,
    ) -> Result<bool> {
        self.feature_location(layer_id, feature_id)?;
        let changed = self
            .conn
            .execute(
                "
                UPDATE features SET selected = ?3
                WHERE layer_id = ?1 AND feature_index = ?2 AND selected <> ?3
                ",
                params![layer_id.as_str(), feature_id.get() as i64, selected],
            )
            .with_context(|| format!("update selection of feature {feature_id}"))?;
        Ok(changed > 0)
    }

    /// Returns how many features changed.
    pub fn set_all_selected(&self, layer_id: &LayerId, selected: bool) -> Result<usize> {
        if !self.layer_exists(layer_id)? {
            bail!("layer {layer_id} not found");
        }
        self.conn
            .execute(
                "UPDATE features SET selected = ?2 WHERE layer_id = ?1 AND selected <> ?2",
                params![layer_id.as_str(), selected],
            )
            .with_context(|| format!("update selection of layer {layer_id}"))
    }

    pub fn selected_features(&self, layer_id: &LayerId) -> Result<Vec<FeatureIndex>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT feature_index
                FROM features
                WHERE layer_id = ? AND selected = 1
                ORDER BY feature_index ASC
                ",
            )
            .context("prepare selected features")?;
        let rows = stmt
            .query_map(params![layer_id.as_str()], |row| row.get::<_, i64>(0))
            .with_context(|| format!("query selection of {layer_id}"))?;
        let indices = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect selection of {layer_id}"))?;
        Ok(indices
            .into_iter()
            .map(|index| FeatureIndex::new(index as usize))
            .collect())
    }

    fn feature_values(
        &self,
        layer_id: &LayerId,
        width: usize,
    ) -> Result<HashMap<i64, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT feature_index, position, value
                FROM feature_values
                WHERE layer_id = ?
                ",
            )
            .context("prepare feature values")?;
        let rows = stmt
            .query_map(params![layer_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .with_context(|| format!("query values of {layer_id}"))?;

        let mut values: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            let (index, position, value) =
                row.with_context(|| format!("read value of {layer_id}"))?;
            let slot = values
                .entry(index)
                .or_insert_with(|| vec![String::new(); width]);
            if let Some(cell) = usize::try_from(position)
                .ok()
                .and_then(|position| slot.get_mut(position))
            {
                *cell = value;
            }
        }
        Ok(values)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("GEOVIEW_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set GEOVIEW_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("geoview.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a geoview database or start from an empty file"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}
