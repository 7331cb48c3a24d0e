// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Attribute table window state.
//!
//! Rows come from the backend already sorted; a sort change is always a new
//! fetch. Selection flags are only ever written by bus messages, never by the
//! window's own clicks, so every window on a layer converges on the same
//! selection.

use std::collections::BTreeSet;
use std::ops::Range;
use tracing::debug;

use crate::backend::BackendRequest;
use crate::bus::BusMessage;
use crate::error::{SyncError, SyncResult};
use crate::ids::{FeatureIndex, LayerId, RequestCounter, RequestId, WindowId};
use crate::model::{AttributeRow, AttributeTable, SortSpec};

pub const DEFAULT_OVERSCAN_ROWS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableData {
    Pending,
    Loaded {
        columns: Vec<String>,
        rows: Vec<AttributeRow>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSummary {
    None,
    Some,
    All,
}

/// What a bus message did to this window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    SelectionChanged,
    Deferred,
    Closed,
    Unchanged,
}

/// Fixed-row-height virtual scroll window. Units are whatever the renderer
/// measures in (pixels, terminal lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollWindow {
    pub row_height: u32,
    pub viewport_height: u32,
    pub offset: u32,
    pub overscan: usize,
}

impl Default for ScrollWindow {
    fn default() -> Self {
        Self {
            row_height: 1,
            viewport_height: 0,
            offset: 0,
            overscan: DEFAULT_OVERSCAN_ROWS,
        }
    }
}

impl ScrollWindow {
    /// Rows intersecting the viewport, widened by `overscan` on each side.
    pub fn visible_range(&self, total_rows: usize) -> Range<usize> {
        let row_height = self.row_height.max(1);
        let first = (self.offset / row_height) as usize;
        let last = (self.offset + self.viewport_height).div_ceil(row_height) as usize;
        let start = first.saturating_sub(self.overscan).min(total_rows);
        let end = last.saturating_add(self.overscan).min(total_rows);
        start..end.max(start)
    }

    pub fn max_offset(&self, total_rows: usize) -> u32 {
        let content = (total_rows as u64) * u64::from(self.row_height.max(1));
        let content = u32::try_from(content).unwrap_or(u32::MAX);
        content.saturating_sub(self.viewport_height)
    }

    pub fn scroll_by(&mut self, delta: i64, total_rows: usize) {
        let target = i64::from(self.offset).saturating_add(delta).max(0);
        let target = u32::try_from(target).unwrap_or(u32::MAX);
        self.offset = target.min(self.max_offset(total_rows));
    }

    pub fn set_viewport_height(&mut self, height: u32, total_rows: usize) {
        self.viewport_height = height;
        self.offset = self.offset.min(self.max_offset(total_rows));
    }

    /// Scrolls the minimum amount so `row` is fully inside the viewport.
    pub fn ensure_visible(&mut self, row: usize, total_rows: usize) {
        let row_height = self.row_height.max(1);
        let top = u32::try_from(row).unwrap_or(u32::MAX).saturating_mul(row_height);
        let bottom = top.saturating_add(row_height);
        if top < self.offset {
            self.offset = top;
        } else if bottom > self.offset + self.viewport_height {
            self.offset = bottom.saturating_sub(self.viewport_height);
        }
        self.offset = self.offset.min(self.max_offset(total_rows));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableWindow {
    id: WindowId,
    layer_id: LayerId,
    sort: SortSpec,
    in_flight: Option<RequestId>,
    requests: RequestCounter,
    data: TableData,
    selected: BTreeSet<FeatureIndex>,
    deferred: Vec<BusMessage>,
    closed: bool,
    pub scroll: ScrollWindow,
}

impl TableWindow {
    pub fn new(id: WindowId, layer_id: LayerId) -> Self {
        Self {
            id,
            layer_id,
            sort: SortSpec::default(),
            in_flight: None,
            requests: RequestCounter::default(),
            data: TableData::Pending,
            selected: BTreeSet::new(),
            deferred: Vec::new(),
            closed: false,
            scroll: ScrollWindow::default(),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn layer_id(&self) -> &LayerId {
        &self.layer_id
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn data(&self) -> &TableData {
        &self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// No rows yet and nothing in flight: the first fetch failed.
    pub fn load_failed(&self) -> bool {
        matches!(self.data, TableData::Pending) && self.in_flight.is_none()
    }

    pub fn columns(&self) -> &[String] {
        match &self.data {
            TableData::Pending => &[],
            TableData::Loaded { columns, .. } => columns,
        }
    }

    pub fn rows(&self) -> &[AttributeRow] {
        match &self.data {
            TableData::Pending => &[],
            TableData::Loaded { rows, .. } => rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    pub fn is_selected(&self, feature: FeatureIndex) -> bool {
        self.selected.contains(&feature)
    }

    pub fn selected_features(&self) -> impl Iterator<Item = FeatureIndex> + '_ {
        self.selected.iter().copied()
    }

    /// Rows currently materialized for display, with their selection overlay.
    pub fn visible_rows(&self) -> Vec<(usize, &AttributeRow, bool)> {
        let rows = self.rows();
        self.scroll
            .visible_range(rows.len())
            .map(|position| {
                let row = &rows[position];
                (position, row, self.is_selected(row.index))
            })
            .collect()
    }

    /// Initial fetch for a freshly opened window.
    pub fn open(&mut self) -> BackendRequest {
        self.fetch()
    }

    /// Reissues the fetch for the current sort unless one is already out.
    pub fn retry(&mut self) -> Option<BackendRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        Some(self.fetch())
    }

    /// Header click. Returns the refetch to issue, or `None` when the column
    /// does not exist.
    pub fn click_header(&mut self, column: usize) -> Option<BackendRequest> {
        if column >= self.columns().len() {
            return None;
        }
        self.sort = self.sort.toggled(column);
        Some(self.fetch())
    }

    /// Applies a fetch result if it answers the latest request for the
    /// current sort; anything else is stale and leaves the window untouched.
    pub fn apply_response(
        &mut self,
        request_id: RequestId,
        sort: SortSpec,
        table: AttributeTable,
    ) -> SyncResult<()> {
        if self.in_flight != Some(request_id) || sort != self.sort {
            debug!(window = %self.id, %request_id, "discard stale attribute table");
            return Err(SyncError::StaleResponse { request_id });
        }
        self.in_flight = None;
        let total = table.body.len();
        self.data = TableData::Loaded {
            columns: table.headers,
            rows: table.body,
        };
        self.scroll.offset = self.scroll.offset.min(self.scroll.max_offset(total));

        for message in std::mem::take(&mut self.deferred) {
            let _ = self.apply_message(&message);
        }
        Ok(())
    }

    /// A failed fetch clears the in-flight marker so a retry can go out.
    pub fn fetch_failed(&mut self, request_id: RequestId) {
        if self.in_flight == Some(request_id) {
            self.in_flight = None;
        }
    }

    pub fn apply_message(&mut self, message: &BusMessage) -> SyncResult<TableChange> {
        if *message.layer_id() != self.layer_id {
            return Err(SyncError::UnscopedEvent {
                layer_id: message.layer_id().clone(),
            });
        }
        if matches!(message, BusMessage::LayerDeleted { .. }) {
            self.closed = true;
            return Ok(TableChange::Closed);
        }
        if matches!(self.data, TableData::Pending) {
            self.defer(message);
            return Ok(TableChange::Deferred);
        }

        let changed = match message {
            BusMessage::FeatureSelected { feature_id, .. } => self.selected.insert(*feature_id),
            BusMessage::FeatureUnselected { feature_id, .. } => self.selected.remove(feature_id),
            BusMessage::AllFeaturesSelected { .. } => {
                let before = self.selected.len();
                let indices = self.rows().iter().map(|row| row.index).collect::<Vec<_>>();
                self.selected.extend(indices);
                self.selected.len() != before
            }
            BusMessage::AllFeaturesUnselected { .. } => {
                let changed = !self.selected.is_empty();
                self.selected.clear();
                changed
            }
            BusMessage::LayerCreated { .. }
            | BusMessage::LayerDeleted { .. }
            | BusMessage::FeatureZoomed { .. } => false,
        };
        Ok(if changed {
            TableChange::SelectionChanged
        } else {
            TableChange::Unchanged
        })
    }

    /// Row click asks the backend to zoom; the highlight comes back over the
    /// bus.
    pub fn click_row(&self, position: usize) -> Option<BackendRequest> {
        let row = self.rows().get(position)?;
        Some(BackendRequest::ZoomToFeature {
            layer_id: self.layer_id.clone(),
            feature_id: row.index,
        })
    }

    /// Checkbox click. The flag flips only when the echo arrives.
    pub fn toggle_row(&self, position: usize) -> Option<BackendRequest> {
        let row = self.rows().get(position)?;
        let layer_id = self.layer_id.clone();
        let feature_id = row.index;
        Some(if self.is_selected(feature_id) {
            BackendRequest::UnselectFeature {
                layer_id,
                feature_id,
            }
        } else {
            BackendRequest::SelectFeature {
                layer_id,
                feature_id,
            }
        })
    }

    pub fn selection_summary(&self) -> SelectionSummary {
        let rows = self.rows();
        let selected = rows
            .iter()
            .filter(|row| self.is_selected(row.index))
            .count();
        if selected == 0 {
            SelectionSummary::None
        } else if selected == rows.len() {
            SelectionSummary::All
        } else {
            SelectionSummary::Some
        }
    }

    /// Header checkbox: anything short of all selected selects all.
    pub fn click_select_all(&self) -> BackendRequest {
        let layer_id = self.layer_id.clone();
        match self.selection_summary() {
            SelectionSummary::All => BackendRequest::UnselectAllFeatures { layer_id },
            SelectionSummary::None | SelectionSummary::Some => {
                BackendRequest::SelectAllFeatures { layer_id }
            }
        }
    }

    /// Queues a selection message for replay after the first load. The
    /// queue holds at most one bulk message followed by one message per
    /// feature, so it stays bounded however long the load takes.
    fn defer(&mut self, message: &BusMessage) {
        match message {
            BusMessage::AllFeaturesSelected { .. } | BusMessage::AllFeaturesUnselected { .. } => {
                self.deferred.clear();
            }
            BusMessage::FeatureSelected { feature_id, .. }
            | BusMessage::FeatureUnselected { feature_id, .. } => {
                let feature_id = *feature_id;
                self.deferred
                    .retain(|queued| deferred_feature(queued) != Some(feature_id));
            }
            BusMessage::LayerCreated { .. }
            | BusMessage::LayerDeleted { .. }
            | BusMessage::FeatureZoomed { .. } => return,
        }
        self.deferred.push(message.clone());
    }

    fn fetch(&mut self) -> BackendRequest {
        let request_id = self.requests.next();
        self.in_flight = Some(request_id);
        BackendRequest::GetLayerAttributes {
            request_id,
            layer_id: self.layer_id.clone(),
            sort: self.sort,
        }
    }
}

fn deferred_feature(message: &BusMessage) -> Option<FeatureIndex> {
    match message {
        BusMessage::FeatureSelected { feature_id, .. }
        | BusMessage::FeatureUnselected { feature_id, .. } => Some(*feature_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ScrollWindow, SelectionSummary, TableChange, TableData, TableWindow};
    use crate::backend::BackendRequest;
    use crate::bus::BusMessage;
    use crate::error::SyncError;
    use crate::ids::{FeatureIndex, LayerId, RequestId, WindowId};
    use crate::model::{AttributeRow, AttributeTable, SortDirection, SortSpec};

    fn table(rows: &[(usize, &str)]) -> AttributeTable {
        AttributeTable {
            headers: vec!["name".to_owned(), "pop".to_owned()],
            body: rows
                .iter()
                .map(|(index, name)| AttributeRow {
                    index: FeatureIndex::new(*index),
                    values: vec![(*name).to_owned(), "1".to_owned()],
                })
                .collect(),
        }
    }

    fn request_of(request: &BackendRequest) -> (RequestId, SortSpec) {
        match request {
            BackendRequest::GetLayerAttributes {
                request_id, sort, ..
            } => (*request_id, *sort),
            other => panic!("unexpected request {other:?}"),
        }
    }

    fn loaded_window(layer: &str, rows: &[(usize, &str)]) -> TableWindow {
        let mut window = TableWindow::new(WindowId::new(1), LayerId::from(layer));
        let (request_id, sort) = request_of(&window.open());
        window
            .apply_response(request_id, sort, table(rows))
            .expect("fresh response");
        window
    }

    fn selected(layer: &str, feature: usize) -> BusMessage {
        BusMessage::FeatureSelected {
            layer_id: LayerId::from(layer),
            feature_id: FeatureIndex::new(feature),
        }
    }

    #[test]
    fn header_clicks_toggle_then_reset_direction() {
        let mut window = loaded_window("L1", &[(0, "a")]);
        assert_eq!(window.sort(), SortSpec::new(0, SortDirection::Asc));

        let (_, sort) = request_of(&window.click_header(0).expect("column exists"));
        assert_eq!(sort, SortSpec::new(0, SortDirection::Desc));

        let (_, sort) = request_of(&window.click_header(1).expect("column exists"));
        assert_eq!(sort, SortSpec::new(1, SortDirection::Asc));

        assert!(window.click_header(9).is_none());
    }

    #[test]
    fn sort_change_refetches_instead_of_sorting_locally() {
        let mut window = loaded_window("L1", &[(0, "b"), (1, "a")]);
        let request = window.click_header(0).expect("column exists");
        assert!(matches!(request, BackendRequest::GetLayerAttributes { .. }));
        assert!(window.is_loading());
        let order = window
            .rows()
            .iter()
            .map(|row| row.index.get())
            .collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1], "rows untouched until the fetch lands");
    }

    #[test]
    fn stale_sort_response_is_discarded() {
        let mut window = loaded_window("L1", &[(0, "a"), (1, "b")]);
        let (first_id, first_sort) = request_of(&window.click_header(0).expect("column"));
        let (second_id, second_sort) = request_of(&window.click_header(1).expect("column"));

        let err = window
            .apply_response(first_id, first_sort, table(&[(1, "b"), (0, "a")]))
            .expect_err("superseded request");
        assert_eq!(
            err,
            SyncError::StaleResponse {
                request_id: first_id
            }
        );

        window
            .apply_response(second_id, second_sort, table(&[(1, "b"), (0, "a")]))
            .expect("current request");
        assert_eq!(window.rows()[0].index, FeatureIndex::new(1));
        assert!(!window.is_loading());
    }

    #[test]
    fn selection_only_follows_bus_messages() {
        let mut window = loaded_window("L1", &[(0, "a"), (3, "b")]);
        let request = window.toggle_row(1).expect("row exists");
        assert_eq!(
            request,
            BackendRequest::SelectFeature {
                layer_id: LayerId::from("L1"),
                feature_id: FeatureIndex::new(3),
            }
        );
        assert!(!window.is_selected(FeatureIndex::new(3)), "no optimistic flag");

        assert_eq!(
            window.apply_message(&selected("L1", 3)),
            Ok(TableChange::SelectionChanged)
        );
        assert!(window.is_selected(FeatureIndex::new(3)));
        assert!(matches!(
            window.toggle_row(1),
            Some(BackendRequest::UnselectFeature { .. })
        ));
    }

    #[test]
    fn other_layer_messages_are_unscoped() {
        let mut window = loaded_window("L1", &[(0, "a")]);
        let err = window
            .apply_message(&selected("L2", 0))
            .expect_err("different layer");
        assert!(matches!(err, SyncError::UnscopedEvent { .. }));
        assert!(!window.is_selected(FeatureIndex::new(0)));
    }

    #[test]
    fn bulk_selection_and_tri_state_header() {
        let mut window = loaded_window("L1", &[(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(window.selection_summary(), SelectionSummary::None);
        assert!(matches!(
            window.click_select_all(),
            BackendRequest::SelectAllFeatures { .. }
        ));

        window.apply_message(&selected("L1", 1)).expect("scoped");
        assert_eq!(window.selection_summary(), SelectionSummary::Some);
        assert!(matches!(
            window.click_select_all(),
            BackendRequest::SelectAllFeatures { .. }
        ));

        window
            .apply_message(&BusMessage::AllFeaturesSelected {
                layer_id: LayerId::from("L1"),
            })
            .expect("scoped");
        assert_eq!(window.selection_summary(), SelectionSummary::All);
        assert!(matches!(
            window.click_select_all(),
            BackendRequest::UnselectAllFeatures { .. }
        ));

        window
            .apply_message(&BusMessage::AllFeaturesUnselected {
                layer_id: LayerId::from("L1"),
            })
            .expect("scoped");
        assert_eq!(window.selection_summary(), SelectionSummary::None);
    }

    #[test]
    fn messages_before_first_load_are_replayed() {
        let mut window = TableWindow::new(WindowId::new(7), LayerId::from("L1"));
        let (request_id, sort) = request_of(&window.open());
        assert_eq!(window.data(), &TableData::Pending);

        assert_eq!(
            window.apply_message(&selected("L1", 2)),
            Ok(TableChange::Deferred)
        );
        window
            .apply_response(request_id, sort, table(&[(1, "a"), (2, "b")]))
            .expect("fresh");
        assert!(window.is_selected(FeatureIndex::new(2)));
    }

    #[test]
    fn failed_first_load_can_be_retried() {
        let mut window = TableWindow::new(WindowId::new(7), LayerId::from("L1"));
        let (failed_id, _) = request_of(&window.open());
        assert!(window.retry().is_none(), "fetch already in flight");

        window.apply_message(&selected("L1", 1)).expect("scoped");
        window.fetch_failed(failed_id);
        assert!(window.load_failed());
        assert!(window.click_header(0).is_none(), "no columns yet");

        let (request_id, sort) = request_of(&window.retry().expect("nothing in flight"));
        assert_ne!(request_id, failed_id);
        assert!(!window.load_failed());
        window
            .apply_response(request_id, sort, table(&[(0, "a"), (1, "b")]))
            .expect("fresh");
        assert!(window.is_selected(FeatureIndex::new(1)));
    }

    #[test]
    fn deferred_queue_keeps_only_the_latest_state() {
        let mut window = TableWindow::new(WindowId::new(7), LayerId::from("L1"));
        let (request_id, sort) = request_of(&window.open());
        let unselected = |feature| BusMessage::FeatureUnselected {
            layer_id: LayerId::from("L1"),
            feature_id: FeatureIndex::new(feature),
        };

        for _ in 0..50 {
            window.apply_message(&selected("L1", 0)).expect("scoped");
            window.apply_message(&unselected(0)).expect("scoped");
        }
        window.apply_message(&selected("L1", 2)).expect("scoped");
        assert_eq!(window.deferred, vec![unselected(0), selected("L1", 2)]);

        let all = BusMessage::AllFeaturesSelected {
            layer_id: LayerId::from("L1"),
        };
        window.apply_message(&all).expect("scoped");
        window.apply_message(&unselected(1)).expect("scoped");
        assert_eq!(window.deferred, vec![all, unselected(1)]);

        window
            .apply_response(request_id, sort, table(&[(0, "a"), (1, "b"), (2, "c")]))
            .expect("fresh");
        let picked = window.selected_features().map(FeatureIndex::get).collect::<Vec<_>>();
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn selection_survives_refetch() {
        let mut window = loaded_window("L1", &[(0, "a"), (1, "b")]);
        window.apply_message(&selected("L1", 0)).expect("scoped");
        let (request_id, sort) = request_of(&window.click_header(0).expect("column"));
        window
            .apply_response(request_id, sort, table(&[(1, "b"), (0, "a")]))
            .expect("fresh");
        let flags = window
            .visible_rows()
            .into_iter()
            .map(|(_, row, selected)| (row.index.get(), selected))
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![(1, false), (0, true)]);
    }

    #[test]
    fn layer_deleted_closes_window() {
        let mut window = loaded_window("L1", &[(0, "a")]);
        assert_eq!(
            window.apply_message(&BusMessage::LayerDeleted {
                layer_id: LayerId::from("L1"),
            }),
            Ok(TableChange::Closed)
        );
        assert!(window.is_closed());
    }

    #[test]
    fn row_click_requests_zoom_without_local_change() {
        let window = loaded_window("L1", &[(5, "a")]);
        assert_eq!(
            window.click_row(0),
            Some(BackendRequest::ZoomToFeature {
                layer_id: LayerId::from("L1"),
                feature_id: FeatureIndex::new(5),
            })
        );
        assert_eq!(window.click_row(1), None);
    }

    #[test]
    fn scroll_window_materializes_only_visible_rows() {
        let mut scroll = ScrollWindow {
            row_height: 20,
            viewport_height: 100,
            offset: 0,
            overscan: 0,
        };
        assert_eq!(scroll.visible_range(1000), 0..5);

        scroll.offset = 210;
        assert_eq!(scroll.visible_range(1000), 10..16);

        scroll.overscan = 2;
        assert_eq!(scroll.visible_range(1000), 8..18);
        assert_eq!(scroll.visible_range(12), 8..12);
        assert_eq!(scroll.visible_range(0), 0..0);
    }

    #[test]
    fn scroll_is_clamped_to_content() {
        let mut scroll = ScrollWindow {
            row_height: 1,
            viewport_height: 10,
            offset: 0,
            overscan: 0,
        };
        scroll.scroll_by(-5, 50);
        assert_eq!(scroll.offset, 0);
        scroll.scroll_by(100, 50);
        assert_eq!(scroll.offset, 40);

        scroll.ensure_visible(3, 50);
        assert_eq!(scroll.offset, 3);
        scroll.ensure_visible(20, 50);
        assert_eq!(scroll.offset, 11);
    }
}
