// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tracing::debug;

use crate::backend::BackendRequest;
use crate::bus::BusMessage;
use crate::error::SyncError;
use crate::highlight::{FeatureRef, Highlight, HighlightCoordinator, hit_test};
use crate::ids::{FeatureIndex, LayerId, RequestCounter, RequestId};
use crate::layers::LayerCollection;
use crate::model::{Extent, Field, Layer, LayerColor, Point};
use crate::viewport::{ExtentOrigin, ExtentReport, ViewportBinding};

/// Attributes of the clicked feature, shown next to the map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeaturePanel {
    #[default]
    Empty,
    Loading {
        request_id: RequestId,
        feature: FeatureRef,
    },
    Loaded {
        feature: FeatureRef,
        fields: Vec<Field>,
    },
}

impl FeaturePanel {
    pub fn feature(&self) -> Option<&FeatureRef> {
        match self {
            Self::Empty => None,
            Self::Loading { feature, .. } | Self::Loaded { feature, .. } => Some(feature),
        }
    }
}

/// Main-window state. Single writer: everything goes through `dispatch`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub layers: LayerCollection,
    pub highlight: HighlightCoordinator,
    pub viewport: ViewportBinding,
    pub feature_panel: FeaturePanel,
    pub notice: Option<String>,
    requests: RequestCounter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Bus(BusMessage),
    SetVisible { layer_id: LayerId, visible: bool },
    ToggleVisible(LayerId),
    SetColor { layer_id: LayerId, color: LayerColor },
    CycleColor(LayerId),
    Reorder(Vec<LayerId>),
    MoveLayer { layer_id: LayerId, delta: isize },
    DeleteLayer(LayerId),
    ZoomToLayer(LayerId),
    OpenAttributeTable(LayerId),
    MapExtentChanged(Extent),
    PointerMoved { at: Point, tolerance: f64 },
    MapClicked { at: Point, tolerance: f64 },
    FeatureAttributesLoaded {
        request_id: RequestId,
        fields: Vec<Field>,
    },
    BackendFailed(String),
    DismissNotice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    LayersChanged { version: u64 },
    HighlightChanged(Highlight),
    ExtentChanged { extent: Extent, origin: ExtentOrigin },
    /// The renderer must move to this extent.
    ForwardExtent(Extent),
    FeaturePanelChanged,
    Request(BackendRequest),
    NoticeUpdated(String),
    NoticeCleared,
    Rejected(SyncError),
}

impl AppState {
    pub fn new(initial_extent: Extent) -> Self {
        Self {
            viewport: ViewportBinding::new(initial_extent),
            ..Self::default()
        }
    }

    pub fn with_viewport(mut self, viewport: ViewportBinding) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::Bus(message) => self.apply_bus(message),
            AppCommand::SetVisible { layer_id, visible } => {
                let next = self.layers.set_visible(&layer_id, visible);
                self.commit(next)
            }
            AppCommand::ToggleVisible(layer_id) => {
                let Some(visible) = self.layers.get(&layer_id).map(|layer| layer.visible) else {
                    return Vec::new();
                };
                let next = self.layers.set_visible(&layer_id, !visible);
                self.commit(next)
            }
            AppCommand::SetColor { layer_id, color } => {
                let next = self.layers.set_color(&layer_id, color);
                self.commit(next)
            }
            AppCommand::CycleColor(layer_id) => {
                let Some(color) = self.layers.get(&layer_id).map(|layer| layer.color) else {
                    return Vec::new();
                };
                let next = self.layers.set_color(&layer_id, color.next());
                self.commit(next)
            }
            AppCommand::Reorder(ids) => match self.layers.reorder(&ids) {
                Ok(next) => self.commit(next),
                Err(error) => self.reject(error),
            },
            AppCommand::MoveLayer { layer_id, delta } => {
                match self.layers.moved(&layer_id, delta) {
                    Ok(next) => self.commit(next),
                    Err(error) => self.reject(error),
                }
            }
            AppCommand::DeleteLayer(layer_id) => self.delete_layer(layer_id),
            AppCommand::ZoomToLayer(layer_id) => {
                let Some(extent) = self.layers.get(&layer_id).map(|layer| layer.extent) else {
                    return Vec::new();
                };
                self.zoom_to(extent)
            }
            AppCommand::OpenAttributeTable(layer_id) => {
                if self.layers.get(&layer_id).is_none() {
                    return Vec::new();
                }
                vec![AppEvent::Request(BackendRequest::CreateTableWindow {
                    layer_id,
                })]
            }
            AppCommand::MapExtentChanged(extent) => match self.viewport.request_extent(extent) {
                Ok(ExtentReport::Gesture(extent)) => vec![AppEvent::ExtentChanged {
                    extent,
                    origin: ExtentOrigin::Map,
                }],
                Ok(ExtentReport::Echo(_)) => Vec::new(),
                Err(error) => {
                    debug!(%error, "drop renderer extent");
                    Vec::new()
                }
            },
            AppCommand::PointerMoved { at, tolerance } => {
                let hits = hit_test(&self.layers, at, tolerance);
                self.highlight
                    .pointer_moved(&hits)
                    .map(AppEvent::HighlightChanged)
                    .into_iter()
                    .collect()
            }
            AppCommand::MapClicked { at, tolerance } => {
                let hits = hit_test(&self.layers, at, tolerance);
                let before = self.highlight.current().clone();
                let Some(feature) = self.highlight.clicked(&hits) else {
                    return Vec::new();
                };
                let mut events = Vec::new();
                if *self.highlight.current() != before {
                    events.push(AppEvent::HighlightChanged(self.highlight.current().clone()));
                }
                events.extend(self.request_feature_attributes(feature));
                events
            }
            AppCommand::FeatureAttributesLoaded { request_id, fields } => {
                self.apply_feature_attributes(request_id, fields)
            }
            AppCommand::BackendFailed(message) => {
                vec![self.set_notice(message)]
            }
            AppCommand::DismissNotice => {
                if self.notice.take().is_none() {
                    return Vec::new();
                }
                vec![AppEvent::NoticeCleared]
            }
        }
    }

    /// Closes the current update cycle: renderer reports after this are
    /// user gestures again.
    pub fn end_cycle(&mut self) {
        self.viewport.end_cycle();
    }

    fn apply_bus(&mut self, message: BusMessage) -> Vec<AppEvent> {
        match message {
            BusMessage::LayerCreated {
                id,
                title,
                points,
                extent,
            } => {
                let next = self.layers.create(Layer::new(id, title, points, extent));
                self.commit(next)
            }
            BusMessage::LayerDeleted { layer_id } => {
                let next = self.layers.remove(&layer_id);
                let mut events = self.commit(next);
                events.extend(self.forget_layer(&layer_id));
                events
            }
            BusMessage::FeatureZoomed {
                layer_id,
                feature_id,
                extent,
            } => {
                if self.layers.get(&layer_id).is_none() {
                    debug!(%layer_id, "ignore zoom for unknown layer");
                    return Vec::new();
                }
                let mut events = self.zoom_to(extent);
                if let Some(highlight) = self
                    .highlight
                    .focus(FeatureRef::new(layer_id, feature_id))
                {
                    events.push(AppEvent::HighlightChanged(highlight));
                }
                events
            }
            // Row selection lives in table windows; the main window has no
            // per-row state to update.
            BusMessage::FeatureSelected { .. }
            | BusMessage::FeatureUnselected { .. }
            | BusMessage::AllFeaturesSelected { .. }
            | BusMessage::AllFeaturesUnselected { .. } => Vec::new(),
        }
    }

    fn delete_layer(&mut self, layer_id: LayerId) -> Vec<AppEvent> {
        if self.layers.get(&layer_id).is_none() {
            return Vec::new();
        }
        let next = self.layers.remove(&layer_id);
        let mut events = self.commit(next);
        events.extend(self.forget_layer(&layer_id));
        events.push(AppEvent::Request(BackendRequest::DeleteLayer { layer_id }));
        events
    }

    fn forget_layer(&mut self, layer_id: &LayerId) -> Vec<AppEvent> {
        let mut events = Vec::new();
        if let Some(highlight) = self.highlight.forget_layer(layer_id) {
            events.push(AppEvent::HighlightChanged(highlight));
        }
        if self
            .feature_panel
            .feature()
            .is_some_and(|feature| feature.layer_id == *layer_id)
        {
            self.feature_panel = FeaturePanel::Empty;
            events.push(AppEvent::FeaturePanelChanged);
        }
        events
    }

    fn zoom_to(&mut self, extent: Extent) -> Vec<AppEvent> {
        match self.viewport.zoom_to(extent) {
            Ok(target) => vec![
                AppEvent::ForwardExtent(target),
                AppEvent::ExtentChanged {
                    extent: target,
                    origin: ExtentOrigin::Binding,
                },
            ],
            Err(error) => {
                debug!(%error, "drop zoom request");
                Vec::new()
            }
        }
    }

    fn request_feature_attributes(&mut self, feature: FeatureRef) -> Vec<AppEvent> {
        let request_id = self.requests.next();
        let layer_id = feature.layer_id.clone();
        let feature_id: FeatureIndex = feature.feature;
        self.feature_panel = FeaturePanel::Loading {
            request_id,
            feature,
        };
        vec![
            AppEvent::FeaturePanelChanged,
            AppEvent::Request(BackendRequest::GetFeatureAttributes {
                request_id,
                layer_id,
                feature_id,
            }),
        ]
    }

    fn apply_feature_attributes(
        &mut self,
        request_id: RequestId,
        fields: Vec<Field>,
    ) -> Vec<AppEvent> {
        let feature = match &self.feature_panel {
            FeaturePanel::Loading {
                request_id: pending,
                feature,
            } if *pending == request_id => feature.clone(),
            _ => {
                debug!(
                    error = %SyncError::StaleResponse { request_id },
                    "discard feature attributes"
                );
                return Vec::new();
            }
        };
        // A highlight that moved on to another feature makes the reply stale.
        if self
            .highlight
            .current()
            .active()
            .is_some_and(|current| *current != feature)
        {
            debug!(
                error = %SyncError::StaleResponse { request_id },
                "discard feature attributes for a feature no longer highlighted"
            );
            self.feature_panel = FeaturePanel::Empty;
            return vec![AppEvent::FeaturePanelChanged];
        }
        self.feature_panel = FeaturePanel::Loaded { feature, fields };
        vec![AppEvent::FeaturePanelChanged]
    }

    fn commit(&mut self, next: LayerCollection) -> Vec<AppEvent> {
        if next.version() == self.layers.version() {
            return Vec::new();
        }
        self.layers = next;
        vec![AppEvent::LayersChanged {
            version: self.layers.version(),
        }]
    }

    fn reject(&mut self, error: SyncError) -> Vec<AppEvent> {
        let notice = self.set_notice(error.to_string());
        vec![AppEvent::Rejected(error), notice]
    }

    fn set_notice(&mut self, message: String) -> AppEvent {
        self.notice = Some(message.clone());
        AppEvent::NoticeUpdated(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState, FeaturePanel};
    use crate::backend::BackendRequest;
    use crate::bus::BusMessage;
    use crate::error::SyncError;
    use crate::highlight::{FeatureRef, Highlight};
    use crate::ids::{FeatureIndex, LayerId, RequestId};
    use crate::model::{Extent, Field, LayerColor, Point};
    use crate::viewport::ExtentOrigin;

    fn created(id: &str, points: &[(f64, f64)]) -> AppCommand {
        let points = points
            .iter()
            .map(|(lng, lat)| Point::new(*lng, *lat))
            .collect::<Vec<_>>();
        let extent = Extent::from_points(&points).unwrap_or(Extent::WORLD);
        AppCommand::Bus(BusMessage::LayerCreated {
            id: LayerId::from(id),
            title: id.to_owned(),
            points,
            extent,
        })
    }

    fn state_with(ids: &[&str]) -> AppState {
        let mut state = AppState::default();
        for id in ids {
            state.dispatch(created(id, &[(1.0, 2.0), (3.0, 4.0)]));
        }
        state
    }

    #[test]
    fn layer_created_bumps_version_once() {
        let mut state = AppState::default();
        let events = state.dispatch(created("L1", &[(1.0, 2.0)]));
        assert_eq!(events, vec![AppEvent::LayersChanged { version: 1 }]);

        let again = state.dispatch(created("L1", &[(1.0, 2.0)]));
        assert!(again.is_empty());
    }

    #[test]
    fn no_op_mutations_emit_nothing() {
        let mut state = state_with(&["a", "b"]);
        let version = state.layers.version();
        assert!(
            state
                .dispatch(AppCommand::Reorder(vec![LayerId::from("a"), LayerId::from("b")]))
                .is_empty()
        );
        assert!(
            state
                .dispatch(AppCommand::SetVisible {
                    layer_id: LayerId::from("a"),
                    visible: true,
                })
                .is_empty()
        );
        assert_eq!(state.layers.version(), version);
    }

    #[test]
    fn invalid_reorder_is_rejected_with_notice() {
        let mut state = state_with(&["a", "b"]);
        let before = state.layers.clone();
        let events = state.dispatch(AppCommand::Reorder(vec![LayerId::from("a")]));
        assert!(matches!(
            events.first(),
            Some(AppEvent::Rejected(SyncError::InvalidReorder { .. }))
        ));
        assert!(state.notice.is_some());
        assert_eq!(state.layers, before);

        assert_eq!(
            state.dispatch(AppCommand::DismissNotice),
            vec![AppEvent::NoticeCleared]
        );
        assert!(state.dispatch(AppCommand::DismissNotice).is_empty());
    }

    #[test]
    fn delete_is_optimistic_then_tells_backend() {
        let mut state = state_with(&["a", "b"]);
        state.highlight.focus(FeatureRef::new(LayerId::from("a"), FeatureIndex::new(0)));

        let events = state.dispatch(AppCommand::DeleteLayer(LayerId::from("a")));
        assert_eq!(state.layers.ids(), vec![LayerId::from("b")]);
        assert_eq!(state.highlight.current(), &Highlight::Inactive);
        assert_eq!(
            events.last(),
            Some(&AppEvent::Request(BackendRequest::DeleteLayer {
                layer_id: LayerId::from("a"),
            }))
        );

        let echo = state.dispatch(AppCommand::Bus(BusMessage::LayerDeleted {
            layer_id: LayerId::from("a"),
        }));
        assert!(echo.is_empty(), "backend echo of our delete is a no-op");
    }

    #[test]
    fn cycle_color_and_toggle_visible() {
        let mut state = state_with(&["a"]);
        let id = LayerId::from("a");
        state.dispatch(AppCommand::CycleColor(id.clone()));
        state.dispatch(AppCommand::ToggleVisible(id.clone()));
        let layer = state.layers.get(&id).expect("layer exists");
        assert_eq!(layer.color, LayerColor::Blue);
        assert!(!layer.visible);
    }

    #[test]
    fn zoom_to_layer_forwards_once_and_swallows_echo() {
        let mut state = state_with(&["a"]);
        let events = state.dispatch(AppCommand::ZoomToLayer(LayerId::from("a")));
        let target = Extent::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(
            events,
            vec![
                AppEvent::ForwardExtent(target),
                AppEvent::ExtentChanged {
                    extent: target,
                    origin: ExtentOrigin::Binding,
                },
            ]
        );

        assert!(state.dispatch(AppCommand::MapExtentChanged(target)).is_empty());
        state.end_cycle();

        let panned = target.translated(1.0, 1.0);
        assert_eq!(
            state.dispatch(AppCommand::MapExtentChanged(panned)),
            vec![AppEvent::ExtentChanged {
                extent: panned,
                origin: ExtentOrigin::Map,
            }]
        );
    }

    #[test]
    fn click_requests_attributes_and_discards_stale_reply() {
        let mut state = state_with(&["a"]);
        let click = |state: &mut AppState, lng, lat| {
            state
                .dispatch(AppCommand::MapClicked {
                    at: Point::new(lng, lat),
                    tolerance: 0.1,
                })
                .into_iter()
                .find_map(|event| match event {
                    AppEvent::Request(BackendRequest::GetFeatureAttributes {
                        request_id, ..
                    }) => Some(request_id),
                    _ => None,
                })
                .expect("attribute request")
        };

        let first = click(&mut state, 1.0, 2.0);
        let second = click(&mut state, 3.0, 4.0);
        let fields = vec![Field {
            name: "name".to_owned(),
            value: "Springfield".to_owned(),
        }];

        assert!(
            state
                .dispatch(AppCommand::FeatureAttributesLoaded {
                    request_id: first,
                    fields: fields.clone(),
                })
                .is_empty()
        );
        assert!(matches!(state.feature_panel, FeaturePanel::Loading { .. }));

        state.dispatch(AppCommand::FeatureAttributesLoaded {
            request_id: second,
            fields: fields.clone(),
        });
        assert_eq!(
            state.feature_panel,
            FeaturePanel::Loaded {
                feature: FeatureRef::new(LayerId::from("a"), FeatureIndex::new(1)),
                fields,
            }
        );
    }

    #[test]
    fn attributes_are_dropped_once_highlight_moves_to_another_feature() {
        let mut state = state_with(&["a"]);
        let events = state.dispatch(AppCommand::MapClicked {
            at: Point::new(1.0, 2.0),
            tolerance: 0.1,
        });
        let request_id = events
            .into_iter()
            .find_map(|event| match event {
                AppEvent::Request(BackendRequest::GetFeatureAttributes { request_id, .. }) => {
                    Some(request_id)
                }
                _ => None,
            })
            .expect("attribute request");

        state.dispatch(AppCommand::PointerMoved {
            at: Point::new(3.0, 4.0),
            tolerance: 0.1,
        });
        let events = state.dispatch(AppCommand::FeatureAttributesLoaded {
            request_id,
            fields: vec![Field {
                name: "name".to_owned(),
                value: "Springfield".to_owned(),
            }],
        });
        assert_eq!(events, vec![AppEvent::FeaturePanelChanged]);
        assert_eq!(state.feature_panel, FeaturePanel::Empty);
    }

    #[test]
    fn attributes_survive_pointer_leaving_to_empty_space() {
        let mut state = state_with(&["a"]);
        let events = state.dispatch(AppCommand::MapClicked {
            at: Point::new(1.0, 2.0),
            tolerance: 0.1,
        });
        let request_id = events
            .into_iter()
            .find_map(|event| match event {
                AppEvent::Request(BackendRequest::GetFeatureAttributes { request_id, .. }) => {
                    Some(request_id)
                }
                _ => None,
            })
            .expect("attribute request");

        state.dispatch(AppCommand::PointerMoved {
            at: Point::new(50.0, 50.0),
            tolerance: 0.1,
        });
        state.dispatch(AppCommand::FeatureAttributesLoaded {
            request_id,
            fields: Vec::new(),
        });
        assert!(matches!(state.feature_panel, FeaturePanel::Loaded { .. }));
    }

    #[test]
    fn click_on_empty_space_keeps_highlight() {
        let mut state = state_with(&["a"]);
        state.dispatch(AppCommand::MapClicked {
            at: Point::new(1.0, 2.0),
            tolerance: 0.1,
        });
        let events = state.dispatch(AppCommand::MapClicked {
            at: Point::new(50.0, 50.0),
            tolerance: 0.1,
        });
        assert!(events.is_empty());
        assert!(state.highlight.current().is_on_layer(&LayerId::from("a")));
    }

    #[test]
    fn feature_zoomed_echo_highlights_and_moves_map() {
        let mut state = state_with(&["a"]);
        let extent = Extent::new(3.0, 4.0, 3.0, 4.0);
        let events = state.dispatch(AppCommand::Bus(BusMessage::FeatureZoomed {
            layer_id: LayerId::from("a"),
            feature_id: FeatureIndex::new(1),
            extent,
        }));
        assert!(matches!(events.first(), Some(AppEvent::ForwardExtent(_))));
        assert_eq!(
            state.highlight.current(),
            &Highlight::Active(FeatureRef::new(LayerId::from("a"), FeatureIndex::new(1)))
        );
    }

    #[test]
    fn stale_request_ids_never_match_fresh_panel() {
        let mut state = AppState::default();
        assert!(
            state
                .dispatch(AppCommand::FeatureAttributesLoaded {
                    request_id: RequestId::new(42),
                    fields: Vec::new(),
                })
                .is_empty()
        );
        assert_eq!(state.feature_panel, FeaturePanel::Empty);
    }

    #[test]
    fn backend_failure_keeps_layers_and_sets_notice() {
        let mut state = state_with(&["a"]);
        let before = state.layers.clone();
        let events = state.dispatch(AppCommand::BackendFailed("load attributes".to_owned()));
        assert_eq!(
            events,
            vec![AppEvent::NoticeUpdated("load attributes".to_owned())]
        );
        assert_eq!(state.layers, before);
    }
}
