// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::{FeatureIndex, LayerId};
use crate::layers::LayerCollection;
use crate::model::Point;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub layer_id: LayerId,
    pub feature: FeatureIndex,
}

impl FeatureRef {
    pub fn new(layer_id: LayerId, feature: FeatureIndex) -> Self {
        Self { layer_id, feature }
    }
}

/// The single global pointer/click focus.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Highlight {
    #[default]
    Inactive,
    Active(FeatureRef),
}

impl Highlight {
    pub fn active(&self) -> Option<&FeatureRef> {
        match self {
            Self::Inactive => None,
            Self::Active(feature) => Some(feature),
        }
    }

    pub fn is_on_layer(&self, layer_id: &LayerId) -> bool {
        self.active()
            .is_some_and(|feature| feature.layer_id == *layer_id)
    }
}

/// Features under `at`, topmost first.
///
/// Ordering contract:
/// - Layers are visited in collection order; index 0 is drawn on top.
/// - Hidden layers never hit.
/// - Within a layer, later features are drawn over earlier ones, so the
///   highest feature index wins.
pub fn hit_test(layers: &LayerCollection, at: Point, tolerance: f64) -> Vec<FeatureRef> {
    let tolerance = tolerance.abs();
    let mut hits = Vec::new();
    for layer in layers.layers().iter().filter(|layer| layer.visible) {
        for (index, point) in layer.points.iter().enumerate().rev() {
            if (point.lng - at.lng).abs() <= tolerance && (point.lat - at.lat).abs() <= tolerance {
                hits.push(FeatureRef::new(layer.id.clone(), FeatureIndex::new(index)));
            }
        }
    }
    hits
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightCoordinator {
    current: Highlight,
}

impl HighlightCoordinator {
    pub fn current(&self) -> &Highlight {
        &self.current
    }

    /// Hover over `hits` (topmost first). Empty space clears the highlight.
    /// Returns the new state when it changed.
    pub fn pointer_moved(&mut self, hits: &[FeatureRef]) -> Option<Highlight> {
        let next = hits
            .first()
            .cloned()
            .map_or(Highlight::Inactive, Highlight::Active);
        self.replace(next)
    }

    /// Click selects the topmost hit only. A click on empty space leaves the
    /// current highlight alone.
    pub fn clicked(&mut self, hits: &[FeatureRef]) -> Option<FeatureRef> {
        let topmost = hits.first()?.clone();
        self.replace(Highlight::Active(topmost.clone()));
        Some(topmost)
    }

    /// Externally driven focus, e.g. a table row zoom echoed over the bus.
    pub fn focus(&mut self, feature: FeatureRef) -> Option<Highlight> {
        self.replace(Highlight::Active(feature))
    }

    /// Drops the highlight if it points into a layer that went away.
    pub fn forget_layer(&mut self, layer_id: &LayerId) -> Option<Highlight> {
        if self.current.is_on_layer(layer_id) {
            self.replace(Highlight::Inactive)
        } else {
            None
        }
    }

    fn replace(&mut self, next: Highlight) -> Option<Highlight> {
        if self.current == next {
            return None;
        }
        self.current = next.clone();
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureRef, Highlight, HighlightCoordinator, hit_test};
    use crate::ids::{FeatureIndex, LayerId};
    use crate::layers::LayerCollection;
    use crate::model::{Extent, Layer, Point};

    fn feature(layer: &str, index: usize) -> FeatureRef {
        FeatureRef::new(LayerId::from(layer), FeatureIndex::new(index))
    }

    fn stacked_layers() -> LayerCollection {
        let points = vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)];
        let extent = Extent::new(0.0, 0.0, 5.0, 5.0);
        LayerCollection::new()
            .create(Layer::new(
                LayerId::from("top"),
                "top",
                points.clone(),
                extent,
            ))
            .create(Layer::new(LayerId::from("bottom"), "bottom", points, extent))
    }

    #[test]
    fn active_replaces_never_stacks() {
        let mut coordinator = HighlightCoordinator::default();
        coordinator.focus(feature("a", 1));
        coordinator.focus(feature("b", 2));
        assert_eq!(coordinator.current(), &Highlight::Active(feature("b", 2)));
    }

    #[test]
    fn hover_over_empty_space_goes_inactive() {
        let mut coordinator = HighlightCoordinator::default();
        assert_eq!(
            coordinator.pointer_moved(&[feature("a", 0)]),
            Some(Highlight::Active(feature("a", 0)))
        );
        assert_eq!(coordinator.pointer_moved(&[]), Some(Highlight::Inactive));
        assert_eq!(coordinator.pointer_moved(&[]), None);
    }

    #[test]
    fn click_takes_topmost_hit() {
        let layers = stacked_layers();
        let hits = hit_test(&layers, Point::new(0.1, -0.1), 0.5);
        assert_eq!(hits, vec![feature("top", 0), feature("bottom", 0)]);

        let mut coordinator = HighlightCoordinator::default();
        assert_eq!(coordinator.clicked(&hits), Some(feature("top", 0)));
        assert_eq!(coordinator.clicked(&[]), None);
        assert_eq!(coordinator.current(), &Highlight::Active(feature("top", 0)));
    }

    #[test]
    fn hidden_layers_do_not_hit() {
        let layers = stacked_layers().set_visible(&LayerId::from("top"), false);
        let hits = hit_test(&layers, Point::new(5.0, 5.0), 0.1);
        assert_eq!(hits, vec![feature("bottom", 1)]);
    }

    #[test]
    fn reorder_changes_hit_precedence() {
        let layers = stacked_layers()
            .reorder(&[LayerId::from("bottom"), LayerId::from("top")])
            .expect("permutation");
        let hits = hit_test(&layers, Point::new(5.0, 5.0), 0.1);
        assert_eq!(hits.first(), Some(&feature("bottom", 1)));
    }

    #[test]
    fn forgetting_other_layer_keeps_highlight() {
        let mut coordinator = HighlightCoordinator::default();
        coordinator.focus(feature("a", 3));
        assert_eq!(coordinator.forget_layer(&LayerId::from("b")), None);
        assert_eq!(
            coordinator.forget_layer(&LayerId::from("a")),
            Some(Highlight::Inactive)
        );
    }
}
