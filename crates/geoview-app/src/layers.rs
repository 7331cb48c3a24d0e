// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Ordered layer collection.
//!
//! Every mutation is a pure function of the previous collection: it returns a
//! new collection and never touches `self`. `version` moves forward only when
//! the result differs from the input, so renderers can skip work by comparing
//! versions.

use std::collections::HashSet;

use crate::error::{SyncError, SyncResult};
use crate::ids::LayerId;
use crate::model::{Layer, LayerColor};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerCollection {
    version: u64,
    layers: Vec<Layer>,
}

impl LayerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Layers in z-order: index 0 is drawn on top and listed first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == *id)
    }

    pub fn position(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == *id)
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|layer| layer.id.clone()).collect()
    }

    /// Appends a newly announced layer. A repeated id is ignored so ids stay
    /// unique within the collection.
    pub fn create(&self, layer: Layer) -> Self {
        if self.get(&layer.id).is_some() {
            return self.clone();
        }
        let mut layers = self.layers.clone();
        layers.push(layer);
        self.bumped(layers)
    }

    /// Removing an id that is not present is a no-op.
    pub fn remove(&self, id: &LayerId) -> Self {
        if self.get(id).is_none() {
            return self.clone();
        }
        let layers = self
            .layers
            .iter()
            .filter(|layer| layer.id != *id)
            .cloned()
            .collect();
        self.bumped(layers)
    }

    pub fn set_visible(&self, id: &LayerId, visible: bool) -> Self {
        self.update(id, |layer| {
            if layer.visible == visible {
                return false;
            }
            layer.visible = visible;
            true
        })
    }

    pub fn set_color(&self, id: &LayerId, color: LayerColor) -> Self {
        self.update(id, |layer| {
            if layer.color == color {
                return false;
            }
            layer.color = color;
            true
        })
    }

    /// Reorders the collection to match `ordered_ids`, which must be a
    /// permutation of the current ids. An identical order keeps the version.
    pub fn reorder(&self, ordered_ids: &[LayerId]) -> SyncResult<Self> {
        let invalid = || SyncError::InvalidReorder {
            expected: self.layers.len(),
            actual: ordered_ids.len(),
        };
        if ordered_ids.len() != self.layers.len() {
            return Err(invalid());
        }

        let mut seen = HashSet::with_capacity(ordered_ids.len());
        let mut layers = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if !seen.insert(id) {
                return Err(invalid());
            }
            let Some(layer) = self.get(id) else {
                return Err(invalid());
            };
            layers.push(layer.clone());
        }

        let unchanged = self
            .layers
            .iter()
            .map(|layer| &layer.id)
            .eq(ordered_ids.iter());
        if unchanged {
            return Ok(self.clone());
        }
        Ok(self.bumped(layers))
    }

    /// Moves one layer by `delta` slots, clamped to the list bounds. Used by
    /// the side panel's keyboard drag.
    pub fn moved(&self, id: &LayerId, delta: isize) -> SyncResult<Self> {
        let mut ids = self.ids();
        let Some(from) = self.position(id) else {
            return Ok(self.clone());
        };
        let last = ids.len().saturating_sub(1) as isize;
        let to = (from as isize + delta).clamp(0, last) as usize;
        let moving = ids.remove(from);
        ids.insert(to, moving);
        self.reorder(&ids)
    }

    fn update(&self, id: &LayerId, apply: impl FnOnce(&mut Layer) -> bool) -> Self {
        let Some(index) = self.position(id) else {
            return self.clone();
        };
        let mut layers = self.layers.clone();
        if apply(&mut layers[index]) {
            self.bumped(layers)
        } else {
            self.clone()
        }
    }

    fn bumped(&self, layers: Vec<Layer>) -> Self {
        Self {
            version: self.version + 1,
            layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LayerCollection;
    use crate::error::SyncError;
    use crate::ids::LayerId;
    use crate::model::{Extent, Layer, LayerColor, Point};

    fn layer(id: &str) -> Layer {
        Layer::new(
            LayerId::from(id),
            id,
            vec![Point::new(1.0, 2.0)],
            Extent::new(1.0, 2.0, 1.0, 2.0),
        )
    }

    fn collection(ids: &[&str]) -> LayerCollection {
        ids.iter()
            .fold(LayerCollection::new(), |acc, id| acc.create(layer(id)))
    }

    fn ids(values: &[&str]) -> Vec<LayerId> {
        values.iter().map(|value| LayerId::from(*value)).collect()
    }

    #[test]
    fn create_appends_and_bumps_version() {
        let empty = LayerCollection::new();
        let one = empty.create(layer("a"));

        assert_eq!(empty.version(), 0);
        assert!(empty.is_empty());
        assert_eq!(one.version(), 1);
        assert_eq!(one.ids(), ids(&["a"]));
        assert!(one.layers()[0].visible);
        assert_eq!(one.layers()[0].color, LayerColor::DEFAULT);
    }

    #[test]
    fn create_duplicate_id_is_ignored() {
        let one = collection(&["a"]);
        let again = one.create(layer("a"));
        assert_eq!(again, one);
    }

    #[test]
    fn reorder_to_every_permutation() {
        let base = collection(&["a", "b", "c"]);
        let permutations = [
            ["a", "c", "b"],
            ["b", "a", "c"],
            ["b", "c", "a"],
            ["c", "a", "b"],
            ["c", "b", "a"],
        ];
        for permutation in permutations {
            let target = ids(&permutation);
            let reordered = base.reorder(&target).expect("valid permutation");
            assert_eq!(reordered.ids(), target);
            assert_eq!(reordered.version(), base.version() + 1);
        }
    }

    #[test]
    fn reorder_same_order_keeps_version() {
        let base = collection(&["a", "b", "c"]);
        let same = base
            .reorder(&ids(&["a", "b", "c"]))
            .expect("identity permutation");
        assert_eq!(same, base);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let base = collection(&["a", "b", "c"]);
        for bad in [
            ids(&["a", "b"]),
            ids(&["a", "b", "c", "d"]),
            ids(&["a", "a", "b"]),
            ids(&["a", "b", "z"]),
        ] {
            let err = base.reorder(&bad).expect_err("not a permutation");
            assert!(matches!(err, SyncError::InvalidReorder { .. }));
        }
        assert_eq!(base.ids(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn remove_absent_is_noop() {
        let base = collection(&["a", "b"]);
        let after = base.remove(&LayerId::from("zzz"));
        assert_eq!(after, base);

        let removed = base.remove(&LayerId::from("a"));
        assert_eq!(removed.ids(), ids(&["b"]));
        assert_eq!(removed.version(), base.version() + 1);
    }

    #[test]
    fn visibility_change_bumps_only_on_real_change() {
        let base = collection(&["a"]);
        let id = LayerId::from("a");

        let hidden = base.set_visible(&id, false);
        assert!(!hidden.layers()[0].visible);
        assert_eq!(hidden.version(), base.version() + 1);

        let still_hidden = hidden.set_visible(&id, false);
        assert_eq!(still_hidden.version(), hidden.version());
    }

    #[test]
    fn set_color_round_trips_without_touching_others() {
        let base = collection(&["a", "b", "c"]);
        let id = LayerId::from("b");

        let recolored = base.set_color(&id, LayerColor::Green);
        assert_eq!(
            recolored.get(&id).map(|layer| layer.color),
            Some(LayerColor::Green)
        );
        for other in ["a", "c"] {
            assert_eq!(
                recolored.get(&LayerId::from(other)).map(|layer| layer.color),
                Some(LayerColor::DEFAULT)
            );
        }
        assert_eq!(recolored.version(), base.version() + 1);
    }

    #[test]
    fn mutations_leave_input_untouched() {
        let base = collection(&["a", "b"]);
        let snapshot = base.clone();
        let _ = base.set_visible(&LayerId::from("a"), false);
        let _ = base.remove(&LayerId::from("b"));
        let _ = base.reorder(&ids(&["b", "a"]));
        assert_eq!(base, snapshot);
    }

    #[test]
    fn moved_clamps_at_edges() {
        let base = collection(&["a", "b", "c"]);
        let down = base.moved(&LayerId::from("a"), 1).expect("move");
        assert_eq!(down.ids(), ids(&["b", "a", "c"]));

        let top = base.moved(&LayerId::from("a"), -1).expect("move");
        assert_eq!(top.version(), base.version());
    }
}
