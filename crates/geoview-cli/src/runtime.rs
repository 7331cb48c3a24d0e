// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use geoview_app::{
    AttributeTable, BusListener, BusMessage, EventBus, FeatureIndex, Field, LayerId, SortSpec,
};
use geoview_db::{StoredLayer, Store};
use tracing::{debug, info};

/// Backend side of the command surface: answers queries from the store and
/// publishes every state change on the bus so all windows converge.
pub struct DbRuntime<'a> {
    store: &'a Store,
    bus: EventBus,
}

impl<'a> DbRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            bus: EventBus::new(),
        }
    }

    /// Listener for the main window.
    pub fn subscribe(&mut self) -> BusListener {
        self.bus.subscribe()
    }

    pub fn announce(&mut self, layer: &StoredLayer) {
        let reached = self.bus.publish(&layer.layer_created());
        info!(layer = %layer.id, title = %layer.title, listeners = reached, "announce layer");
    }
}

impl geoview_tui::AppRuntime for DbRuntime<'_> {
    fn delete_layer(&mut self, layer_id: &LayerId) -> Result<()> {
        if !self.store.delete_layer(layer_id)? {
            debug!(layer = %layer_id, "delete of unknown layer");
        }
        self.bus.publish(&BusMessage::LayerDeleted {
            layer_id: layer_id.clone(),
        });
        Ok(())
    }

    fn get_feature_attributes(
        &mut self,
        layer_id: &LayerId,
        feature_id: FeatureIndex,
    ) -> Result<Vec<Field>> {
        self.store.feature_attributes(layer_id, feature_id)
    }

    fn get_layer_attributes(
        &mut self,
        layer_id: &LayerId,
        sort: SortSpec,
    ) -> Result<AttributeTable> {
        self.store.layer_attributes(layer_id, sort)
    }

    fn create_table_window(&mut self, layer_id: &LayerId) -> Result<BusListener> {
        if !self.store.layer_exists(layer_id)? {
            bail!("layer {layer_id} not found");
        }
        let (sender, listener) = self.bus.subscribe_with_sender();
        let selected = self.store.selected_features(layer_id)?;
        for feature_id in &selected {
            sender.send(&BusMessage::FeatureSelected {
                layer_id: layer_id.clone(),
                feature_id: *feature_id,
            });
        }
        debug!(layer = %layer_id, replayed = selected.len(), "table window subscribed");
        Ok(listener)
    }

    // Selection commands always echo, even when the stored flag did not
    // change, so a window that drifted gets corrected.
    fn select_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()> {
        self.store.set_selected(layer_id, feature_id, true)?;
        self.bus.publish(&BusMessage::FeatureSelected {
            layer_id: layer_id.clone(),
            feature_id,
        });
        Ok(())
    }

    fn unselect_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()> {
        self.store.set_selected(layer_id, feature_id, false)?;
        self.bus.publish(&BusMessage::FeatureUnselected {
            layer_id: layer_id.clone(),
            feature_id,
        });
        Ok(())
    }

    fn select_all_features(&mut self, layer_id: &LayerId) -> Result<()> {
        self.store.set_all_selected(layer_id, true)?;
        self.bus.publish(&BusMessage::AllFeaturesSelected {
            layer_id: layer_id.clone(),
        });
        Ok(())
    }

    fn unselect_all_features(&mut self, layer_id: &LayerId) -> Result<()> {
        self.store.set_all_selected(layer_id, false)?;
        self.bus.publish(&BusMessage::AllFeaturesUnselected {
            layer_id: layer_id.clone(),
        });
        Ok(())
    }

    fn zoom_to_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()> {
        let extent = self.store.feature_extent(layer_id, feature_id)?;
        self.bus.publish(&BusMessage::FeatureZoomed {
            layer_id: layer_id.clone(),
            feature_id,
            extent,
        });
        Ok(())
    }
}
