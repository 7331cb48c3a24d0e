// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Commands the front-end issues to the backend.
//!
//! Everything except the two attribute fetches is fire-and-forget; the
//! backend answers those through the bus instead.

use crate::ids::{FeatureIndex, LayerId, RequestId};
use crate::model::SortSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    DeleteLayer {
        layer_id: LayerId,
    },
    GetFeatureAttributes {
        request_id: RequestId,
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
    GetLayerAttributes {
        request_id: RequestId,
        layer_id: LayerId,
        sort: SortSpec,
    },
    CreateTableWindow {
        layer_id: LayerId,
    },
    SelectFeature {
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
    UnselectFeature {
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
    SelectAllFeatures {
        layer_id: LayerId,
    },
    UnselectAllFeatures {
        layer_id: LayerId,
    },
    ZoomToFeature {
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
}

impl BackendRequest {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DeleteLayer { .. } => "delete_layer",
            Self::GetFeatureAttributes { .. } => "get_feature_attributes",
            Self::GetLayerAttributes { .. } => "get_layer_attributes",
            Self::CreateTableWindow { .. } => "create_table_window",
            Self::SelectFeature { .. } => "select_feature",
            Self::UnselectFeature { .. } => "unselect_feature",
            Self::SelectAllFeatures { .. } => "select_all_features",
            Self::UnselectAllFeatures { .. } => "unselect_all_features",
            Self::ZoomToFeature { .. } => "zoom_to_feature",
        }
    }

    pub fn layer_id(&self) -> &LayerId {
        match self {
            Self::DeleteLayer { layer_id }
            | Self::GetFeatureAttributes { layer_id, .. }
            | Self::GetLayerAttributes { layer_id, .. }
            | Self::CreateTableWindow { layer_id }
            | Self::SelectFeature { layer_id, .. }
            | Self::UnselectFeature { layer_id, .. }
            | Self::SelectAllFeatures { layer_id }
            | Self::UnselectAllFeatures { layer_id }
            | Self::ZoomToFeature { layer_id, .. } => layer_id,
        }
    }

    /// Whether the caller expects a response rather than a bus echo.
    pub const fn expects_response(&self) -> bool {
        matches!(
            self,
            Self::GetFeatureAttributes { .. } | Self::GetLayerAttributes { .. }
        )
    }
}
