// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

use crate::ids::{LayerId, RequestId};

/// Reconciliation failures. None of these are fatal: callers absorb them and
/// keep rendering the previous state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("reorder is not a permutation of the current layers (expected {expected}, got {actual})")]
    InvalidReorder { expected: usize, actual: usize },

    #[error("stale response for request {request_id}")]
    StaleResponse { request_id: RequestId },

    #[error("degenerate extent (west {west}, south {south}, east {east}, north {north})")]
    DegenerateExtent {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },

    #[error("event for layer {layer_id} has no local listener")]
    UnscopedEvent { layer_id: LayerId },
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
