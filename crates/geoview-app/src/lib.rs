// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod backend;
pub mod bus;
pub mod error;
pub mod highlight;
pub mod ids;
pub mod layers;
pub mod model;
pub mod state;
pub mod table;
pub mod viewport;

pub use backend::*;
pub use bus::*;
pub use error::*;
pub use highlight::*;
pub use ids::*;
pub use layers::*;
pub use model::*;
pub use state::*;
pub use table::*;
pub use viewport::*;
