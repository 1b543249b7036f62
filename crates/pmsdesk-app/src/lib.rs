// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod chain;
pub mod debounce;
pub mod draft;
pub mod errors;
pub mod forms;
pub mod ids;
pub mod model;
pub mod payload;
pub mod permissions;
pub mod state;
pub mod validation;

pub use chain::*;
pub use debounce::*;
pub use draft::*;
pub use errors::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use payload::*;
pub use permissions::*;
pub use state::*;
pub use validation::*;
