//! Prelude module for common tilerelay types and traits
//!
//! `use tilerelay::prelude::*;` brings in what a host needs to wire up a
//! coordinator and an engine.

pub use crate::background::RenderEngine;
pub use crate::channel::{channel, CoordinatorPort, EnginePort, ToCoordinator, ToEngine};
pub use crate::coordinator::{
    ChannelScheduler, Coordinator, CoordinatorStats, HostScheduler, ImageDecoder, NoopScheduler,
};
pub use crate::core::{
    config::{AdmissionConfig, CoordinatorConfig, EngineConfig, RelayConfig, RetryPolicy, SourceConfig},
    geo::{Extent, Point, TileCoord, TileKey},
    projection::{Projection, ProjectionRegistry},
    view::{FrameState, ViewState},
};
pub use crate::runtime::{AsyncHandle, AsyncSpawner, TokioSpawner};
pub use crate::style::{BasicStyleApplier, StyleApplier};
pub use crate::tiles::{Fetcher, HttpFetcher, StaticFetcher, TileDecoder};

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use futures::Future;
