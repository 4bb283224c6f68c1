//! Messages between the coordinator and the render engine
//!
//! Each direction is a crossbeam channel of tagged messages. Frame states
//! travel as JSON text and bitmaps are moved, so neither side ever shares
//! memory with the other.

use crate::rendering::surface::Bitmap;
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

/// Coordinator → engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ToEngine {
    #[serde(rename_all = "camelCase")]
    Render { frame_state: String },
    ImageLoaded { image: Bitmap, src: String },
}

/// Engine → coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ToCoordinator {
    #[serde(rename_all = "camelCase")]
    Rendered {
        image_data: Bitmap,
        transform: String,
        frame_state: String,
    },
    RequestRender,
    LoadImage { src: String },
    RenderFailed { reason: String },
}

impl ToCoordinator {
    pub fn action(&self) -> &'static str {
        match self {
            ToCoordinator::Rendered { .. } => "rendered",
            ToCoordinator::RequestRender => "requestRender",
            ToCoordinator::LoadImage { .. } => "loadImage",
            ToCoordinator::RenderFailed { .. } => "renderFailed",
        }
    }
}

/// Coordinator end of the channel
#[derive(Debug, Clone)]
pub struct CoordinatorPort {
    tx: Sender<ToEngine>,
    rx: Receiver<ToCoordinator>,
}

/// Engine end of the channel
#[derive(Debug, Clone)]
pub struct EnginePort {
    tx: Sender<ToCoordinator>,
    rx: Receiver<ToEngine>,
}

pub fn channel() -> (CoordinatorPort, EnginePort) {
    let (to_engine_tx, to_engine_rx) = unbounded();
    let (to_coord_tx, to_coord_rx) = unbounded();
    (
        CoordinatorPort {
            tx: to_engine_tx,
            rx: to_coord_rx,
        },
        EnginePort {
            tx: to_coord_tx,
            rx: to_engine_rx,
        },
    )
}

fn disconnected() -> MapError {
    MapError::Channel("peer disconnected".to_string())
}

impl CoordinatorPort {
    pub fn send(&self, message: ToEngine) -> Result<()> {
        self.tx.send(message).map_err(|_| disconnected().into())
    }

    /// Next message if one is waiting; an error once the engine is gone
    pub fn try_recv(&self) -> Result<Option<ToCoordinator>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected().into()),
        }
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<ToCoordinator> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn receiver(&self) -> &Receiver<ToCoordinator> {
        &self.rx
    }
}

impl EnginePort {
    pub fn send(&self, message: ToCoordinator) -> Result<()> {
        self.tx.send(message).map_err(|_| disconnected().into())
    }

    pub fn receiver(&self) -> &Receiver<ToEngine> {
        &self.rx
    }
}
