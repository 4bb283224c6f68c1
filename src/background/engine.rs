//! The render engine: draws frames off the coordinator's thread
//!
//! One `RenderEngine` lives on its own OS thread. It handles one render
//! request at a time, start to finish, and pushes fetches onto the async
//! runtime; their results come back as [`EngineEvent`]s on the same loop.

use super::frame::RenderFrame;
use crate::channel::{EnginePort, ToCoordinator, ToEngine};
use crate::core::config::EngineConfig;
use crate::core::geo::TileKey;
use crate::core::projection::ProjectionRegistry;
use crate::core::view::{FrameState, RenderStats};
use crate::layers::vector_tile::VectorTileLayer;
use crate::prelude::Arc;
use crate::rendering::declutter::DeclutterTree;
use crate::rendering::surface::{Bitmap, OffscreenSurface};
use crate::rendering::transform::Affine;
use crate::runtime::{spawn, AsyncSpawner};
use crate::style::apply::{substitute_font, BasicStyleApplier, StyleApplier};
use crate::style::loader::{load_style, StyleBundle};
use crate::tiles::decoder::{DecodedTile, GeoJsonTileDecoder};
use crate::tiles::loader::{fetch_with_retry, Fetcher};
use crate::tiles::queue::{QueuedTile, TileQueue};
use crate::tiles::source::SourceRegistry;
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::unsync::OnceCell;
use tiny_skia::Pixmap;

/// Results of async work, delivered back to the engine loop
#[derive(Debug)]
pub enum EngineEvent {
    TileSettled { key: TileKey, result: Result<DecodedTile> },
    StyleLoaded(Box<StyleBundle>),
    StyleFailed(String),
}

pub struct RenderEngine {
    port: EnginePort,
    config: EngineConfig,
    surface: OffscreenSurface,
    declutter: DeclutterTree,
    layers: Vec<VectorTileLayer>,
    sources: SourceRegistry,
    projections: ProjectionRegistry,
    queue: TileQueue,
    /// Captured from the first frame; also guards the one-time style load
    pixel_ratio: OnceCell<f64>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    spawner: Arc<dyn AsyncSpawner>,
    fetcher: Arc<dyn Fetcher>,
    applier: Arc<dyn StyleApplier>,
    sprite_image: Option<(String, Pixmap)>,
    renderer_transform: Affine,
    frames_rendered: u64,
}

impl RenderEngine {
    /// Engine with the configured sources and the built-in decoder and style applier
    pub fn new(
        port: EnginePort,
        config: EngineConfig,
        spawner: Arc<dyn AsyncSpawner>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let sources = SourceRegistry::from_configs(&config.sources, Arc::new(GeoJsonTileDecoder))?;
        let (events_tx, events_rx) = unbounded();
        let mut queue = TileQueue::with_default_priority();
        let notify = port.clone();
        queue.set_completion_callback(Box::new(move |key, state| {
            log::debug!("tile {} settled as {:?}", key, state);
            if notify.send(ToCoordinator::RequestRender).is_err() {
                log::debug!("coordinator gone, render request dropped");
            }
        }));
        Ok(Self {
            port,
            config,
            surface: OffscreenSurface::new(1, 1)?,
            declutter: DeclutterTree::new(),
            layers: Vec::new(),
            sources,
            projections: ProjectionRegistry::default(),
            queue,
            pixel_ratio: OnceCell::new(),
            events_tx,
            events_rx,
            spawner,
            fetcher,
            applier: Arc::new(BasicStyleApplier),
            sprite_image: None,
            renderer_transform: Affine::identity(),
            frames_rendered: 0,
        })
    }

    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_projections(mut self, projections: ProjectionRegistry) -> Self {
        self.projections = projections;
        self
    }

    pub fn with_style_applier(mut self, applier: Arc<dyn StyleApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn layers(&self) -> &[VectorTileLayer] {
        &self.layers
    }

    pub fn queue(&self) -> &TileQueue {
        &self.queue
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Pixel ratio captured from the first frame, once one has arrived
    pub fn pixel_ratio(&self) -> Option<f64> {
        self.pixel_ratio.get().copied()
    }

    /// Run the engine loop on a dedicated thread
    pub fn spawn(self) -> Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("tilerelay-engine".to_string())
            .spawn(move || self.run())
            .map_err(|e| MapError::Render(format!("failed to start engine thread: {e}")).into())
    }

    /// Serve render requests until the coordinator hangs up
    pub fn run(mut self) {
        log::info!("render engine started");
        let commands = self.port.receiver().clone();
        let events = self.events_rx.clone();
        loop {
            crossbeam_channel::select! {
                recv(commands) -> message => match message {
                    Ok(message) => self.handle_message(message),
                    Err(_) => break,
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.handle_event(event);
                    }
                }
            }
        }
        log::info!("render engine stopped after {} frame(s)", self.frames_rendered);
    }

    pub fn handle_message(&mut self, message: ToEngine) {
        match message {
            ToEngine::Render { frame_state } => {
                if let Err(e) = self.on_frame_request(&frame_state) {
                    log::warn!("render pass failed: {}", e);
                    self.post(ToCoordinator::RenderFailed { reason: e.to_string() });
                }
            }
            ToEngine::ImageLoaded { image, src } => self.on_image_loaded(image, src),
        }
    }

    /// Draw one frame and send the result back
    pub fn on_frame_request(&mut self, frame_state: &str) -> Result<()> {
        let mut state = FrameState::from_json(frame_state)?;
        self.ensure_style_loading(state.pixel_ratio);

        let projection = self.projections.get(&state.view_state.projection)?;
        let (width, height) = state.pixel_size();
        self.surface.resize(width, height)?;
        state.wanted_tiles.clear();
        state.stats = RenderStats::default();
        let ratio = state.pixel_ratio;

        let sprite = self.sprite_image.as_ref().map(|(_, pixmap)| pixmap);
        let mut frame = RenderFrame::new(
            state,
            projection,
            &mut self.queue,
            &mut self.surface,
            &mut self.declutter,
        );
        for layer in self.layers.iter_mut() {
            if layer.in_view(&frame.state.view_state) {
                layer.render_frame(&mut frame)?;
            }
        }
        let outcome = frame.declutter.render(frame.surface, sprite);
        let mut state = frame.into_state();
        state.stats.decluttered = outcome.hidden;

        let admission = self.config.admission;
        if self.queue.tiles_loading() < admission.max_total_loading {
            self.queue.reprioritize(&state);
            for tile in self
                .queue
                .load_more_tiles(admission.max_total_loading, admission.max_new_loads)
            {
                self.load_tile(tile);
            }
        }
        state.stats.tiles_loading = self.queue.tiles_loading() as u32;

        self.renderer_transform = Affine::scale(1.0 / ratio, 1.0 / ratio);
        let image_data = self.surface.transfer_to_bitmap()?;
        self.frames_rendered += 1;
        log::debug!(
            "frame {} rendered: {} layer(s), {} tile(s), {} loading",
            state.index,
            state.stats.layers_drawn,
            state.stats.tiles_drawn,
            state.stats.tiles_loading
        );
        self.post(ToCoordinator::Rendered {
            image_data,
            transform: self.renderer_transform.to_css(),
            frame_state: state.to_json()?,
        });
        Ok(())
    }

    /// Keep the sprite atlas image and ask for a redraw with it
    pub fn on_image_loaded(&mut self, image: Bitmap, src: String) {
        match image.into_pixmap() {
            Some(pixmap) => {
                log::debug!("sprite image {} loaded", src);
                self.sprite_image = Some((src, pixmap));
            }
            None => log::warn!("sprite image {} is empty", src),
        }
        self.post(ToCoordinator::RequestRender);
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::TileSettled { key, result } => self.on_tile_settled(key, result),
            EngineEvent::StyleLoaded(bundle) => self.on_style_loaded(*bundle),
            EngineEvent::StyleFailed(reason) => {
                log::error!("style could not be loaded, map stays empty: {}", reason);
            }
        }
    }

    /// Process every event already waiting, without blocking
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for one async result and handle it
    pub fn wait_event(&mut self, timeout: std::time::Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    fn post(&self, message: ToCoordinator) {
        if self.port.send(message).is_err() {
            log::debug!("coordinator gone, message dropped");
        }
    }

    fn ensure_style_loading(&mut self, pixel_ratio: f64) {
        if self.pixel_ratio.set(pixel_ratio).is_err() {
            return;
        }
        let Some(url) = self.config.style_url.clone() else {
            log::info!("no style configured, rendering without layers");
            return;
        };
        let fetcher = self.fetcher.clone();
        let events = self.events_tx.clone();
        let retry = self.config.retry;
        spawn(&self.spawner, async move {
            let event = match load_style(fetcher.as_ref(), &url, pixel_ratio, retry).await {
                Ok(bundle) => EngineEvent::StyleLoaded(Box::new(bundle)),
                Err(e) => EngineEvent::StyleFailed(e.to_string()),
            };
            let _ = events.send(event);
        });
    }

    fn on_style_loaded(&mut self, bundle: StyleBundle) {
        for (index, bucket) in bundle.buckets.iter().enumerate() {
            let Some(source) = self.sources.get(&bucket.source) else {
                log::debug!("no tile source {}, skipping bucket {}", bucket.source, index);
                continue;
            };
            let mut layer = VectorTileLayer::new(
                format!("{}-{}", bucket.source, index),
                source.clone(),
                self.config.tile_cache_size,
            );
            let applied = self.applier.apply(
                &mut layer,
                &bundle.document,
                &bucket.layer_ids,
                source.grid().resolutions(),
                bundle.sprite.as_ref(),
                bundle.sprite_image_url.as_deref(),
                &substitute_font,
            );
            match applied {
                Ok(()) => self.layers.push(layer),
                Err(e) => log::warn!("could not style bucket {}: {}", index, e),
            }
        }
        log::info!("style loaded with {} layer(s)", self.layers.len());
        self.post(ToCoordinator::RequestRender);
        if let Some(src) = bundle.sprite_image_url {
            self.post(ToCoordinator::LoadImage { src });
        }
    }

    fn load_tile(&self, tile: QueuedTile) {
        let Some(source) = self.sources.get(&tile.key.source) else {
            let _ = self.events_tx.send(EngineEvent::TileSettled {
                result: Err(MapError::Render(format!("unknown source {}", tile.key.source)).into()),
                key: tile.key,
            });
            return;
        };
        let decoder = source.decoder().clone();
        let fetcher = self.fetcher.clone();
        let events = self.events_tx.clone();
        let retry = self.config.retry;
        spawn(&self.spawner, async move {
            let result = match fetch_with_retry(fetcher.as_ref(), &tile.url, retry).await {
                Ok(bytes) => decoder.decode(&bytes),
                Err(e) => Err(e),
            };
            let _ = events.send(EngineEvent::TileSettled { key: tile.key, result });
        });
    }

    fn on_tile_settled(&mut self, key: TileKey, result: Result<DecodedTile>) {
        let success = result.is_ok();
        match result {
            Ok(tile) => {
                for layer in self.layers.iter_mut().filter(|l| l.source().name() == key.source) {
                    layer.tile_loaded(key.coord, tile.clone());
                }
            }
            Err(e) => {
                log::warn!("tile {} failed: {}", key, e);
                for layer in self.layers.iter_mut().filter(|l| l.source().name() == key.source) {
                    layer.tile_failed(key.coord);
                }
            }
        }
        self.queue.finish(&key, success);
    }
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("layers", &self.layers.len())
            .field("queue", &self.queue)
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}
