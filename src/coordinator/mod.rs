//! Main-side render coordinator
//!
//! Lives on the host's thread. Each frame opportunity either sends a render
//! request to the engine or, while one is outstanding, records that another
//! pass is wanted. Results are composited with a transform that makes up for
//! the view having moved while the engine was drawing.

pub mod images;
pub mod scheduler;

pub use images::{ImageDecoder, RasterImageDecoder};
pub use scheduler::{ChannelScheduler, HostScheduler, NoopScheduler};

use crate::channel::{CoordinatorPort, ToCoordinator, ToEngine};
use crate::core::config::{CoordinatorConfig, RetryPolicy};
use crate::core::view::{FrameState, ViewState};
use crate::prelude::Arc;
use crate::rendering::presentation::Container;
use crate::rendering::surface::Bitmap;
use crate::rendering::transform::compensate;
use crate::runtime::{spawn, AsyncSpawner};
use crate::tiles::loader::{fetch_with_retry, Fetcher};
use crate::{MapError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub requests_sent: u64,
    pub results_received: u64,
    /// Opportunities folded into a later pass while a request was outstanding
    pub coalesced: u64,
    pub failures: u64,
}

pub struct Coordinator {
    port: CoordinatorPort,
    config: CoordinatorConfig,
    container: Option<Container>,
    latest: Option<FrameState>,
    rendered_view: Option<ViewState>,
    /// A render request is outstanding
    pending: bool,
    needs_another_pass: bool,
    stats: CoordinatorStats,
    scheduler: Box<dyn HostScheduler>,
    image_decoder: Arc<dyn ImageDecoder>,
    fetcher: Arc<dyn Fetcher>,
    spawner: Arc<dyn AsyncSpawner>,
}

impl Coordinator {
    pub fn new(
        port: CoordinatorPort,
        config: CoordinatorConfig,
        spawner: Arc<dyn AsyncSpawner>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            port,
            config,
            container: None,
            latest: None,
            rendered_view: None,
            pending: false,
            needs_another_pass: false,
            stats: CoordinatorStats::default(),
            scheduler: Box::new(NoopScheduler),
            image_decoder: Arc::new(RasterImageDecoder),
            fetcher,
            spawner,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn HostScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.image_decoder = decoder;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn needs_another_pass(&self) -> bool {
        self.needs_another_pass
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn latest_frame_state(&self) -> Option<&FrameState> {
        self.latest.as_ref()
    }

    /// View state of the bitmap currently on the canvas
    pub fn rendered_view(&self) -> Option<&ViewState> {
        self.rendered_view.as_ref()
    }

    /// Called by the host once per frame it wants drawn
    pub fn on_frame_opportunity(&mut self, frame_state: FrameState) -> Result<&Container> {
        if self.container.is_none() {
            log::debug!("creating presentation container {:?}", self.config.size);
            self.container = Some(Container::new(self.config.size));
        }
        self.latest = Some(frame_state);
        self.update_container_transform();

        if self.pending {
            self.needs_another_pass = true;
            self.stats.coalesced += 1;
            if let Some(latest) = self.latest.as_mut() {
                latest.animate = true;
            }
        } else {
            self.request_render()?;
        }
        self.container
            .as_ref()
            .ok_or_else(|| MapError::Render("presentation container missing".to_string()).into())
    }

    fn request_render(&mut self) -> Result<()> {
        let Some(latest) = self.latest.as_ref() else {
            return Ok(());
        };
        let frame_state = latest.to_json()?;
        self.port.send(ToEngine::Render { frame_state })?;
        self.pending = true;
        self.stats.requests_sent += 1;
        Ok(())
    }

    /// Composite a finished frame. The outstanding flag is cleared before anything can fail.
    pub fn on_render_result(&mut self, bitmap: Bitmap, frame_state: &str, transform: String) -> Result<()> {
        self.pending = false;
        self.stats.results_received += 1;
        let applied = self.apply_render_result(bitmap, frame_state, transform);
        let follow_up = self.run_another_pass();
        applied.and(follow_up)
    }

    fn apply_render_result(&mut self, bitmap: Bitmap, frame_state: &str, transform: String) -> Result<()> {
        let rendered = FrameState::from_json(frame_state)?;
        let Some(container) = self.container.as_mut() else {
            log::debug!("result arrived before any frame opportunity, ignored");
            return Ok(());
        };
        let canvas = &mut container.transform_layer.canvas;
        canvas.draw_image(bitmap);
        canvas.transform = transform;
        log::debug!(
            "frame {} composited: {} tile(s) drawn, {} missing",
            rendered.index,
            rendered.stats.tiles_drawn,
            rendered.stats.tiles_missing
        );
        self.rendered_view = Some(rendered.view_state);
        self.update_container_transform();
        Ok(())
    }

    /// The engine could not draw the frame; treat it like an empty result
    pub fn on_render_failed(&mut self, reason: &str) -> Result<()> {
        self.pending = false;
        self.stats.failures += 1;
        log::warn!("engine failed to render: {}", reason);
        self.run_another_pass()
    }

    fn run_another_pass(&mut self) -> Result<()> {
        if !self.needs_another_pass {
            return Ok(());
        }
        self.needs_another_pass = false;
        match self.latest.take() {
            Some(mut latest) => {
                latest.animate = false;
                self.on_frame_opportunity(latest).map(|_| ())
            }
            None => Ok(()),
        }
    }

    /// Run the latest frame again, as a host does once the engine asks for a
    /// redraw. Folded into the follow-up pass while a request is outstanding.
    pub fn redraw(&mut self) -> Result<bool> {
        let Some(latest) = self.latest.clone() else {
            return Ok(false);
        };
        self.on_frame_opportunity(latest)?;
        Ok(true)
    }

    /// The engine has new data and wants the host to draw again
    pub fn on_worker_render_request(&mut self) {
        self.scheduler.request_redraw();
    }

    /// Fetch and decode an image for the engine, replying with `ImageLoaded`
    pub fn on_load_image(&self, src: String) {
        let port = self.port.clone();
        let fetcher = self.fetcher.clone();
        let decoder = self.image_decoder.clone();
        spawn(&self.spawner, async move {
            let image = fetch_with_retry(fetcher.as_ref(), &src, RetryPolicy::none())
                .await
                .and_then(|bytes| decoder.decode(&bytes));
            match image {
                Ok(image) => {
                    if port.send(ToEngine::ImageLoaded { image, src }).is_err() {
                        log::debug!("engine gone, image dropped");
                    }
                }
                Err(e) => log::warn!("image {} could not be loaded: {}", src, e),
            }
        });
    }

    pub fn handle_message(&mut self, message: ToCoordinator) -> Result<()> {
        log::trace!("engine message {}", message.action());
        match message {
            ToCoordinator::Rendered {
                image_data,
                transform,
                frame_state,
            } => self.on_render_result(image_data, &frame_state, transform),
            ToCoordinator::RequestRender => {
                self.on_worker_render_request();
                Ok(())
            }
            ToCoordinator::LoadImage { src } => {
                self.on_load_image(src);
                Ok(())
            }
            ToCoordinator::RenderFailed { reason } => self.on_render_failed(&reason),
        }
    }

    /// Handle every engine message already waiting; returns how many there were
    pub fn poll(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(message) = self.port.try_recv()? {
            if let Err(e) = self.handle_message(message) {
                log::warn!("engine message failed: {}", e);
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Block up to `timeout` for one engine message and handle it
    pub fn wait(&mut self, timeout: std::time::Duration) -> Result<bool> {
        match self.port.recv_timeout(timeout) {
            Some(message) => self.handle_message(message).map(|_| true),
            None => Ok(false),
        }
    }

    fn update_container_transform(&mut self) {
        let (Some(now), Some(rendered), Some(container)) =
            (self.latest.as_ref(), self.rendered_view.as_ref(), self.container.as_mut())
        else {
            return;
        };
        let compensation = compensate(&now.view_state, rendered);
        container.transform_layer.set_transform(compensation.matrix);
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("pending", &self.pending)
            .field("needs_another_pass", &self.needs_another_pass)
            .field("stats", &self.stats)
            .finish()
    }
}
