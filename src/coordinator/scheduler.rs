use crossbeam_channel::Sender;

/// The host's way of scheduling a redraw ("call me again next frame")
pub trait HostScheduler: Send {
    fn request_redraw(&self);
}

/// Ignores redraw requests; for hosts that redraw continuously
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl HostScheduler for NoopScheduler {
    fn request_redraw(&self) {}
}

/// Forwards redraw requests to the host's event loop
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    tx: Sender<()>,
}

impl ChannelScheduler {
    pub fn new(tx: Sender<()>) -> Self {
        Self { tx }
    }
}

impl HostScheduler for ChannelScheduler {
    fn request_redraw(&self) {
        if self.tx.try_send(()).is_err() {
            log::trace!("redraw already pending");
        }
    }
}
