mod demo;

use anyhow::{anyhow, Context};
use demo::DemoFetcher;
use std::path::PathBuf;
use tilerelay::prelude::*;

/// Where the simulated host starts, in ETRS-TM35FIN
const START: Point = Point { x: 384_920.0, y: 6_671_856.0 };
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

struct Args {
    config: Option<PathBuf>,
    out: PathBuf,
    frames: u64,
    online: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = Args {
            config: None,
            out: PathBuf::from("tilerelay-frame.png"),
            frames: 120,
            online: false,
        };
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--out" => args.out = it.next().context("--out needs a path")?.into(),
                "--frames" => args.frames = it.next().context("--frames needs a count")?.parse()?,
                "--online" => args.online = true,
                path => args.config = Some(PathBuf::from(path)),
            }
        }
        Ok(args)
    }
}

fn relay<T>(result: tilerelay::Result<T>) -> anyhow::Result<T> {
    result.map_err(|e| anyhow!(e))
}

fn load_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            relay(RelayConfig::from_json_str(&text))?
        }
        None => RelayConfig::default(),
    };
    if !args.online {
        config.engine.style_url = Some(demo::STYLE_URL.to_string());
        for source in &mut config.engine.sources {
            source.url_template = demo::TILE_TEMPLATE.to_string();
        }
    }
    Ok(config)
}

/// Canvas pixels are premultiplied; PNG wants straight alpha
fn save_png(bitmap: &tilerelay::Bitmap, path: &PathBuf) -> anyhow::Result<()> {
    let mut pixels = bitmap.pixels().to_vec();
    for px in pixels.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha > 0 && alpha < 255 {
            for channel in &mut px[..3] {
                *channel = ((*channel as u16 * 255 + alpha / 2) / alpha).min(255) as u8;
            }
        }
    }
    let image = image::RgbaImage::from_raw(bitmap.width(), bitmap.height(), pixels)
        .context("bitmap size does not match its pixels")?;
    image.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse()?;
    let config = load_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tilerelay-io")
        .build()?;
    let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(runtime.handle().clone()));
    let fetcher: Arc<dyn Fetcher> = if args.online {
        Arc::new(HttpFetcher)
    } else {
        let source = config.engine.sources.first().context("no tile source configured")?;
        Arc::new(relay(DemoFetcher::new(source))?)
    };

    let (coordinator_port, engine_port) = channel();
    let engine = relay(RenderEngine::new(
        engine_port,
        config.engine.clone(),
        spawner.clone(),
        fetcher.clone(),
    ))?;
    let engine_thread = relay(engine.spawn())?;

    let (redraw_tx, redraw_rx) = crossbeam_channel::bounded(1);
    let mut coordinator = Coordinator::new(coordinator_port, config.coordinator.clone(), spawner, fetcher)
        .with_scheduler(Box::new(ChannelScheduler::new(redraw_tx)));

    let view = ViewState::new(START, 16.0, 0.0, "EPSG:3067");
    let size = config.coordinator.size;
    let pixel_ratio = config.coordinator.pixel_ratio;
    log::info!("panning for {} frames", args.frames);
    for index in 1..=args.frames {
        // Pan east at 4 css pixels per frame
        let center = Point::new(START.x + index as f64 * 4.0 * view.resolution, START.y);
        let frame = FrameState::new(index, view.with_center(center), size, pixel_ratio);
        let container = relay(coordinator.on_frame_opportunity(frame))?;
        log::trace!("compensation {}", container.transform_layer.transform());
        relay(coordinator.poll())?;
        // Every frame is an opportunity already, so redraw requests need no extra pass
        let _ = redraw_rx.try_recv();
        std::thread::sleep(FRAME_INTERVAL);
    }

    // Let outstanding tiles settle, redrawing whenever the engine asks
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        relay(coordinator.wait(FRAME_INTERVAL))?;
        if redraw_rx.try_recv().is_ok() {
            relay(coordinator.redraw())?;
        }
    }

    let stats = coordinator.stats();
    log::info!(
        "{} request(s) sent, {} result(s), {} coalesced, {} failure(s)",
        stats.requests_sent,
        stats.results_received,
        stats.coalesced,
        stats.failures
    );
    let bitmap = coordinator
        .container()
        .and_then(|c| c.canvas().bitmap())
        .context("no frame was rendered")?;
    save_png(bitmap, &args.out)?;
    println!("wrote {}x{} frame to {}", bitmap.width(), bitmap.height(), args.out.display());

    drop(coordinator);
    engine_thread
        .join()
        .map_err(|_| anyhow!("render engine thread panicked"))?;
    Ok(())
}
