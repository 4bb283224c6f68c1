mod common;

use common::*;
use tilerelay::prelude::*;
use tilerelay::Bitmap;

/// Engine driven by hand on the test thread, so its state can be inspected
#[cfg(test)]
mod engine_tests {
    use super::*;

    fn engine(fetcher: &Arc<StaticFetcher>) -> (RenderEngine, CoordinatorPort) {
        let (coordinator, engine_port) = channel();
        let engine = RenderEngine::new(engine_port, engine_config(), spawner(), fetcher.clone()).unwrap();
        (engine, coordinator)
    }

    fn render(engine: &mut RenderEngine, frame: &FrameState) {
        engine.handle_message(ToEngine::Render {
            frame_state: frame.to_json().unwrap(),
        });
    }

    fn wait_for_layers(engine: &mut RenderEngine) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.layers().is_empty() && Instant::now() < deadline {
            engine.wait_event(Duration::from_millis(50));
        }
    }

    /// First frame renders empty and kicks off the style load
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_frame_renders_without_layers() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(None, &["test"]));
        let (mut engine, port) = engine(&fetcher);

        let mut first = frame(1);
        first.pixel_ratio = 2.0;
        render(&mut engine, &first);
        match next_message(&port) {
            Some(ToCoordinator::Rendered {
                image_data,
                transform,
                frame_state,
            }) => {
                assert_eq!((image_data.width(), image_data.height()), (512, 512));
                assert!(image_data.is_blank());
                assert_eq!(transform, "matrix(0.5, 0, 0, 0.5, 0, 0)");
                let echoed = FrameState::from_json(&frame_state).unwrap();
                assert_eq!(echoed.view_state, first.view_state);
                assert_eq!(echoed.stats.layers_drawn, 0);
            }
            other => panic!("expected a rendered frame, got {other:?}"),
        }
        assert_eq!(engine.pixel_ratio(), Some(2.0));

        wait_for_layers(&mut engine);
        assert_eq!(engine.layers().len(), 1);
        assert!(matches!(next_message(&port), Some(ToCoordinator::RequestRender)));
    }

    /// The style is requested once no matter how many frames arrive
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_style_failure_leaves_map_empty() {
        let fetcher = Arc::new(StaticFetcher::new());
        let (mut engine, port) = engine(&fetcher);

        render(&mut engine, &frame(1));
        assert!(engine.wait_event(Duration::from_secs(2)));
        render(&mut engine, &frame(2));
        render(&mut engine, &frame(3));

        assert!(engine.layers().is_empty());
        assert_eq!(fetcher.request_count(), 1);
        let rendered = drain(&port)
            .into_iter()
            .filter(|m| matches!(m, ToCoordinator::Rendered { .. }))
            .count();
        assert_eq!(rendered, 3);
    }

    /// Buckets naming an unregistered source are skipped
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_source_is_skipped() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(None, &["test", "nope", "test"]));
        let (mut engine, _port) = engine(&fetcher);

        render(&mut engine, &frame(1));
        wait_for_layers(&mut engine);
        assert_eq!(engine.layers().len(), 2);
        assert!(engine.layers().iter().all(|l| l.source().name() == "test"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_projection_fails_the_pass() {
        let fetcher = Arc::new(StaticFetcher::new());
        let (mut engine, port) = engine(&fetcher);

        let mut frame = frame(1);
        frame.view_state.projection = "EPSG:9999".to_string();
        render(&mut engine, &frame);
        match next_message(&port) {
            Some(ToCoordinator::RenderFailed { reason }) => assert!(reason.contains("EPSG:9999")),
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    /// Tiles are only drawn into views that share the source's projection
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_view_in_another_projection_draws_nothing() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(None, &["test"]));
        fetcher.insert_json("mem://test/1/0/0.json", &land_tile());
        let (mut engine, port) = engine(&fetcher);

        render(&mut engine, &frame(1));
        wait_for_layers(&mut engine);
        render(&mut engine, &frame(2));
        assert!(engine.wait_event(Duration::from_secs(2)));
        assert_eq!(engine.queue().tiles_loading(), 0);
        drain(&port);

        let mut degrees = frame(3);
        degrees.view_state.projection = "EPSG:4326".to_string();
        render(&mut engine, &degrees);
        match next_message(&port) {
            Some(ToCoordinator::Rendered {
                image_data,
                frame_state,
                ..
            }) => {
                assert!(image_data.is_blank());
                let echoed = FrameState::from_json(&frame_state).unwrap();
                assert_eq!(echoed.stats.layers_drawn, 0);
                assert!(!echoed.is_tile_wanted("test", &TileCoord::new(0, 0, 1)));
            }
            other => panic!("expected a rendered frame, got {other:?}"),
        }

        render(&mut engine, &frame(4));
        match next_message(&port) {
            Some(ToCoordinator::Rendered { image_data, .. }) => {
                assert_eq!(image_data.pixel(128, 128), Some(RED));
            }
            other => panic!("expected a rendered frame, got {other:?}"),
        }
    }

    /// A loaded tile asks for a redraw and is drawn by the next pass
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tile_load_requests_render() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(None, &["test"]));
        fetcher.insert_json("mem://test/1/0/0.json", &land_tile());
        let (mut engine, port) = engine(&fetcher);

        render(&mut engine, &frame(1));
        wait_for_layers(&mut engine);
        drain(&port);

        render(&mut engine, &frame(2));
        assert_eq!(engine.queue().tiles_loading(), 1);
        match next_message(&port) {
            Some(ToCoordinator::Rendered { frame_state, .. }) => {
                let echoed = FrameState::from_json(&frame_state).unwrap();
                assert!(echoed.is_tile_wanted("test", &TileCoord::new(0, 0, 1)));
                assert_eq!(echoed.stats.tiles_missing, 1);
                assert_eq!(echoed.stats.tiles_loading, 1);
            }
            other => panic!("expected a rendered frame, got {other:?}"),
        }

        assert!(engine.wait_event(Duration::from_secs(2)));
        assert_eq!(engine.queue().tiles_loading(), 0);
        assert!(matches!(next_message(&port), Some(ToCoordinator::RequestRender)));

        render(&mut engine, &frame(3));
        match next_message(&port) {
            Some(ToCoordinator::Rendered { image_data, .. }) => {
                assert_eq!(image_data.pixel(128, 128), Some(RED));
            }
            other => panic!("expected a rendered frame, got {other:?}"),
        }
    }

    /// Never more than two new loads per pass, never more than eight in flight
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_admission_caps_hold_across_passes() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(None, &["test"]));
        let (mut engine, _port) = engine(&fetcher);
        render(&mut engine, &frame(1));
        wait_for_layers(&mut engine);

        // z3 covers the grid with 16 tiles
        let detailed = FrameState::new(2, view(1.0), [1024, 1024], 1.0);
        let mut loading = Vec::new();
        for _ in 0..6 {
            render(&mut engine, &detailed);
            loading.push(engine.queue().tiles_loading());
        }
        assert_eq!(loading, vec![2, 4, 6, 8, 8, 8]);
        assert_eq!(engine.queue().len(), 8);
    }

    /// Sprite image round trip through the coordinator side
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sprite_image_is_requested_and_accepted() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_json(STYLE_URL, &style(Some("mem://sprite"), &["test"]));
        fetcher.insert_json("mem://sprite.json", &serde_json::json!({}));
        let (mut engine, port) = engine(&fetcher);

        render(&mut engine, &frame(1));
        wait_for_layers(&mut engine);
        let messages = drain(&port);
        assert!(messages.contains(&ToCoordinator::LoadImage {
            src: "mem://sprite.png".to_string()
        }));
        assert_eq!(engine.layers()[0].sprite_image_url(), Some("mem://sprite.png"));

        engine.handle_message(ToEngine::ImageLoaded {
            image: Bitmap::blank(8, 8),
            src: "mem://sprite.png".to_string(),
        });
        assert_eq!(drain(&port), vec![ToCoordinator::RequestRender]);
    }
}
