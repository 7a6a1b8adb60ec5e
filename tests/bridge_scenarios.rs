//! End-to-end scenarios driven through `OutputCallbacks` only, the way a
//! render engine would, over the software backend.

use std::sync::Arc;

use parking_lot::Mutex;
use surface_bridge::platform::software::DeviceOp;
use surface_bridge::{
    BridgeError, BridgeState, ClearColor, GraphicsBackend, OutputCallbacks, RenderConfig, Session,
    SessionBuilder, SessionConfig, SetupConfig, SoftwareBackend, SoftwareProbe, SoftwareProducer,
    SurfaceSize, WindowCallbacks, WindowSize,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineEvent {
    Enter,
    Drew,
    Exit,
    Swap,
}

/// Stand-in for the render engine: it negotiates, brackets and draws
/// through the producer context exactly like a decoder output would.
struct FakeEngine {
    session: Session<SoftwareBackend>,
    producer: SoftwareProducer,
    probe: SoftwareProbe,
    reports: Arc<Mutex<Vec<(u32, u32)>>>,
    events: Vec<EngineEvent>,
}

impl FakeEngine {
    fn start(config: SessionConfig) -> Self {
        init_logging();
        let mut session = SessionBuilder::from_config(config)
            .build_software()
            .unwrap();
        let producer = session.backend().producer();
        let probe = session.backend().probe();
        let reports = Arc::new(Mutex::new(Vec::new()));

        session.setup(&SetupConfig::default()).unwrap();
        let sink = reports.clone();
        session
            .set_window(WindowCallbacks::with_report_size(move |w, h| {
                sink.lock().push((w, h));
            }))
            .unwrap();

        Self {
            session,
            producer,
            probe,
            reports,
            events: Vec::new(),
        }
    }

    fn negotiate(&mut self, width: u32, height: u32) {
        let output = self
            .session
            .update_output(&RenderConfig::sized(width, height))
            .unwrap();
        assert_eq!(output.pixel_format.dxgi_code(), 28);
    }

    fn render_frame(&mut self, color: ClearColor) {
        self.session.make_current(true).unwrap();
        self.events.push(EngineEvent::Enter);
        assert!(self.producer.fill(color));
        self.events.push(EngineEvent::Drew);
        self.session.make_current(false).unwrap();
        self.events.push(EngineEvent::Exit);
        self.session.swap().unwrap();
        self.events.push(EngineEvent::Swap);
    }

    fn reports(&self) -> Vec<(u32, u32)> {
        self.reports.lock().clone()
    }
}

fn close_to(actual: [u8; 4], expected: [u8; 4]) -> bool {
    actual
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff(e) <= 1)
}

#[test]
fn marker_color_reaches_the_presentation_surface() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    let marker = ClearColor([1.0, 0.5, 0.25, 1.0]);

    engine.negotiate(1920, 1080);
    engine.render_frame(marker);

    let size = engine.probe.presented_size();
    assert_eq!(size, WindowSize::new(640, 480));
    for (x, y) in [(0, 0), (320, 240), (639, 479)] {
        let texel = engine.probe.presented_texel(x, y).unwrap();
        assert!(
            close_to(texel, marker.to_rgba8()),
            "texel ({x}, {y}) was {texel:?}"
        );
    }
    assert_eq!(engine.session.frames_presented(), 1);
}

#[test]
fn renegotiation_replaces_the_surface_once() {
    let mut engine = FakeEngine::start(SessionConfig::default());

    engine.negotiate(640, 480);
    engine.render_frame(ClearColor::OPAQUE_BLACK);
    engine.negotiate(1280, 720);
    engine.render_frame(ClearColor::OPAQUE_BLACK);

    let allocations = engine
        .probe
        .count(|op| matches!(op, DeviceOp::AllocateSurface { .. }));
    let releases = engine
        .probe
        .count(|op| matches!(op, DeviceOp::ReleaseSurface { .. }));
    assert_eq!((allocations, releases), (2, 1));
    assert_eq!(engine.session.surface_stats().live(), 1);
    assert_eq!(
        engine.session.surface_size(),
        Some(SurfaceSize::new(1280, 720))
    );
    assert_eq!(engine.probe.peak_live_surfaces(), 1);
}

#[test]
fn host_resize_recreates_the_target_and_reports_once() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    engine.negotiate(640, 480);
    engine.render_frame(ClearColor::OPAQUE_BLACK);
    assert_eq!(engine.probe.presentation_targets_created(), 1);

    engine.session.resize(1024, 600).unwrap();

    assert_eq!(engine.reports(), vec![(640, 480), (1024, 600)]);
    assert_eq!(engine.probe.presentation_targets_created(), 2);
    assert_eq!(
        engine.session.backend().presentation_size(),
        WindowSize::new(1024, 600)
    );
    assert_eq!(engine.session.window_size(), WindowSize::new(1024, 600));
}

#[test]
fn resize_then_renegotiate_keeps_one_live_surface() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    engine.negotiate(640, 480);
    engine.render_frame(ClearColor::OPAQUE_BLACK);

    engine.session.resize(1280, 720).unwrap();
    let (w, h) = *engine.reports().last().unwrap();
    engine.negotiate(w, h);
    engine.render_frame(ClearColor([0.0, 1.0, 0.0, 1.0]));

    assert_eq!(engine.probe.live_surfaces(), 1);
    assert_eq!(engine.probe.peak_live_surfaces(), 1);
    assert_eq!(engine.probe.export_handles().open, 1);
    assert_eq!(
        engine.probe.presented_texel(1279, 719),
        Some([0, 255, 0, 255])
    );

    engine.session.shutdown();
    let handles = engine.probe.export_handles();
    assert_eq!(handles.open, 0);
    assert_eq!(handles.closed, 2);
    assert_eq!(handles.invalid_closes, 0);
}

#[test]
fn only_plane_zero_is_selectable() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    assert!(engine.session.select_plane(0));
    assert!(!engine.session.select_plane(1));
    assert!(!engine.session.select_plane(2));
    assert!(!engine.session.select_plane(1000));
}

#[test]
fn every_present_follows_a_completed_bracket() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    engine.negotiate(320, 240);
    for _ in 0..3 {
        engine.render_frame(ClearColor::OPAQUE_BLACK);
    }

    assert_eq!(
        engine.events,
        [
            EngineEvent::Enter,
            EngineEvent::Drew,
            EngineEvent::Exit,
            EngineEvent::Swap
        ]
        .repeat(3)
    );

    let mut composited = false;
    for op in engine.probe.ops() {
        match op {
            DeviceOp::Composite { .. } => composited = true,
            DeviceOp::Present { .. } => {
                assert!(composited, "present issued before the bracket exited");
                composited = false;
            }
            _ => {}
        }
    }
    assert_eq!(engine.session.frames_presented(), 3);
}

#[test]
fn allocation_failure_ends_the_session_cleanly() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    engine.negotiate(640, 480);
    engine.session.backend().fail_next_allocation();

    let err = engine
        .session
        .update_output(&RenderConfig::sized(800, 600))
        .unwrap_err();

    assert!(matches!(err, BridgeError::Allocation(_)));
    assert_eq!(engine.session.state(), BridgeState::ShutDown);
    assert_eq!(engine.probe.export_handles().open, 0);
    assert_eq!(engine.probe.outstanding_leases(), 0);
    assert!(matches!(
        engine.session.make_current(true),
        Err(BridgeError::InvalidState { .. })
    ));
}

#[test]
fn cleanup_and_setup_rearm_the_output() {
    let mut engine = FakeEngine::start(SessionConfig::default());
    engine.negotiate(640, 480);
    engine.render_frame(ClearColor::OPAQUE_BLACK);

    engine.session.cleanup();
    assert_eq!(engine.session.state(), BridgeState::TornDown);
    assert_eq!(engine.probe.export_handles().open, 0);

    engine.session.setup(&SetupConfig::default()).unwrap();
    engine
        .session
        .set_window(WindowCallbacks::with_report_size(|_, _| {}))
        .unwrap();
    engine.negotiate(320, 240);
    engine.render_frame(ClearColor::OPAQUE_BLACK);

    engine.session.shutdown();
    assert_eq!(engine.probe.leases_released(), 2);
    assert_eq!(engine.probe.shutdowns(), 1);
}
