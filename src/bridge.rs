//! Render callback bridge: the state machine the engine drives.
//!
//! ```text
//! Uninitialized -> DeviceReady -> WindowBound -> FrameNegotiated <-> Rendering
//!        ^                                             |
//!        +------------- TornDown <--- cleanup ---------+      (any) -> ShutDown
//! ```

use crate::backend::{GraphicsBackend, SurfaceSize};
use crate::callbacks::{DeviceSetup, OutputCallbacks, SetupConfig, WindowCallbacks};
use crate::error::{BridgeError, BridgeResult};
use crate::format::{FrameMetadata, OutputConfig, RenderConfig};
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    /// The engine holds the producer context.
    DeviceReady,
    /// Window callbacks are registered and the first size was reported.
    WindowBound,
    /// A shared surface matching the last request is bound on the producer.
    FrameNegotiated,
    /// Between `make_current(true)` and `make_current(false)`.
    Rendering,
    /// The engine released its output; `setup` may start a new one.
    TornDown,
    ShutDown,
}

/// Last frame bracket signal observed for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameBracket {
    Entering,
    Exiting,
}

impl FrameBracket {
    pub fn from_enter(enter: bool) -> Self {
        if enter { Self::Entering } else { Self::Exiting }
    }
}

/// Only the first plane is ever rendered.
pub fn is_supported_plane(plane: usize) -> bool {
    plane == 0
}

impl<B: GraphicsBackend> Session<B> {
    fn ensure_state(
        &self,
        callback: &'static str,
        allowed: &[BridgeState],
    ) -> BridgeResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        log::warn!("rejecting `{callback}` in state {:?}", self.state);
        Err(BridgeError::InvalidState {
            callback,
            state: self.state,
        })
    }

    fn enter_frame(&mut self) -> BridgeResult<()> {
        self.ensure_state("make_current(enter)", &[BridgeState::FrameNegotiated])?;
        let Some(surface) = self.surfaces.current() else {
            return Err(BridgeError::InvalidState {
                callback: "make_current(enter)",
                state: self.state,
            });
        };
        self.backend
            .clear_producer_target(surface, self.config.clear_color);
        self.state = BridgeState::Rendering;
        self.bracket = Some(FrameBracket::Entering);
        log::trace!("frame bracket entered");
        Ok(())
    }

    fn exit_frame(&mut self) -> BridgeResult<()> {
        self.ensure_state("make_current(exit)", &[BridgeState::Rendering])?;
        let Some(surface) = self.surfaces.current() else {
            return Err(BridgeError::InvalidState {
                callback: "make_current(exit)",
                state: self.state,
            });
        };
        if let Err(err) =
            self.backend
                .composite(surface, self.window_size, self.config.clear_color)
        {
            return Err(self.escalate(err));
        }
        self.state = BridgeState::FrameNegotiated;
        self.bracket = Some(FrameBracket::Exiting);
        log::trace!("frame bracket exited, composited into presentation target");
        Ok(())
    }
}

impl<B: GraphicsBackend> OutputCallbacks for Session<B> {
    fn setup(&mut self, config: &SetupConfig) -> BridgeResult<DeviceSetup> {
        self.ensure_state("setup", &[BridgeState::Uninitialized, BridgeState::TornDown])?;
        let context = match self.backend.lease_producer_context() {
            Ok(context) => context,
            Err(err) => return Err(self.escalate(err)),
        };
        self.state = BridgeState::DeviceReady;
        log::debug!(
            "producer context {:#x} handed to engine (hardware decoding: {}, leases: {})",
            context.raw(),
            config.hardware_decoding,
            self.backend.outstanding_producer_leases()
        );
        Ok(DeviceSetup { context })
    }

    fn cleanup(&mut self) {
        if self.state == BridgeState::ShutDown {
            return;
        }
        self.surfaces.release_surface(&mut self.backend);
        self.output = None;
        self.bracket = None;
        self.window = None;
        self.state = BridgeState::TornDown;
        log::debug!("engine output cleaned up");
    }

    fn set_window(&mut self, mut callbacks: WindowCallbacks) -> BridgeResult<()> {
        self.ensure_state("set_window", &[BridgeState::DeviceReady])?;
        let size = self.window_size;
        (callbacks.report_size)(size.width, size.height);
        self.window = Some(callbacks);
        self.state = BridgeState::WindowBound;
        log::debug!(
            "engine window bound, reported {}x{}",
            size.width,
            size.height
        );
        Ok(())
    }

    fn update_output(&mut self, config: &RenderConfig) -> BridgeResult<OutputConfig> {
        if self.state == BridgeState::Rendering {
            log::warn!("rejecting renegotiation while a frame bracket is open");
            return Err(BridgeError::NegotiationRejected(
                "cannot renegotiate while a frame bracket is open".into(),
            ));
        }
        self.ensure_state(
            "update_output",
            &[BridgeState::WindowBound, BridgeState::FrameNegotiated],
        )?;

        let requested = SurfaceSize::clamped(config.width, config.height);
        if requested.exceeds_device_limit() {
            return Err(BridgeError::NegotiationRejected(format!(
                "{}x{} exceeds the {}px texture limit",
                config.width,
                config.height,
                crate::backend::MAX_SURFACE_DIMENSION
            )));
        }
        if config.bitdepth > 8 {
            log::debug!(
                "{}-bit output requested, serving 8-bit RGBA",
                config.bitdepth
            );
        }

        let info = match self
            .surfaces
            .ensure_surface(&mut self.backend, config.width, config.height)
        {
            Ok(info) => info,
            Err(err) => return Err(self.escalate(err)),
        };
        if let Some(surface) = self.surfaces.current() {
            self.backend.bind_producer_target(surface);
        }

        let record = OutputConfig::for_surface(info.format, self.config.orientation);
        self.output = Some(record);
        self.state = BridgeState::FrameNegotiated;
        log::debug!(
            "output negotiated at {}x{} (requested {}x{}, reallocated: {})",
            info.size.width,
            info.size.height,
            config.width,
            config.height,
            info.reallocated
        );
        Ok(record)
    }

    fn swap(&mut self) -> BridgeResult<()> {
        self.ensure_state("swap", &[BridgeState::FrameNegotiated])?;
        if self.bracket != Some(FrameBracket::Exiting) {
            log::debug!("presenting without a newly composited frame");
        }
        if let Err(err) = self.backend.present(self.config.sync_interval()) {
            return Err(self.escalate(err));
        }
        self.bracket = None;
        self.frames_presented += 1;
        log::trace!("presented frame {}", self.frames_presented);
        Ok(())
    }

    fn make_current(&mut self, enter: bool) -> BridgeResult<()> {
        match FrameBracket::from_enter(enter) {
            FrameBracket::Entering => self.enter_frame(),
            FrameBracket::Exiting => self.exit_frame(),
        }
    }

    fn frame_metadata(&mut self, metadata: &FrameMetadata) {
        self.metadata_seen += 1;
        match metadata {
            FrameMetadata::Hdr10(hdr) => log::trace!(
                "HDR10 metadata: MaxCLL {} MaxFALL {}",
                hdr.max_content_light_level,
                hdr.max_frame_average_light_level
            ),
        }
    }

    fn select_plane(&mut self, plane: usize) -> bool {
        is_supported_plane(plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClearColor, SurfaceSize};
    use crate::format::{Hdr10Metadata, Orientation};
    use crate::platform::software::{DeviceOp, SoftwareBackend};
    use crate::session::{SessionBuilder, SessionConfig};
    use std::sync::{Arc, Mutex};

    fn session() -> Session<SoftwareBackend> {
        SessionBuilder::from_config(SessionConfig::default())
            .build_software()
            .unwrap()
    }

    fn bound_session() -> (Session<SoftwareBackend>, Arc<Mutex<Vec<(u32, u32)>>>) {
        let mut session = session();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        session.setup(&SetupConfig::default()).unwrap();
        session
            .set_window(WindowCallbacks::with_report_size(move |w, h| {
                sink.lock().unwrap().push((w, h));
            }))
            .unwrap();
        (session, reports)
    }

    #[test]
    fn plane_zero_is_the_only_supported_plane() {
        let mut session = session();
        assert!(session.select_plane(0));
        for plane in [1, 2, 1000] {
            assert!(!session.select_plane(plane));
        }
    }

    #[test]
    fn window_binding_reports_the_current_size_once() {
        let (session, reports) = bound_session();
        assert_eq!(session.state(), BridgeState::WindowBound);
        assert_eq!(*reports.lock().unwrap(), vec![(640, 480)]);
    }

    #[test]
    fn window_binding_requires_a_device() {
        let mut session = session();
        let err = session
            .set_window(WindowCallbacks::with_report_size(|_, _| {}))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidState {
                callback: "set_window",
                state: BridgeState::Uninitialized
            }
        ));
    }

    #[test]
    fn negotiation_returns_the_fixed_record_with_configured_orientation() {
        let mut session = SessionBuilder::from_config(SessionConfig::default())
            .orientation(Orientation::BottomLeft)
            .build_software()
            .unwrap();
        session.setup(&SetupConfig::default()).unwrap();
        session
            .set_window(WindowCallbacks::with_report_size(|_, _| {}))
            .unwrap();

        let record = session.update_output(&RenderConfig::sized(0, 0)).unwrap();

        assert_eq!(record.orientation, Orientation::BottomLeft);
        assert_eq!(record.pixel_format.dxgi_code(), 28);
        assert_eq!(session.state(), BridgeState::FrameNegotiated);
        assert_eq!(
            session.surfaces.current_size(),
            Some(SurfaceSize::new(8, 8))
        );
        assert_eq!(session.negotiated_output(), Some(record));
    }

    #[test]
    fn oversized_negotiation_is_recoverable() {
        let (mut session, _) = bound_session();
        session.update_output(&RenderConfig::sized(1280, 720)).unwrap();

        let err = session
            .update_output(&RenderConfig::sized(20000, 720))
            .unwrap_err();

        assert!(matches!(err, BridgeError::NegotiationRejected(_)));
        assert!(!session.is_shut_down());
        assert_eq!(session.state(), BridgeState::FrameNegotiated);
        assert_eq!(
            session.surfaces.current_size(),
            Some(SurfaceSize::new(1280, 720))
        );
    }

    #[test]
    fn renegotiation_inside_a_bracket_is_rejected() {
        let (mut session, _) = bound_session();
        session.update_output(&RenderConfig::sized(640, 480)).unwrap();
        session.make_current(true).unwrap();

        let err = session
            .update_output(&RenderConfig::sized(1280, 720))
            .unwrap_err();

        assert!(matches!(err, BridgeError::NegotiationRejected(_)));
        assert_eq!(session.state(), BridgeState::Rendering);
        session.make_current(false).unwrap();
        session.swap().unwrap();
    }

    #[test]
    fn bracket_enter_clears_the_shared_surface() {
        let (mut session, _) = bound_session();
        let producer = session.backend().producer();
        session.update_output(&RenderConfig::sized(16, 16)).unwrap();

        producer.fill(ClearColor([1.0, 0.0, 0.0, 1.0]));
        session.make_current(true).unwrap();

        let surface = session.surfaces.current().unwrap();
        assert_eq!(surface.consumer_texel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn overlapping_brackets_are_rejected() {
        let (mut session, _) = bound_session();
        session.update_output(&RenderConfig::sized(64, 64)).unwrap();
        session.make_current(true).unwrap();
        assert!(session.make_current(true).is_err());
        session.make_current(false).unwrap();
        assert!(session.make_current(false).is_err());
    }

    #[test]
    fn present_requires_the_bracket_to_be_closed() {
        let (mut session, _) = bound_session();
        let probe = session.backend().probe();
        session.update_output(&RenderConfig::sized(64, 64)).unwrap();
        session.make_current(true).unwrap();

        let err = session.swap().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidState {
                callback: "swap",
                state: BridgeState::Rendering
            }
        ));
        assert_eq!(probe.count(|op| matches!(op, DeviceOp::Present { .. })), 0);

        session.make_current(false).unwrap();
        session.swap().unwrap();
        assert_eq!(session.frames_presented(), 1);
        assert_eq!(
            probe.count(|op| matches!(op, DeviceOp::Present { sync_interval: 0 })),
            1
        );
    }

    #[test]
    fn vsync_changes_the_present_interval() {
        let mut session = SessionBuilder::from_config(SessionConfig::default())
            .vertical_sync(true)
            .build_software()
            .unwrap();
        let probe = session.backend().probe();
        session.setup(&SetupConfig::default()).unwrap();
        session
            .set_window(WindowCallbacks::with_report_size(|_, _| {}))
            .unwrap();
        session.update_output(&RenderConfig::sized(64, 64)).unwrap();
        session.make_current(true).unwrap();
        session.make_current(false).unwrap();
        session.swap().unwrap();

        assert_eq!(
            probe.count(|op| matches!(op, DeviceOp::Present { sync_interval: 1 })),
            1
        );
    }

    #[test]
    fn cleanup_releases_the_surface_and_allows_a_new_output() {
        let (mut session, _) = bound_session();
        let probe = session.backend().probe();
        session.update_output(&RenderConfig::sized(320, 240)).unwrap();

        session.cleanup();
        session.cleanup();

        assert_eq!(session.state(), BridgeState::TornDown);
        assert!(session.surfaces.current().is_none());
        assert_eq!(probe.export_handles().open, 0);
        assert_eq!(probe.export_handles().closed, 1);

        session.setup(&SetupConfig::default()).unwrap();
        assert_eq!(session.state(), BridgeState::DeviceReady);
        assert_eq!(session.backend().outstanding_producer_leases(), 2);
    }

    #[test]
    fn allocation_failure_tears_the_session_down() {
        let (mut session, _) = bound_session();
        let probe = session.backend().probe();
        session.update_output(&RenderConfig::sized(320, 240)).unwrap();
        session.backend.fail_next_allocation();

        let err = session
            .update_output(&RenderConfig::sized(640, 480))
            .unwrap_err();

        assert!(matches!(err, BridgeError::Allocation(_)));
        assert!(session.is_shut_down());
        assert_eq!(probe.export_handles().open, 0);
        assert_eq!(probe.outstanding_leases(), 0);
        assert_eq!(probe.shutdowns(), 1);
    }

    #[test]
    fn metadata_is_observed_without_changing_state() {
        let (mut session, _) = bound_session();
        let before = session.state();
        session.frame_metadata(&FrameMetadata::Hdr10(Hdr10Metadata {
            max_content_light_level: 1000,
            max_frame_average_light_level: 400,
            ..Default::default()
        }));
        assert_eq!(session.state(), before);
        assert_eq!(session.metadata_seen(), 1);
    }
}
