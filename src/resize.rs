use crate::backend::GraphicsBackend;
use crate::bridge::BridgeState;
use crate::error::{BridgeError, BridgeResult};
use crate::session::Session;
use crate::window::WindowSize;

impl<B: GraphicsBackend> Session<B> {
    /// Host window resize.
    ///
    /// Rebuilds the presentation target at the new size and reports it to
    /// the engine once, through the callback captured at window binding.
    /// The shared surface is left alone: the engine renegotiates at its
    /// own pace, and an open frame bracket simply composites into the new
    /// target on exit.
    pub fn resize(&mut self, width: u32, height: u32) -> BridgeResult<()> {
        if self.state == BridgeState::ShutDown {
            log::warn!("ignoring resize to {width}x{height} after shutdown");
            return Err(BridgeError::InvalidState {
                callback: "resize",
                state: self.state,
            });
        }

        let size = WindowSize::new(width, height).non_zero();
        if let Err(err) = self.backend.resize_presentation(size) {
            return Err(self.escalate(err));
        }
        self.window_size = size;
        log::debug!(
            "presentation resized to {}x{} (state {:?})",
            size.width,
            size.height,
            self.state
        );

        if let Some(callbacks) = self.window.as_mut() {
            (callbacks.report_size)(size.width, size.height);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::GraphicsBackend;
    use crate::callbacks::{OutputCallbacks, SetupConfig, WindowCallbacks};
    use crate::format::RenderConfig;
    use crate::platform::software::DeviceOp;
    use crate::session::{SessionBuilder, SessionConfig};
    use crate::window::WindowSize;
    use std::sync::{Arc, Mutex};

    #[test]
    fn resize_before_window_binding_reports_nothing() {
        let mut session = SessionBuilder::from_config(SessionConfig::default())
            .build_software()
            .unwrap();
        let probe = session.backend().probe();

        session.resize(800, 600).unwrap();

        assert_eq!(session.window_size(), WindowSize::new(800, 600));
        assert_eq!(
            probe.count(|op| matches!(op, DeviceOp::ResizePresentation { .. })),
            1
        );
    }

    #[test]
    fn zero_sized_resize_keeps_a_valid_target() {
        let mut session = SessionBuilder::from_config(SessionConfig::default())
            .build_software()
            .unwrap();
        session.resize(0, 0).unwrap();
        assert_eq!(session.window_size(), WindowSize::new(1, 1));
        assert_eq!(session.backend().presentation_size(), WindowSize::new(1, 1));
    }

    #[test]
    fn resize_inside_an_open_bracket_is_tolerated() {
        let mut session = SessionBuilder::from_config(SessionConfig::default())
            .build_software()
            .unwrap();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        session.setup(&SetupConfig::default()).unwrap();
        session
            .set_window(WindowCallbacks::with_report_size(move |w, h| {
                sink.lock().unwrap().push((w, h));
            }))
            .unwrap();
        session.update_output(&RenderConfig::sized(640, 480)).unwrap();
        session.make_current(true).unwrap();

        session.resize(1024, 768).unwrap();
        session.make_current(false).unwrap();
        session.swap().unwrap();

        assert_eq!(*reports.lock().unwrap(), vec![(640, 480), (1024, 768)]);
        assert_eq!(session.backend().probe().presented_size(), WindowSize::new(1024, 768));
    }
}
