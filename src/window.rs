/// Native handle of the host window the presentation swap chain targets.
///
/// The bridge never creates or owns the window; the host passes the raw
/// handle (an `HWND` on Windows) when building a D3D11 session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId {
    handle: isize,
}

impl WindowId {
    pub const fn from_raw_handle(raw_handle: isize) -> Self {
        Self { handle: raw_handle }
    }

    pub const fn raw_handle(&self) -> isize {
        self.handle
    }

    pub fn stable_id(&self) -> String {
        format!("{:016x}", self.handle as usize as u64)
    }
}

/// Client-area size of the host window in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Swap chains cannot have zero-sized back buffers; a minimized window
    /// reports 0×0 and keeps a 1×1 presentation surface instead.
    pub fn non_zero(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_zero_padded_hex() {
        assert_eq!(WindowId::from_raw_handle(0x1a2b).stable_id(), "0000000000001a2b");
    }

    #[test]
    fn minimized_windows_keep_a_one_pixel_surface() {
        assert_eq!(WindowSize::new(0, 0).non_zero(), WindowSize::new(1, 1));
        assert_eq!(WindowSize::new(800, 0).non_zero(), WindowSize::new(800, 1));
        assert_eq!(WindowSize::new(800, 600).non_zero(), WindowSize::new(800, 600));
    }
}
