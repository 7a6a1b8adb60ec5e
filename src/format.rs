//! Output negotiation vocabulary exchanged with the render engine.

/// Pixel layout of the shared surface. The bridge only ever allocates
/// 8-bit-per-channel RGBA; the enum exists so the negotiation record can
/// carry a typed identifier instead of a bare integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
}

impl PixelFormat {
    /// `DXGI_FORMAT` value the engine expects in its output configuration.
    pub const fn dxgi_code(self) -> u32 {
        match self {
            Self::Rgba8Unorm => 28,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Unorm => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    #[default]
    Bt709,
    Bt601,
    Bt2020,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorPrimaries {
    #[default]
    Bt709,
    Bt601_525,
    Bt601_625,
    Bt2020,
    DciP3,
    Bt470M,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransferFunction {
    #[default]
    Srgb,
    Linear,
    Bt709,
    Bt470M,
    Bt470Bg,
    SmpteSt2084,
    Hlg,
}

/// Orientation tag attached to the negotiated output.
///
/// Variant names describe where the first stored row and column of the
/// picture end up: `TopLeft` is the unrotated picture, `BottomRight` is
/// rotated by 180°. Discriminants match the engine's enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
    LeftTop = 4,
    LeftBottom = 5,
    RightTop = 6,
    RightBottom = 7,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
        Self::LeftTop,
        Self::LeftBottom,
        Self::RightTop,
        Self::RightBottom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::LeftTop => "left-top",
            Self::LeftBottom => "left-bottom",
            Self::RightTop => "right-top",
            Self::RightBottom => "right-bottom",
        }
    }

    /// Parses the kebab-case name produced by [`as_str`](Self::as_str).
    /// Underscores and letter case are accepted as well.
    pub fn from_name(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|orientation| orientation.as_str() == normalized)
    }

    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// Output requirements announced by the engine on every format or size
/// change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub bitdepth: u32,
    pub full_range: bool,
    pub color_space: ColorSpace,
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
}

impl RenderConfig {
    /// An 8-bit SDR request of the given size, the common case.
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bitdepth: 8,
            full_range: false,
            color_space: ColorSpace::Bt709,
            primaries: ColorPrimaries::Bt709,
            transfer: TransferFunction::Bt709,
        }
    }
}

/// Output Negotiation Record returned to the engine. Recomputed every time
/// the shared surface is (re)created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub pixel_format: PixelFormat,
    pub full_range: bool,
    pub color_space: ColorSpace,
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
    pub orientation: Orientation,
}

impl OutputConfig {
    pub(crate) fn for_surface(pixel_format: PixelFormat, orientation: Orientation) -> Self {
        Self {
            pixel_format,
            full_range: true,
            color_space: ColorSpace::Bt709,
            primaries: ColorPrimaries::Bt709,
            transfer: TransferFunction::Srgb,
            orientation,
        }
    }
}

/// HDR10 mastering metadata. Chromaticities are in 0.00002 units and
/// luminance in 0.0001 cd/m², as delivered by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hdr10Metadata {
    pub red_primary: [u16; 2],
    pub green_primary: [u16; 2],
    pub blue_primary: [u16; 2],
    pub white_point: [u16; 2],
    pub max_mastering_luminance: u32,
    pub min_mastering_luminance: u32,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

/// Per-frame informational metadata. Observed by the bridge, never acted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMetadata {
    Hdr10(Hdr10Metadata),
}
