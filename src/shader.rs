use std::borrow::Cow;

/// Built-in full-screen quad program: the vertex stage synthesizes the
/// covering triangle from `SV_VertexID`, the pixel stage samples slot 0.
pub const QUAD_HLSL: &str = include_str!("shaders/quad.hlsl");

pub const DEFAULT_VERTEX_ENTRY: &str = "VSMain";
pub const DEFAULT_PIXEL_ENTRY: &str = "PSMain";
pub const VERTEX_TARGET: &str = "vs_4_0";
pub const PIXEL_TARGET: &str = "ps_4_0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderDefine {
    pub name: String,
    pub value: String,
}

/// HLSL text for the compositing pipeline, compiled once when the
/// presentation device is created.
///
/// The text is opaque to the bridge. A program that fails to compile is a
/// fatal startup error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub text: Cow<'static, str>,
    pub vertex_entry: String,
    pub pixel_entry: String,
    /// Preprocessor defines applied to the pixel stage only.
    pub pixel_defines: Vec<ShaderDefine>,
}

impl ShaderSource {
    pub fn from_text(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            text: text.into(),
            vertex_entry: DEFAULT_VERTEX_ENTRY.to_string(),
            pixel_entry: DEFAULT_PIXEL_ENTRY.to_string(),
            pixel_defines: Vec::new(),
        }
    }

    pub fn with_entry_points(mut self, vertex: &str, pixel: &str) -> Self {
        self.vertex_entry = vertex.to_string();
        self.pixel_entry = pixel.to_string();
        self
    }

    pub fn with_pixel_define(mut self, name: &str, value: &str) -> Self {
        self.pixel_defines.push(ShaderDefine {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Name of an entry point that does not appear as a function in the
    /// source text, if any.
    pub(crate) fn missing_entry_point(&self) -> Option<&str> {
        [self.vertex_entry.as_str(), self.pixel_entry.as_str()]
            .into_iter()
            .find(|entry| !declares_function(&self.text, entry))
    }
}

impl Default for ShaderSource {
    fn default() -> Self {
        Self::from_text(QUAD_HLSL).with_pixel_define("COPYMODE", "1")
    }
}

fn declares_function(text: &str, name: &str) -> bool {
    text.match_indices(name).any(|(at, _)| {
        let before_ok = text[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        let after_ok = text[at + name.len()..].trim_start().starts_with('(');
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_program_declares_both_stages() {
        let source = ShaderSource::default();
        assert_eq!(source.missing_entry_point(), None);
        assert_eq!(source.pixel_defines.len(), 1);
        assert_eq!(source.pixel_defines[0].name, "COPYMODE");
    }

    #[test]
    fn entry_point_lookup_ignores_prefixed_identifiers_and_comments() {
        let text = "float4 MyPSMain() : SV_Target { return 0; }\n// PSMain\nvoid VSMain () {}";
        let source = ShaderSource::from_text(text.to_string());
        assert_eq!(source.missing_entry_point(), Some("PSMain"));
    }

    #[test]
    fn custom_entry_points_are_checked() {
        let source = ShaderSource::from_text(QUAD_HLSL).with_entry_points("VSMain", "Composite");
        assert_eq!(source.missing_entry_point(), Some("Composite"));
    }
}
