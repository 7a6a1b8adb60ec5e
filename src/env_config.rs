//! Centralized environment-variable parsing helpers.
//!
//! Session defaults that can be overridden from the environment are read
//! through these helpers so the truthy/falsey parsing lives in one place.

use crate::format::Orientation;

pub(crate) const VSYNC_VAR: &str = "SURFACE_BRIDGE_VSYNC";
pub(crate) const DEBUG_DEVICE_VAR: &str = "SURFACE_BRIDGE_DEBUG_DEVICE";
pub(crate) const ORIENTATION_VAR: &str = "SURFACE_BRIDGE_ORIENTATION";

/// Returns `true` when `raw` is a truthy value (`1`, `true`, `yes`, or `on`,
/// case-insensitive, trimmed).
#[inline]
pub(crate) fn is_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

#[inline]
pub(crate) fn env_var_truthy(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|raw| is_truthy(&raw))
        .unwrap_or(false)
}

/// Parses an orientation override. Unknown values are ignored with a
/// warning so a typo never aborts session creation.
pub(crate) fn env_var_orientation(var_name: &str) -> Option<Orientation> {
    let raw = std::env::var(var_name).ok()?;
    let parsed = Orientation::from_name(&raw);
    if parsed.is_none() {
        log::warn!("ignoring {var_name}={raw:?}: not a known orientation");
    }
    parsed
}
