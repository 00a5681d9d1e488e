//! Subsystem facades.
//!
//! Each facade holds one [`SettingNamespace`](crate::namespace::SettingNamespace)
//! bound to a fixed prefix and tables, and adds a few typed convenience methods
//! expressed purely through `get_field` / `set_field`.

pub mod channel;
pub mod timebase;
pub mod trigger;
pub mod waveform;

pub use channel::{Channel, ChannelId, ChannelSetup};
pub use timebase::{Timebase, TimebaseReference, TimebaseSetup};
pub use trigger::{EdgeSetup, Trigger, TriggerMode};
pub use waveform::{decode_samples, ByteOrder, Preamble, Waveform, WaveformFormat};

/// Allow-set for boolean SCPI fields.
pub(crate) const ON_OFF: &[&str] = &["0", "1", "off", "on"];

/// SCPI boolean literal.
pub(crate) fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

/// Whether a requested value differs from the cached one.
///
/// Comparison ignores ASCII case, matching how the instrument parses keywords.
pub(crate) fn differs(current: Option<&str>, requested: &str) -> bool {
    current.map_or(true, |c| !c.trim().eq_ignore_ascii_case(requested.trim()))
}
