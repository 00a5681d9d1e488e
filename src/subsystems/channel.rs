//! `:CHANnel<n>` subsystem.

use super::{differs, on_off, ON_OFF};
use crate::error::{Result, ScopeError};
use crate::link::SharedLink;
use crate::namespace::{AllowList, CommandTable, SettingNamespace};
use std::fmt;
use std::str::FromStr;

/// Number of analog inputs on the supported scopes.
pub const CHANNEL_COUNT: u8 = 4;

const QUERIES: &[(&str, &str)] = &[
    ("Bandwidth Limit", "BWLimit"),
    ("Coupling", "COUPling"),
    ("Display", "DISPlay"),
    ("Impedance", "IMPedance"),
    ("Invert", "INVert"),
    ("Label", "LABel"),
    ("Offset", "OFFSet"),
    ("Probe", "PROBe"),
    ("Protection", "PROTection"),
    ("Range", "RANGe"),
    ("Scale", "SCALe"),
    ("Units", "UNITs"),
    ("Vernier", "VERNier"),
];

const WRITABLE: &[(&str, &[&str])] = &[
    ("bandwidth limit", ON_OFF),
    ("coupling", &["ac", "dc"]),
    ("display", ON_OFF),
    ("impedance", &["onemeg", "fifty"]),
    ("invert", ON_OFF),
    ("label", &[]),
    ("offset", &[]),
    ("probe", &[]),
    ("range", &[]),
    ("scale", &[]),
    ("units", &["volt", "ampere"]),
    ("vernier", ON_OFF),
];

const DIRECTIVES: &[(&str, &str)] = &[("clear protection", "PROTection:CLEar")];

/// Analog input number, 1 through [`CHANNEL_COUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Every channel, in order.
    pub const ALL: [ChannelId; CHANNEL_COUNT as usize] =
        [ChannelId(1), ChannelId(2), ChannelId(3), ChannelId(4)];

    /// Channel `number`, if it exists.
    pub fn new(number: u8) -> Result<Self> {
        if (1..=CHANNEL_COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(ScopeError::InvalidChannel(format!("channel{number}")))
        }
    }

    /// 1-based channel number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based index into per-channel arrays.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// SCPI subsystem prefix, e.g. `CHANnel2`.
    pub fn prefix(self) -> String {
        format!("CHANnel{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ScopeError;

    /// Accepts `channel1` through `channel4`, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScopeError::InvalidChannel(s.to_string());
        let trimmed = s.trim();
        let tail = trimmed
            .get(..7)
            .filter(|head| head.eq_ignore_ascii_case("channel"))
            .map(|_| &trimmed[7..])
            .ok_or_else(invalid)?;
        match tail.as_bytes() {
            [digit @ b'1'..=b'4'] => ChannelId::new(digit - b'0'),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel{}", self.0)
    }
}

/// Vertical settings applied by [`Channel::setup`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ChannelSetup {
    /// Volts per division
    pub scale: Option<String>,
    /// Vertical offset in volts
    pub offset: Option<String>,
    /// Input coupling
    pub coupling: Option<String>,
    /// Trace shown on screen
    pub display: Option<bool>,
}

/// Facade over one `:CHANnel<n>` subsystem.
pub struct Channel {
    id: ChannelId,
    ns: SettingNamespace,
}

impl Channel {
    /// Create the facade for channel `id` over `link`.
    pub fn new(link: SharedLink, id: ChannelId, verbose: bool) -> Result<Self> {
        let ns = SettingNamespace::new(
            id.prefix(),
            CommandTable::from_pairs(QUERIES),
            AllowList::from_pairs(WRITABLE),
            link,
            verbose,
        )?
        .with_directives(CommandTable::from_pairs(DIRECTIVES));
        Ok(Self { id, ns })
    }

    /// Which input this facade controls.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Underlying namespace.
    pub fn namespace(&self) -> &SettingNamespace {
        &self.ns
    }

    /// Underlying namespace, for generic reads and writes.
    pub fn namespace_mut(&mut self) -> &mut SettingNamespace {
        &mut self.ns
    }

    /// Volts per division.
    pub fn set_scale(&mut self, scale: &str) -> Result<()> {
        self.ns.set_field("scale", scale, false)
    }

    /// Vertical offset.
    pub fn set_offset(&mut self, offset: &str) -> Result<()> {
        self.ns.set_field("offset", offset, false)
    }

    /// `ac` or `dc`.
    pub fn set_coupling(&mut self, coupling: &str) -> Result<()> {
        self.ns.set_field("coupling", coupling, false)
    }

    /// Show or hide the trace.
    pub fn set_display(&mut self, shown: bool) -> Result<()> {
        self.ns.set_field("display", on_off(shown), false)
    }

    /// Enable the 25 MHz bandwidth limit.
    pub fn set_bandwidth_limit(&mut self, enabled: bool) -> Result<()> {
        self.ns.set_field("bandwidth limit", on_off(enabled), false)
    }

    /// Clear a tripped input protection.
    pub fn clear_protection(&mut self) -> Result<()> {
        self.ns.directive("clear protection")
    }

    /// Current volts per division.
    pub fn scale(&mut self) -> Result<f64> {
        self.numeric("Scale")
    }

    /// Current vertical offset.
    pub fn offset(&mut self) -> Result<f64> {
        self.numeric("Offset")
    }

    fn numeric(&mut self, name: &str) -> Result<f64> {
        let text = self.ns.get_field(name)?;
        text.trim()
            .parse()
            .map_err(|_| ScopeError::MalformedResponse {
                command: format!(":{}:{}?", self.ns.prefix(), name.to_ascii_uppercase()),
                response: text,
            })
    }

    /// Write every requested field that differs from the cached value, then
    /// re-read the channel once if anything was written.
    pub fn setup(&mut self, setup: &ChannelSetup) -> Result<()> {
        let current = self.ns.refresh_state(false)?.clone();
        let shown = setup.display.map(on_off);

        let requested = [
            ("scale", "Scale", setup.scale.as_deref()),
            ("offset", "Offset", setup.offset.as_deref()),
            ("coupling", "Coupling", setup.coupling.as_deref()),
            ("display", "Display", shown),
        ];
        let mut wrote = false;
        for (key, name, value) in requested {
            if let Some(value) = value {
                if differs(current.get(name), value) {
                    self.ns.set_field(key, value, false)?;
                    wrote = true;
                }
            }
        }

        if wrote {
            self.ns.refresh_state(true)?;
        }
        Ok(())
    }

    /// Enable or disable verbose logging.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.ns.set_verbose(verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::InstrumentLink;
    use crate::session::{MockHandle, MockSession};

    fn channel(n: u8) -> (Channel, MockHandle) {
        let session = MockSession::new();
        let handle = session.handle();
        let link = InstrumentLink::new(Box::new(session), false).into_shared();
        (
            Channel::new(link, ChannelId::new(n).unwrap(), false).unwrap(),
            handle,
        )
    }

    #[test]
    fn channel_ids_parse_case_insensitively() {
        assert_eq!("channel3".parse::<ChannelId>().unwrap().number(), 3);
        assert_eq!("CHANNEL1".parse::<ChannelId>().unwrap().number(), 1);
        assert_eq!(ChannelId::new(2).unwrap().to_string(), "channel2");
        assert_eq!(ChannelId::new(4).unwrap().prefix(), "CHANnel4");
    }

    #[test]
    fn out_of_range_channels_are_rejected() {
        for bad in [
            "channel0",
            "channel5",
            "chan1",
            "math",
            "",
            "channel",
            "channel+1",
            "channel01",
            "channel004",
            "channel1x",
        ] {
            assert!(
                matches!(bad.parse::<ChannelId>(), Err(ScopeError::InvalidChannel(_))),
                "{bad} should be rejected"
            );
        }
        assert!(ChannelId::new(0).is_err());
    }

    #[test]
    fn scale_write_uses_channel_prefix() {
        let (mut ch, handle) = channel(1);
        ch.set_scale("3.00").unwrap();
        assert_eq!(handle.writes(), vec![":CHANnel1:SCALe 3.00".to_string()]);
    }

    #[test]
    fn read_all_queries_every_setting_in_order() {
        let (mut ch, handle) = channel(2);
        ch.namespace_mut().refresh_state(false).unwrap();
        let queries = handle.setting_queries();
        assert_eq!(queries.len(), QUERIES.len());
        assert_eq!(queries[0], ":CHANnel2:BWLimit?");
        assert_eq!(queries[12], ":CHANnel2:VERNier?");
    }

    #[test]
    fn numeric_accessors_parse_scientific_notation() {
        let (mut ch, _) = channel(1);
        assert_eq!(ch.scale().unwrap(), 1.0);
        assert_eq!(ch.offset().unwrap(), 0.0);
    }

    #[test]
    fn boolean_setters_send_scpi_literals() {
        let (mut ch, handle) = channel(3);
        ch.set_display(true).unwrap();
        ch.set_bandwidth_limit(false).unwrap();
        assert_eq!(
            handle.writes(),
            vec![
                ":CHANnel3:DISPlay 1".to_string(),
                ":CHANnel3:BWLimit 0".to_string()
            ]
        );
    }

    #[test]
    fn setup_only_writes_changed_fields() {
        let (mut ch, handle) = channel(1);
        ch.setup(&ChannelSetup {
            scale: Some("0.5".into()),
            coupling: Some("DC".into()),
            display: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(handle.writes(), vec![":CHANnel1:SCALe 0.5".to_string()]);

        // Snapshot plus one re-read after the write.
        assert!(ch.namespace().is_fresh());
        assert_eq!(handle.setting_queries().len(), 2 * QUERIES.len());
        assert_eq!(ch.scale().unwrap(), 0.5);
    }

    #[test]
    fn setup_without_changes_skips_reread() {
        let (mut ch, handle) = channel(2);
        ch.setup(&ChannelSetup {
            offset: Some("+0.00000E+00".into()),
            display: Some(false),
            ..Default::default()
        })
        .unwrap();
        assert!(handle.writes().is_empty());
        assert_eq!(handle.setting_queries().len(), QUERIES.len());
    }

    #[test]
    fn impedance_allow_set_is_enforced() {
        let (mut ch, handle) = channel(1);
        let err = ch
            .namespace_mut()
            .set_field("impedance", "75", false)
            .unwrap_err();
        assert!(matches!(err, ScopeError::InvalidValue { .. }));
        assert!(handle.transcript().is_empty());
    }
}
