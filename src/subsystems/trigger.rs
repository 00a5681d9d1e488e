//! `:TRIGger` subsystem.
//!
//! Source, level, slope, coupling and reject live under a mode-qualified header
//! (`:TRIGger:EDGE:SOURce`, ...). The convenience setters read the current mode
//! and route the write accordingly. Only EDGE triggering is supported.

use super::{differs, ON_OFF};
use crate::error::{Result, ScopeError};
use crate::link::SharedLink;
use crate::namespace::{AllowList, CommandTable, SettingNamespace};

/// Command prefix
pub const PREFIX: &str = "TRIGger";

const QUERIES: &[(&str, &str)] = &[
    ("HF_Reject", "HFReject"),
    ("Hold-off", "HOLDoff"),
    ("Hold-off Maximum", "HOLDoff:MAXimum"),
    ("Hold-off Minimum", "HOLDoff:MINimum"),
    ("Hold-off Random", "HOLDoff:RANDom"),
    ("Mode", "MODE"),
    ("Noise reject", "NREJect"),
    ("Sweep", "SWEep"),
    ("Edge:Coupling", "EDGE:COUPling"),
    ("Edge:Reject", "EDGE:REJect"),
    ("Edge:Level", "EDGE:LEVel"),
    ("Edge:Slope", "EDGE:SLOPE"),
    ("Edge:Source", "EDGE:SOURCE"),
];

const WRITABLE: &[(&str, &[&str])] = &[
    ("hf_reject", ON_OFF),
    ("hold-off", &[]),
    ("mode", &["edge"]),
    ("noise reject", ON_OFF),
    ("sweep", &["auto", "normal"]),
    ("edge:coupling", &["dc", "ac", "lfreject"]),
    ("edge:reject", &["off", "lfreject", "hfreject"]),
    ("edge:level", &[]),
    ("edge:slope", &["positive", "negative", "either", "alternate"]),
    (
        "edge:source",
        &[
            "channel1", "channel2", "channel3", "channel4", "external", "line", "wgen", "wgen1",
            "wgen2", "wmod",
        ],
    ),
];

const DIRECTIVES: &[(&str, &str)] = &[("force", "FORCe")];

/// Trigger modes this library can route writes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Edge triggering
    Edge,
}

impl TriggerMode {
    /// Parse a mode as written or as reported by the instrument.
    pub fn parse(mode: &str) -> Result<Self> {
        if mode.trim().eq_ignore_ascii_case("edge") {
            Ok(TriggerMode::Edge)
        } else {
            Err(ScopeError::UnsupportedMode(mode.trim().to_string()))
        }
    }

    /// Lower-case key prefix for mode-qualified fields.
    pub fn key(self) -> &'static str {
        match self {
            TriggerMode::Edge => "edge",
        }
    }
}

/// Edge trigger settings applied by [`Trigger::setup_edge`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct EdgeSetup {
    /// Trigger source, e.g. `channel2`
    pub source: Option<String>,
    /// Trigger level
    pub level: Option<String>,
    /// Input coupling
    pub coupling: Option<String>,
    /// Edge slope
    pub slope: Option<String>,
    /// Noise rejection filter
    pub reject: Option<String>,
}

/// Facade over `:TRIGger`.
pub struct Trigger {
    ns: SettingNamespace,
}

impl Trigger {
    /// Create the trigger facade over `link`.
    pub fn new(link: SharedLink, verbose: bool) -> Result<Self> {
        let ns = SettingNamespace::new(
            PREFIX,
            CommandTable::from_pairs(QUERIES),
            AllowList::from_pairs(WRITABLE),
            link,
            verbose,
        )?
        .with_directives(CommandTable::from_pairs(DIRECTIVES));
        Ok(Self { ns })
    }

    /// Underlying namespace.
    pub fn namespace(&self) -> &SettingNamespace {
        &self.ns
    }

    /// Underlying namespace, for generic reads and writes.
    pub fn namespace_mut(&mut self) -> &mut SettingNamespace {
        &mut self.ns
    }

    /// Current trigger mode as reported by the instrument.
    pub fn mode(&mut self) -> Result<String> {
        self.ns.get_field("Mode")
    }

    /// Select the trigger mode. Anything other than `EDGE` is unsupported.
    pub fn set_mode(&mut self, mode: &str) -> Result<()> {
        TriggerMode::parse(mode)?;
        self.ns.set_field("mode", mode, false)
    }

    fn routed_key(&mut self, field: &str) -> Result<String> {
        let mode = TriggerMode::parse(&self.mode()?)?;
        Ok(format!("{}:{}", mode.key(), field))
    }

    /// Set the trigger source for the current mode.
    pub fn set_source(&mut self, source: &str) -> Result<()> {
        let key = self.routed_key("source")?;
        self.ns.set_field(&key, source, false)
    }

    /// Set the trigger level for the current mode.
    pub fn set_level(&mut self, level: &str) -> Result<()> {
        let key = self.routed_key("level")?;
        self.ns.set_field(&key, level, false)
    }

    /// Set the slope for the current mode.
    pub fn set_slope(&mut self, slope: &str) -> Result<()> {
        let key = self.routed_key("slope")?;
        self.ns.set_field(&key, slope, false)
    }

    /// Set the input coupling for the current mode.
    pub fn set_coupling(&mut self, coupling: &str) -> Result<()> {
        let key = self.routed_key("coupling")?;
        self.ns.set_field(&key, coupling, false)
    }

    /// Set the noise-reject filter for the current mode.
    pub fn set_reject(&mut self, reject: &str) -> Result<()> {
        let key = self.routed_key("reject")?;
        self.ns.set_field(&key, reject, false)
    }

    /// Set the sweep mode (`auto` or `normal`).
    pub fn set_sweep(&mut self, sweep: &str) -> Result<()> {
        self.ns.set_field("sweep", sweep, false)
    }

    /// Issue a software trigger event.
    pub fn force(&mut self) -> Result<()> {
        self.ns.directive("force")
    }

    /// Switch to EDGE if needed and write every requested field that differs
    /// from the cached value, then refresh once.
    ///
    /// Writes are not atomic: a failure leaves earlier writes applied.
    pub fn setup_edge(&mut self, setup: &EdgeSetup) -> Result<()> {
        let current = self.ns.refresh_state(false)?.clone();

        let mut wrote = false;
        if TriggerMode::parse(current.get("Mode").unwrap_or_default()).is_err() {
            self.ns.set_field("mode", "EDGE", false)?;
            wrote = true;
        }

        let requested = [
            ("edge:source", "Edge:Source", &setup.source),
            ("edge:level", "Edge:Level", &setup.level),
            ("edge:coupling", "Edge:Coupling", &setup.coupling),
            ("edge:slope", "Edge:Slope", &setup.slope),
            ("edge:reject", "Edge:Reject", &setup.reject),
        ];
        for (key, display, value) in requested {
            if let Some(value) = value {
                if differs(current.get(display), value) {
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

    fn trigger() -> (Trigger, MockHandle) {
        let session = MockSession::new();
        let handle = session.handle();
        let link = InstrumentLink::new(Box::new(session), false).into_shared();
        (Trigger::new(link, false).unwrap(), handle)
    }

    #[test]
    fn source_is_routed_through_current_mode() {
        let (mut trigger, handle) = trigger();
        trigger.set_source("channel2").unwrap();
        assert_eq!(
            handle.writes(),
            vec![":TRIGger:EDGE:SOURCE channel2".to_string()]
        );
    }

    #[test]
    fn routing_reads_mode_once_per_cold_cache() {
        let (mut trigger, handle) = trigger();
        trigger.set_level("0.5").unwrap();
        assert_eq!(handle.setting_queries().len(), QUERIES.len());
        assert_eq!(
            handle.writes(),
            vec![":TRIGger:EDGE:LEVel 0.5".to_string()]
        );
    }

    #[test]
    fn unsupported_current_mode_blocks_routed_writes() {
        let (mut trigger, handle) = trigger();
        handle.set(":TRIGger:MODE", "GLIT");
        let err = trigger.set_slope("positive").unwrap_err();
        assert!(matches!(err, ScopeError::UnsupportedMode(ref m) if m == "GLIT"));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn only_edge_mode_can_be_selected() {
        let (mut trigger, handle) = trigger();
        let err = trigger.set_mode("pattern").unwrap_err();
        assert!(matches!(err, ScopeError::UnsupportedMode(_)));
        assert!(handle.transcript().is_empty());

        trigger.set_mode("EDGE").unwrap();
        assert_eq!(handle.writes(), vec![":TRIGger:MODE EDGE".to_string()]);
    }

    #[test]
    fn invalid_slope_is_rejected_before_write() {
        let (mut trigger, handle) = trigger();
        let err = trigger.set_slope("sideways").unwrap_err();
        assert!(matches!(err, ScopeError::InvalidValue { ref field, .. } if field == "edge:slope"));
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn force_sends_bare_directive_and_invalidates() {
        let (mut trigger, handle) = trigger();
        trigger.namespace_mut().refresh_state(false).unwrap();
        trigger.force().unwrap();
        assert_eq!(handle.writes(), vec![":TRIGger:FORCe".to_string()]);
        assert!(!trigger.namespace().is_fresh());
    }

    #[test]
    fn setup_edge_skips_unchanged_fields() {
        let (mut trigger, handle) = trigger();
        let setup = EdgeSetup {
            source: Some("CHAN1".into()),
            slope: Some("negative".into()),
            coupling: Some("dc".into()),
            ..Default::default()
        };
        trigger.setup_edge(&setup).unwrap();
        assert_eq!(
            handle.writes(),
            vec![":TRIGger:EDGE:SLOPE negative".to_string()]
        );
        assert!(trigger.namespace().is_fresh());
        assert_eq!(trigger.namespace_mut().get_field("Edge:Slope").unwrap(), "negative");
    }

    #[test]
    fn setup_edge_switches_mode_first() {
        let (mut trigger, handle) = trigger();
        handle.set(":TRIGger:MODE", "TV");
        trigger
            .setup_edge(&EdgeSetup {
                level: Some("1.2".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            handle.writes(),
            vec![
                ":TRIGger:MODE EDGE".to_string(),
                ":TRIGger:EDGE:LEVel 1.2".to_string()
            ]
        );
    }
}
