//! `:TIMebase` subsystem.

use super::{differs, ON_OFF};
use crate::error::{Result, ScopeError};
use crate::link::SharedLink;
use crate::namespace::{AllowList, CommandTable, SettingNamespace};

/// Command prefix
pub const PREFIX: &str = "TIMebase";

const QUERIES: &[(&str, &str)] = &[
    ("Mode", "MODE"),
    ("Position", "POSition"),
    ("Range", "RANGe"),
    ("Ref Clock", "REFClock"),
    ("Reference", "REFerence"),
    ("Reference:Location", "REFerence:LOCation"),
    ("Scale", "SCALe"),
    ("Vernier", "VERNier"),
    ("Window:Position", "WINDow:POSition"),
    ("Window:Range", "WINDow:RANGe"),
    ("Window:Scale", "WINDow:SCALe"),
];

const WRITABLE: &[(&str, &[&str])] = &[
    ("mode", &["main", "window", "xy", "roll"]),
    ("position", &[]),
    ("range", &[]),
    ("ref clock", ON_OFF),
    ("reference", &["left", "center", "right", "custom"]),
    ("reference:location", &[]),
    ("scale", &[]),
    ("vernier", ON_OFF),
    ("window:position", &[]),
    ("window:range", &[]),
    ("window:scale", &[]),
];

/// Horizontal reference point on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimebaseReference {
    /// One graticule from the left edge
    Left,
    /// Screen center
    Center,
    /// One graticule from the right edge
    Right,
    /// Fraction of the screen width from the left, in `[0, 1]`
    Custom(f64),
}

impl TimebaseReference {
    /// Build a reference from a mode keyword and, for `custom`, a location.
    pub fn parse(mode: &str, location: Option<f64>) -> Result<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            "custom" => {
                let location = location.ok_or_else(|| ScopeError::InvalidValue {
                    field: "reference:location".into(),
                    value: String::new(),
                    allowed: vec!["0.0..=1.0".into()],
                })?;
                Self::Custom(location).validated()
            }
            _ => Err(ScopeError::InvalidValue {
                field: "reference".into(),
                value: mode.to_string(),
                allowed: ["left", "center", "right", "custom"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }

    fn validated(self) -> Result<Self> {
        match self {
            Self::Custom(location) if !(0.0..=1.0).contains(&location) => {
                Err(ScopeError::InvalidValue {
                    field: "reference:location".into(),
                    value: location.to_string(),
                    allowed: vec!["0.0..=1.0".into()],
                })
            }
            other => Ok(other),
        }
    }

    /// Whether the instrument already reports this reference. `reference` may be
    /// the short or long keyword form; a custom reference compares `location`.
    fn matches(self, reference: Option<&str>, location: Option<&str>) -> bool {
        match self {
            Self::Custom(wanted) => location
                .and_then(|l| l.trim().parse::<f64>().ok())
                .is_some_and(|current| (current - wanted).abs() < 1e-9),
            fixed => reference.is_some_and(|r| {
                let long = fixed.keyword();
                let short: String = long.chars().filter(char::is_ascii_uppercase).collect();
                r.trim().eq_ignore_ascii_case(long) || r.trim().eq_ignore_ascii_case(&short)
            }),
        }
    }

    /// Keyword written to `:TIMebase:REFerence`.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Center => "CENTer",
            Self::Right => "RIGHt",
            Self::Custom(_) => "CUSTom",
        }
    }
}

/// Horizontal settings applied by [`Timebase::setup`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TimebaseSetup {
    /// Seconds per division
    pub scale: Option<String>,
    /// Trigger-to-reference delay in seconds
    pub position: Option<String>,
    /// Reference point
    pub reference: Option<TimebaseReference>,
}

/// Facade over `:TIMebase`.
pub struct Timebase {
    ns: SettingNamespace,
}

impl Timebase {
    /// Create the timebase facade over `link`.
    pub fn new(link: SharedLink, verbose: bool) -> Result<Self> {
        let ns = SettingNamespace::new(
            PREFIX,
            CommandTable::from_pairs(QUERIES),
            AllowList::from_pairs(WRITABLE),
            link,
            verbose,
        )?;
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

    /// Seconds per division.
    pub fn set_scale(&mut self, scale: &str) -> Result<()> {
        self.ns.set_field("scale", scale, false)
    }

    /// Delay from the trigger event to the reference point.
    pub fn set_position(&mut self, position: &str) -> Result<()> {
        self.ns.set_field("position", position, false)
    }

    /// `main`, `window`, `xy` or `roll`.
    pub fn set_mode(&mut self, mode: &str) -> Result<()> {
        self.ns.set_field("mode", mode, false)
    }

    /// Move the reference point. A custom location goes to
    /// `reference:location` instead of `reference`, and must lie in `[0, 1]`.
    pub fn set_reference(&mut self, reference: TimebaseReference) -> Result<()> {
        match reference.validated()? {
            TimebaseReference::Custom(location) => {
                self.ns
                    .set_field("reference:location", &location.to_string(), false)
            }
            fixed => self.ns.set_field("reference", fixed.keyword(), false),
        }
    }

    /// Write every requested field that differs from the cached value, then
    /// re-read the timebase once if anything was written.
    pub fn setup(&mut self, setup: &TimebaseSetup) -> Result<()> {
        let reference = setup.reference.map(TimebaseReference::validated).transpose()?;
        let current = self.ns.refresh_state(false)?.clone();

        let mut wrote = false;
        if let Some(scale) = &setup.scale {
            if differs(current.get("Scale"), scale) {
                self.set_scale(scale)?;
                wrote = true;
            }
        }
        if let Some(position) = &setup.position {
            if differs(current.get("Position"), position) {
                self.set_position(position)?;
                wrote = true;
            }
        }
        if let Some(reference) = reference {
            if !reference.matches(current.get("Reference"), current.get("Reference:Location")) {
                self.set_reference(reference)?;
                wrote = true;
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
