//! Generic setting namespace.
//!
//! A [`SettingNamespace`] is parametrised by a command prefix (`TRIGger`,
//! `CHANnel1`, ...), a [`CommandTable`] of readable settings and an [`AllowList`]
//! of writable fields. It provides:
//!
//! - cached read-all ([`SettingNamespace::refresh_state`]): a warm cache costs no I/O,
//!   a cold one costs exactly one query per command-table entry, in table order;
//! - single-field reads ([`SettingNamespace::get_field`]);
//! - validated single-field writes ([`SettingNamespace::set_field`]) that never touch
//!   the instrument when the field or value is rejected, and that invalidate the
//!   whole cache when they do.
//!
//! Tables are fixed at construction. Name lookups are ASCII case-insensitive.

use crate::error::{Result, ScopeError};
use crate::link::{self, SharedLink};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Ordered mapping from display name to SCPI suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    entries: Vec<(String, String)>,
}

impl CommandTable {
    /// Build a table from `(display name, suffix)` pairs, keeping their order.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(name, suffix)| (name.to_string(), suffix.to_string()))
                .collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, suffix)| (name.as_str(), suffix.as_str()))
    }

    /// Find an entry by display name, ignoring ASCII case.
    pub fn resolve(&self, name: &str) -> Option<(&str, &str)> {
        self.iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
    }

    fn first_duplicate(&self) -> Option<&str> {
        self.entries.iter().enumerate().find_map(|(i, (name, _))| {
            self.entries[..i]
                .iter()
                .any(|(earlier, _)| earlier.eq_ignore_ascii_case(name))
                .then_some(name.as_str())
        })
    }
}

/// Writable fields and the literal values each accepts.
///
/// Keys are stored lower-case. An empty value set accepts anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    fields: BTreeMap<String, Vec<String>>,
}

impl AllowList {
    /// Build an allow-list from `(field key, accepted values)` pairs.
    pub fn from_pairs(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(key, values)| {
                    (
                        key.to_ascii_lowercase(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Accepted values for `key` (already lower-cased), if it is writable.
    pub fn allowed(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// Writable field keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Last observed value of every setting in a namespace, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceState {
    values: Vec<(String, String)>,
}

impl NamespaceState {
    /// Value of `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `(display name, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of settings held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no settings are held.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for NamespaceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Cached, validated view of one SCPI subsystem.
pub struct SettingNamespace {
    prefix: String,
    commands: CommandTable,
    allow: AllowList,
    directives: CommandTable,
    state: NamespaceState,
    fresh: bool,
    writes: u64,
    verbose: bool,
    link: SharedLink,
}

impl SettingNamespace {
    /// Create a namespace over `link`.
    ///
    /// Fails with `InvalidTable` if the command table repeats a name or an
    /// allow-list key has no command-table entry to resolve to.
    pub fn new(
        prefix: impl Into<String>,
        commands: CommandTable,
        allow: AllowList,
        link: SharedLink,
        verbose: bool,
    ) -> Result<Self> {
        let prefix = prefix.into();
        if let Some(name) = commands.first_duplicate() {
            return Err(ScopeError::InvalidTable(format!(
                "{prefix}: duplicate setting '{name}'"
            )));
        }
        if let Some(key) = allow.keys().find(|key| commands.resolve(key).is_none()) {
            return Err(ScopeError::InvalidTable(format!(
                "{prefix}: writable field '{key}' has no command"
            )));
        }

        Ok(Self {
            prefix,
            commands,
            allow,
            directives: CommandTable::default(),
            state: NamespaceState::default(),
            fresh: false,
            writes: 0,
            verbose,
            link,
        })
    }

    /// Attach write-only actions (e.g. `force` → `FORCe`) invoked through
    /// [`directive`](Self::directive).
    pub fn with_directives(mut self, directives: CommandTable) -> Self {
        self.directives = directives;
        self
    }

    /// Command prefix, without the leading colon.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Readable settings.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Writable fields.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Whether the cache still equals what a fresh read-all would return.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Number of writes and directives attempted through this namespace.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Mark the cache stale so the next read re-queries everything.
    pub fn invalidate(&mut self) {
        self.fresh = false;
    }

    /// Whether per-setting results are logged at `info` level.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Enable or disable verbose logging of read results.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Shared link this namespace talks through.
    pub fn link(&self) -> &SharedLink {
        &self.link
    }

    fn path(&self, suffix: &str) -> String {
        format!(":{}:{}", self.prefix, suffix)
    }

    /// Return every setting, querying the instrument unless the cache is fresh.
    ///
    /// With `force_if_fresh` the instrument is queried even on a warm cache. A
    /// failed refresh leaves the previous state in place and the cache stale.
    pub fn refresh_state(&mut self, force_if_fresh: bool) -> Result<&NamespaceState> {
        if self.fresh && !force_if_fresh {
            return Ok(&self.state);
        }

        let mut values = Vec::with_capacity(self.commands.len());
        {
            let mut link = link::lock(&self.link)?;
            for (name, suffix) in self.commands.iter() {
                let value = link.query(&self.path(suffix))?;
                io_event!(
                    self.verbose,
                    namespace = %self.prefix,
                    setting = name,
                    value = %value,
                    "Got setting"
                );
                values.push((name.to_string(), value));
            }
        }

        self.state = NamespaceState { values };
        self.fresh = true;
        Ok(&self.state)
    }

    /// Current value of setting `name`.
    pub fn get_field(&mut self, name: &str) -> Result<String> {
        let (display, _) = self
            .commands
            .resolve(name)
            .ok_or_else(|| ScopeError::UnknownSetting {
                namespace: self.prefix.clone(),
                name: name.to_string(),
            })?;
        let display = display.to_string();

        let value = self.refresh_state(false)?.get(&display).map(str::to_string);
        value.ok_or_else(|| ScopeError::UnknownSetting {
            namespace: self.prefix.clone(),
            name: display,
        })
    }

    /// Validate and transmit `:PREFIX:SUFFIX value`.
    ///
    /// The key is lower-cased; it must be in the allow-list, and `value` must be
    /// in its allow-set unless that set is empty. Rejections happen before any
    /// I/O. An empty `value` sends the bare header. The cache is invalidated
    /// whether or not the instrument accepts the write.
    pub fn set_field(&mut self, key: &str, value: &str, refresh_after: bool) -> Result<()> {
        let key = key.to_ascii_lowercase();
        let allowed = self
            .allow
            .allowed(&key)
            .ok_or_else(|| ScopeError::UnknownWritableField {
                namespace: self.prefix.clone(),
                key: key.clone(),
            })?;

        if !allowed.is_empty() && !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
            return Err(ScopeError::InvalidValue {
                field: key,
                value: value.to_string(),
                allowed: allowed.to_vec(),
            });
        }

        let (_, suffix) =
            self.commands
                .resolve(&key)
                .ok_or_else(|| ScopeError::UnknownSetting {
                    namespace: self.prefix.clone(),
                    name: key.clone(),
                })?;
        let command = if value.is_empty() {
            self.path(suffix)
        } else {
            format!("{} {}", self.path(suffix), value)
        };

        self.fresh = false;
        self.writes += 1;
        link::lock(&self.link)?.command(&command)?;

        if refresh_after {
            self.refresh_state(true)?;
        }
        Ok(())
    }

    /// Transmit the write-only action `name` from the directive table.
    pub fn directive(&mut self, name: &str) -> Result<()> {
        let (_, suffix) =
            self.directives
                .resolve(name)
                .ok_or_else(|| ScopeError::UnknownSetting {
                    namespace: self.prefix.clone(),
                    name: name.to_string(),
                })?;
        let command = self.path(suffix);

        self.fresh = false;
        self.writes += 1;
        link::lock(&self.link)?.command(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::InstrumentLink;
    use crate::session::{MockHandle, MockSession};

    fn shared_link() -> (SharedLink, MockHandle) {
        let session = MockSession::new();
        let handle = session.handle();
        (InstrumentLink::new(Box::new(session), false).into_shared(), handle)
    }

    fn scale_namespace() -> (SettingNamespace, MockHandle) {
        let (link, handle) = shared_link();
        let ns = SettingNamespace::new(
            "CHANnel1",
            CommandTable::from_pairs(&[("Scale", "SCALe"), ("Offset", "OFFSet")]),
            AllowList::from_pairs(&[("scale", &[]), ("offset", &[])]),
            link,
            false,
        )
        .unwrap();
        (ns, handle)
    }

    #[test]
    fn set_field_transmits_prefixed_command_and_goes_stale() {
        let (mut ns, handle) = scale_namespace();
        ns.refresh_state(false).unwrap();
        assert!(ns.is_fresh());

        ns.set_field("scale", "3.00", false).unwrap();
        assert_eq!(handle.writes(), vec![":CHANnel1:SCALe 3.00".to_string()]);
        assert!(!ns.is_fresh());
    }

    #[test]
    fn key_resolution_ignores_case() {
        let (mut upper, upper_handle) = scale_namespace();
        let (mut lower, lower_handle) = scale_namespace();
        upper.set_field("SCALE", "0.5", false).unwrap();
        lower.set_field("scale", "0.5", false).unwrap();
        assert_eq!(upper_handle.writes(), lower_handle.writes());
    }

    #[test]
    fn warm_cache_costs_no_io() {
        let (mut ns, handle) = scale_namespace();
        ns.refresh_state(false).unwrap();
        let after_first = handle.transcript().len();
        assert_eq!(handle.setting_queries().len(), 2);

        ns.refresh_state(false).unwrap();
        ns.get_field("Offset").unwrap();
        assert_eq!(handle.transcript().len(), after_first);
    }

    #[test]
    fn forced_refresh_requeries_warm_cache() {
        let (mut ns, handle) = scale_namespace();
        ns.refresh_state(false).unwrap();
        ns.refresh_state(true).unwrap();
        assert_eq!(handle.setting_queries().len(), 4);
    }

    #[test]
    fn refresh_after_write_rebuilds_state() {
        let (mut ns, handle) = scale_namespace();
        ns.set_field("scale", "2.00", true).unwrap();
        assert!(ns.is_fresh());
        assert_eq!(ns.get_field("Scale").unwrap(), "2.00");
        assert_eq!(handle.setting_queries().len(), 2);
    }

    #[test]
    fn unknown_setting_is_rejected_without_io() {
        let (mut ns, handle) = scale_namespace();
        let err = ns.get_field("Bandwidth").unwrap_err();
        assert!(matches!(err, ScopeError::UnknownSetting { .. }));
        assert!(handle.transcript().is_empty());
    }

    #[test]
    fn restricted_values_are_checked_before_io() {
        let (link, handle) = shared_link();
        let mut ns = SettingNamespace::new(
            "TRIGger",
            CommandTable::from_pairs(&[("Sweep", "SWEep")]),
            AllowList::from_pairs(&[("sweep", &["auto", "normal"])]),
            link,
            false,
        )
        .unwrap();

        let err = ns.set_field("sweep", "single", false).unwrap_err();
        assert!(matches!(err, ScopeError::InvalidValue { .. }));
        let err = ns.set_field("holdoff", "1e-6", false).unwrap_err();
        assert!(matches!(err, ScopeError::UnknownWritableField { .. }));
        assert!(handle.transcript().is_empty());

        ns.set_field("sweep", "NORMAL", false).unwrap();
        assert_eq!(handle.writes(), vec![":TRIGger:SWEep NORMAL".to_string()]);
    }

    #[test]
    fn failed_write_still_invalidates() {
        let (mut ns, handle) = scale_namespace();
        ns.refresh_state(false).unwrap();
        handle.push_error("-222,\"Data out of range\"");
        assert!(ns.set_field("scale", "900", false).is_err());
        assert!(!ns.is_fresh());
    }

    #[test]
    fn failed_refresh_keeps_previous_state() {
        let (mut ns, handle) = scale_namespace();
        ns.refresh_state(false).unwrap();
        let before = ns.refresh_state(false).unwrap().clone();

        ns.invalidate();
        handle.push_error("+0,\"No error\"");
        handle.push_error("-100,\"Command error\"");
        assert!(ns.refresh_state(false).is_err());
        assert!(!ns.is_fresh());
        assert_eq!(ns.state, before);
    }

    #[test]
    fn directives_send_bare_header() {
        let (link, handle) = shared_link();
        let mut ns = SettingNamespace::new(
            "TRIGger",
            CommandTable::from_pairs(&[("Mode", "MODE")]),
            AllowList::default(),
            link,
            false,
        )
        .unwrap()
        .with_directives(CommandTable::from_pairs(&[("force", "FORCe")]));

        ns.directive("Force").unwrap();
        assert_eq!(handle.writes(), vec![":TRIGger:FORCe".to_string()]);
        assert!(matches!(
            ns.directive("reset"),
            Err(ScopeError::UnknownSetting { .. })
        ));
    }

    #[test]
    fn inconsistent_tables_are_rejected() {
        let (link, _) = shared_link();
        let dup = SettingNamespace::new(
            "TIMebase",
            CommandTable::from_pairs(&[("Scale", "SCALe"), ("scale", "SCALe")]),
            AllowList::default(),
            link.clone(),
            false,
        );
        assert!(matches!(dup, Err(ScopeError::InvalidTable(_))));

        let orphan = SettingNamespace::new(
            "TIMebase",
            CommandTable::from_pairs(&[("Scale", "SCALe")]),
            AllowList::from_pairs(&[("position", &[])]),
            link,
            false,
        );
        assert!(matches!(orphan, Err(ScopeError::InvalidTable(_))));
    }

    #[test]
    fn write_count_ignores_reads_and_rejections() {
        let (mut ns, _) = scale_namespace();
        ns.refresh_state(true).unwrap();
        ns.get_field("Scale").unwrap();
        assert!(ns.set_field("bandwidth", "on", false).is_err());
        assert_eq!(ns.write_count(), 0);

        ns.set_field("offset", "0.1", false).unwrap();
        assert_eq!(ns.write_count(), 1);
    }

    #[test]
    fn state_serializes_in_table_order() {
        let (mut ns, _) = scale_namespace();
        let state = ns.refresh_state(false).unwrap();
        let json = serde_json::to_string(state).unwrap();
        assert!(json.find("Scale").unwrap() < json.find("Offset").unwrap());
    }
}
