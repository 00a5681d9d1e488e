//! Instrument controller.
//!
//! [`Oscilloscope`] owns one [`InstrumentLink`] and one facade per subsystem,
//! all sharing the link. Orchestration that spans facades (capture, autoscale)
//! lives here.

use crate::config::ScopeConfig;
use crate::error::{Result, ScopeError};
use crate::link::{self, InstrumentLink, SharedLink};
use crate::namespace::SettingNamespace;
use crate::session::{self, MockSession, Session};
use crate::subsystems::{Channel, ChannelId, Timebase, Trigger, Waveform, WaveformFormat};
use serde::Serialize;
use tracing::{info, instrument};

/// Construction options for [`Oscilloscope`].
#[derive(Debug, Clone)]
pub struct ScopeOptions {
    /// Log every transmitted command and result at `info`
    pub verbose: bool,
    /// Run [`Waveform::default_setup`] during construction
    pub default_setup: bool,
    /// Points requested by each capture
    pub capture_points: u32,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            default_setup: true,
            capture_points: crate::subsystems::waveform::DEFAULT_POINTS,
        }
    }
}

impl From<&ScopeConfig> for ScopeOptions {
    fn from(config: &ScopeConfig) -> Self {
        Self {
            verbose: config.instrument.verbose,
            default_setup: config.capture.default_setup,
            capture_points: config.capture.points,
        }
    }
}

/// One captured record, converted to physical units.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    /// Source channel
    #[serde(serialize_with = "serialize_channel")]
    pub channel: ChannelId,
    /// Sample times in seconds
    pub times: Vec<f64>,
    /// Sample voltages
    pub volts: Vec<f64>,
}

fn serialize_channel<S: serde::Serializer>(
    channel: &ChannelId,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(channel)
}

impl Trace {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.volts.len()
    }

    /// Whether the record holds no samples.
    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }
}

/// A connected oscilloscope.
pub struct Oscilloscope {
    link: SharedLink,
    channels: Vec<Channel>,
    trigger: Trigger,
    timebase: Timebase,
    waveform: Waveform,
    options: ScopeOptions,
}

impl Oscilloscope {
    /// Take ownership of an open session and build every facade over it.
    pub fn new(session: Box<dyn Session>, options: ScopeOptions) -> Result<Self> {
        let resource = session.resource().to_string();
        let link = InstrumentLink::new(session, options.verbose).into_shared();
        let verbose = options.verbose;

        let channels = ChannelId::ALL
            .iter()
            .map(|id| Channel::new(link.clone(), *id, verbose))
            .collect::<Result<Vec<_>>>()?;
        let mut scope = Self {
            trigger: Trigger::new(link.clone(), verbose)?,
            timebase: Timebase::new(link.clone(), verbose)?,
            waveform: Waveform::new(link.clone(), verbose)?,
            channels,
            link,
            options,
        };

        if scope.options.default_setup {
            scope.waveform.default_setup()?;
        }
        info!(resource = %resource, "Oscilloscope ready");
        Ok(scope)
    }

    /// Open the instrument named by `config` (or the simulator when
    /// `instrument.mock` is set) and build the controller.
    pub fn open(config: &ScopeConfig) -> Result<Self> {
        let session: Box<dyn Session> = if config.instrument.mock {
            Box::new(MockSession::new())
        } else {
            let resource = config.instrument.resource.as_deref().ok_or_else(|| {
                ScopeError::ResourceUnavailable {
                    resource: String::new(),
                    reason: "no instrument resource configured".into(),
                }
            })?;
            session::open_session(resource, config.instrument.timeout)?
        };
        Self::new(session, ScopeOptions::from(config))
    }

    fn ensure_open(&self) -> Result<()> {
        if link::lock(&self.link)?.is_closed() {
            Err(ScopeError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Shared link, for callers that need raw SCPI access.
    pub fn link(&self) -> &SharedLink {
        &self.link
    }

    /// Options the controller was built with.
    pub fn options(&self) -> &ScopeOptions {
        &self.options
    }

    /// Trigger facade.
    pub fn trigger(&mut self) -> Result<&mut Trigger> {
        self.ensure_open()?;
        Ok(&mut self.trigger)
    }

    /// Timebase facade.
    pub fn timebase(&mut self) -> Result<&mut Timebase> {
        self.ensure_open()?;
        Ok(&mut self.timebase)
    }

    /// Waveform facade.
    pub fn waveform(&mut self) -> Result<&mut Waveform> {
        self.ensure_open()?;
        Ok(&mut self.waveform)
    }

    /// Facade for channel `id`.
    pub fn channel(&mut self, id: ChannelId) -> Result<&mut Channel> {
        self.ensure_open()?;
        Ok(&mut self.channels[id.index()])
    }

    /// Namespace by subsystem name: `trigger`, `timebase`, `waveform` or
    /// `channel1`..`channel4`, ignoring case.
    pub fn subsystem(&mut self, name: &str) -> Result<&mut SettingNamespace> {
        self.ensure_open()?;
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "trigger" => Ok(self.trigger.namespace_mut()),
            "timebase" => Ok(self.timebase.namespace_mut()),
            "waveform" => Ok(self.waveform.namespace_mut()),
            _ if lower.starts_with("channel") => {
                let id: ChannelId = lower.parse()?;
                Ok(self.channels[id.index()].namespace_mut())
            }
            _ => Err(ScopeError::UnknownSetting {
                namespace: "scope".into(),
                name: name.to_string(),
            }),
        }
    }

    /// Every subsystem namespace, channels first.
    pub fn subsystems(&mut self) -> Result<Vec<&mut SettingNamespace>> {
        self.ensure_open()?;
        let mut all: Vec<&mut SettingNamespace> = self
            .channels
            .iter_mut()
            .map(Channel::namespace_mut)
            .collect();
        all.push(self.trigger.namespace_mut());
        all.push(self.timebase.namespace_mut());
        all.push(self.waveform.namespace_mut());
        Ok(all)
    }

    /// `*IDN?` reply.
    pub fn identify(&mut self) -> Result<String> {
        link::lock(&self.link)?.query("*IDN")
    }

    /// Issue a software trigger.
    pub fn force_trigger(&mut self) -> Result<()> {
        self.trigger()?.force()
    }

    /// Run the instrument's autoscale. Every cached setting is stale afterwards.
    pub fn autoscale(&mut self) -> Result<()> {
        self.ensure_open()?;
        for channel in &mut self.channels {
            channel.namespace_mut().invalidate();
        }
        self.trigger.namespace_mut().invalidate();
        self.timebase.namespace_mut().invalidate();
        self.waveform.invalidate();
        link::lock(&self.link)?.command(":AUToscale")
    }

    /// Capture one record from `source` (`channel1`..`channel4`) and return
    /// the decoded samples.
    ///
    /// BYTE and WORD formats yield raw codes; ASCII yields volts.
    #[instrument(skip(self), err)]
    pub fn capture_waveform(&mut self, source: &str) -> Result<Vec<f64>> {
        let channel: ChannelId = source.parse()?;
        self.ensure_open()?;

        let points = self.options.capture_points;
        self.waveform.set_source(channel)?;
        self.waveform.set_points(points)?;
        let samples = self.waveform.fetch_samples()?;

        info!(source = %channel, samples = samples.len(), "Captured waveform");
        Ok(samples)
    }

    /// Capture one record and convert it to seconds and volts using the preamble.
    pub fn capture_trace(&mut self, source: &str) -> Result<Trace> {
        let channel: ChannelId = source.parse()?;
        let samples = self.capture_waveform(source)?;
        let preamble = self.waveform.preamble()?;

        let volts = match self.waveform.format()? {
            WaveformFormat::Ascii => samples,
            WaveformFormat::Byte | WaveformFormat::Word => {
                samples.iter().map(|code| preamble.voltage(*code)).collect()
            }
        };
        let times = (0..volts.len()).map(|i| preamble.time(i)).collect();
        Ok(Trace {
            channel,
            times,
            volts,
        })
    }

    /// Whether I/O events are logged at `info`.
    pub fn is_verbose(&self) -> bool {
        self.options.verbose
    }

    /// Propagate the verbosity flag to the link and every facade.
    pub fn set_verbosity(&mut self, verbose: bool) -> Result<()> {
        self.options.verbose = verbose;
        link::lock(&self.link)?.set_verbose(verbose);
        for channel in &mut self.channels {
            channel.set_verbose(verbose);
        }
        self.trigger.set_verbose(verbose);
        self.timebase.set_verbose(verbose);
        self.waveform.set_verbose(verbose);
        Ok(())
    }

    /// Release the session. Every later operation fails with `SessionClosed`.
    pub fn close(&mut self) -> Result<()> {
        link::lock(&self.link)?.close()
    }
}
