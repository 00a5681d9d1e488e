//! `:WAVeform` subsystem: transfer settings, preamble and sample data.
//!
//! The facade remembers the sample encoding it last wrote (format and byte
//! order) so a capture can decode the payload without re-reading settings.
//! When the encoding is unknown, or another caller wrote through the
//! namespace since, it is read back from the instrument once.

use super::{ChannelId, ON_OFF};
use crate::error::{Result, ScopeError};
use crate::link::{self, SharedLink};
use crate::namespace::{AllowList, CommandTable, SettingNamespace};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Command prefix
pub const PREFIX: &str = "WAVeform";

const DATA_QUERY: &str = ":WAVeform:DATA";
const PREAMBLE_QUERY: &str = ":WAVeform:PREamble";

const QUERIES: &[(&str, &str)] = &[
    ("Byte Order", "BYTeorder"),
    ("Count", "COUNt"),
    ("Format", "FORMat"),
    ("Points", "POINts"),
    ("Points:Mode", "POINts:MODE"),
    ("Source", "SOURce"),
    ("Type", "TYPE"),
    ("Unsigned", "UNSigned"),
    ("X Increment", "XINCrement"),
    ("X Origin", "XORigin"),
    ("X Reference", "XREFerence"),
    ("Y Increment", "YINCrement"),
    ("Y Origin", "YORigin"),
    ("Y Reference", "YREFerence"),
];

const WRITABLE: &[(&str, &[&str])] = &[
    ("byte order", &["lsbfirst", "msbfirst"]),
    ("format", &["word", "byte", "ascii"]),
    ("points", &[]),
    ("points:mode", &["normal", "maximum", "raw"]),
    (
        "source",
        &[
            "channel1", "channel2", "channel3", "channel4", "function", "math", "fft", "wmemory1",
            "wmemory2",
        ],
    ),
    ("unsigned", ON_OFF),
];

/// Points requested by [`Waveform::default_setup`].
pub const DEFAULT_POINTS: u32 = 10240;

/// Sample encoding of `:WAVeform:DATA?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformFormat {
    /// One unsigned byte per sample
    Byte,
    /// Two bytes per sample, order set by [`ByteOrder`]
    Word,
    /// Comma-separated voltages
    Ascii,
}

impl WaveformFormat {
    /// Value accepted by the `format` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Word => "word",
            Self::Ascii => "ascii",
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Byte),
            1 => Some(Self::Word),
            4 => Some(Self::Ascii),
            _ => None,
        }
    }
}

impl FromStr for WaveformFormat {
    type Err = ScopeError;

    /// Accepts long and short forms, e.g. `ASCii`, `ASC`, `byte`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BYTE" => Ok(Self::Byte),
            "WORD" => Ok(Self::Word),
            "ASC" | "ASCII" => Ok(Self::Ascii),
            _ => Err(ScopeError::InvalidValue {
                field: "format".into(),
                value: s.to_string(),
                allowed: vec!["word".into(), "byte".into(), "ascii".into()],
            }),
        }
    }
}

impl fmt::Display for WaveformFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte order of WORD samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Most significant byte first (instrument default)
    #[default]
    MsbFirst,
    /// Least significant byte first
    LsbFirst,
}

impl ByteOrder {
    /// Value accepted by the `byte order` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MsbFirst => "msbfirst",
            Self::LsbFirst => "lsbfirst",
        }
    }
}

impl FromStr for ByteOrder {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MSBF" | "MSBFIRST" => Ok(Self::MsbFirst),
            "LSBF" | "LSBFIRST" => Ok(Self::LsbFirst),
            _ => Err(ScopeError::InvalidValue {
                field: "byte order".into(),
                value: s.to_string(),
                allowed: vec!["lsbfirst".into(), "msbfirst".into()],
            }),
        }
    }
}

/// Scaling information returned by `:WAVeform:PREamble?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
    /// Encoding of the data that follows
    pub format: WaveformFormat,
    /// Acquisition type code (normal, peak, average, high-res)
    pub acquisition_type: u32,
    /// Points in the record
    pub points: u32,
    /// Averages, or 1
    pub count: u32,
    /// Seconds between samples
    pub x_increment: f64,
    /// Time of the first sample
    pub x_origin: f64,
    /// Sample index of `x_origin`
    pub x_reference: f64,
    /// Volts per code
    pub y_increment: f64,
    /// Voltage at `y_reference`
    pub y_origin: f64,
    /// Code at the vertical center
    pub y_reference: f64,
}

impl Preamble {
    /// Parse the ten comma-separated preamble fields.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || ScopeError::MalformedResponse {
            command: format!("{PREAMBLE_QUERY}?"),
            response: text.to_string(),
        };
        let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
        if fields.len() != 10 {
            return Err(malformed());
        }
        let int = |i: usize| -> Result<u32> {
            fields[i]
                .trim_start_matches('+')
                .parse()
                .map_err(|_| malformed())
        };
        let real = |i: usize| -> Result<f64> { fields[i].parse().map_err(|_| malformed()) };

        Ok(Self {
            format: WaveformFormat::from_code(int(0)?).ok_or_else(malformed)?,
            acquisition_type: int(1)?,
            points: int(2)?,
            count: int(3)?,
            x_increment: real(4)?,
            x_origin: real(5)?,
            x_reference: real(6)?,
            y_increment: real(7)?,
            y_origin: real(8)?,
            y_reference: real(9)?,
        })
    }

    /// Voltage for a raw sample code.
    pub fn voltage(&self, code: f64) -> f64 {
        (code - self.y_reference) * self.y_increment + self.y_origin
    }

    /// Time of the sample at `index`.
    pub fn time(&self, index: usize) -> f64 {
        (index as f64 - self.x_reference) * self.x_increment + self.x_origin
    }
}

/// Decode a `:WAVeform:DATA?` payload into one value per sample.
///
/// BYTE and WORD yield raw codes; ASCII yields the voltages as sent.
pub fn decode_samples(
    payload: &[u8],
    format: WaveformFormat,
    order: ByteOrder,
) -> Result<Vec<f64>> {
    let malformed = |detail: &str| ScopeError::MalformedResponse {
        command: format!("{DATA_QUERY}?"),
        response: detail.to_string(),
    };
    match format {
        WaveformFormat::Byte => Ok(payload.iter().map(|b| f64::from(*b)).collect()),
        WaveformFormat::Word => {
            if payload.len() % 2 != 0 {
                return Err(malformed(&format!(
                    "{} bytes is not a whole number of WORD samples",
                    payload.len()
                )));
            }
            Ok(payload
                .chunks_exact(2)
                .map(|pair| {
                    let bytes = [pair[0], pair[1]];
                    f64::from(match order {
                        ByteOrder::MsbFirst => u16::from_be_bytes(bytes),
                        ByteOrder::LsbFirst => u16::from_le_bytes(bytes),
                    })
                })
                .collect())
        }
        WaveformFormat::Ascii => {
            let text = std::str::from_utf8(payload)
                .map_err(|_| malformed("ASCII payload is not UTF-8"))?;
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f64>().map_err(|_| malformed(s)))
                .collect()
        }
    }
}

/// Facade over `:WAVeform`.
pub struct Waveform {
    ns: SettingNamespace,
    format: Option<WaveformFormat>,
    byte_order: Option<ByteOrder>,
    /// Namespace write count after this facade's last write.
    synced_writes: u64,
}

impl Waveform {
    /// Create the waveform facade over `link`.
    pub fn new(link: SharedLink, verbose: bool) -> Result<Self> {
        let ns = SettingNamespace::new(
            PREFIX,
            CommandTable::from_pairs(QUERIES),
            AllowList::from_pairs(WRITABLE),
            link,
            verbose,
        )?;
        Ok(Self {
            ns,
            format: None,
            byte_order: None,
            synced_writes: 0,
        })
    }

    /// Underlying namespace.
    pub fn namespace(&self) -> &SettingNamespace {
        &self.ns
    }

    /// Underlying namespace, for generic reads and writes.
    ///
    /// Any write made this way makes the facade re-read the encoding before
    /// the next decode. Reads keep it.
    pub fn namespace_mut(&mut self) -> &mut SettingNamespace {
        &mut self.ns
    }

    fn sync_tracking(&mut self) {
        if self.ns.write_count() != self.synced_writes {
            self.format = None;
            self.byte_order = None;
            self.synced_writes = self.ns.write_count();
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.sync_tracking();
        let result = self.ns.set_field(key, value, false);
        self.synced_writes = self.ns.write_count();
        result
    }

    /// Mark cached settings stale. The tracked encoding is kept.
    pub fn invalidate(&mut self) {
        self.ns.invalidate();
    }

    /// Pin raw points mode, [`DEFAULT_POINTS`] points, channel 1 and BYTE format.
    pub fn default_setup(&mut self) -> Result<()> {
        self.set_points_mode("raw")?;
        self.set_points(DEFAULT_POINTS)?;
        self.set_source(ChannelId::ALL[0])?;
        self.set_format(WaveformFormat::Byte)
    }

    /// Channel whose data is transferred.
    pub fn set_source(&mut self, channel: ChannelId) -> Result<()> {
        self.write("source", &channel.to_string())
    }

    /// Number of points to transfer.
    pub fn set_points(&mut self, points: u32) -> Result<()> {
        self.write("points", &points.to_string())
    }

    /// `normal`, `maximum` or `raw`.
    pub fn set_points_mode(&mut self, mode: &str) -> Result<()> {
        self.write("points:mode", mode)
    }

    /// Sample encoding.
    pub fn set_format(&mut self, format: WaveformFormat) -> Result<()> {
        self.format = None;
        self.write("format", format.as_str())?;
        self.format = Some(format);
        Ok(())
    }

    /// Byte order for WORD samples.
    pub fn set_byte_order(&mut self, order: ByteOrder) -> Result<()> {
        self.byte_order = None;
        self.write("byte order", order.as_str())?;
        self.byte_order = Some(order);
        Ok(())
    }

    /// Current sample encoding, read from the instrument if not yet known.
    pub fn format(&mut self) -> Result<WaveformFormat> {
        self.sync_tracking();
        match self.format {
            Some(format) => Ok(format),
            None => {
                let format = self.ns.get_field("Format")?.parse()?;
                self.format = Some(format);
                Ok(format)
            }
        }
    }

    /// Current WORD byte order, read from the instrument if not yet known.
    pub fn byte_order(&mut self) -> Result<ByteOrder> {
        self.sync_tracking();
        match self.byte_order {
            Some(order) => Ok(order),
            None => {
                let order = self.ns.get_field("Byte Order")?.parse()?;
                self.byte_order = Some(order);
                Ok(order)
            }
        }
    }

    /// Read and parse `:WAVeform:PREamble?`.
    pub fn preamble(&mut self) -> Result<Preamble> {
        let text = link::lock(self.ns.link())?.query(PREAMBLE_QUERY)?;
        Preamble::parse(&text)
    }

    /// Raw `:WAVeform:DATA?` payload.
    pub fn fetch_data(&mut self) -> Result<Bytes> {
        link::lock(self.ns.link())?.query_binary(DATA_QUERY)
    }

    /// Fetch and decode one record with the current encoding.
    pub fn fetch_samples(&mut self) -> Result<Vec<f64>> {
        let format = self.format()?;
        let order = match format {
            WaveformFormat::Word => self.byte_order()?,
            _ => ByteOrder::default(),
        };
        let payload = self.fetch_data()?;
        decode_samples(&payload, format, order)
    }

    /// Enable or disable verbose logging.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.ns.set_verbose(verbose);
    }
}
