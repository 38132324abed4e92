use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use uuid::Uuid;

use shared_config::ErfidOptions;

/// URL-safe alphabet for the nano format.
const NANO_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const NANO_LENGTH: usize = 21;

pub type ErfidGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErfidFormat {
    Uuid,
    Nano,
    Custom,
}

impl fmt::Display for ErfidFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErfidFormat::Uuid => write!(f, "uuid"),
            ErfidFormat::Nano => write!(f, "nano"),
            ErfidFormat::Custom => write!(f, "custom"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErfidError {
    #[error("unknown erfid format: {0}")]
    UnknownFormat(String),
    #[error("format '{0}' does not take a generator")]
    UnexpectedGenerator(ErfidFormat),
    #[error("format 'custom' requires a generator")]
    MissingGenerator,
}

/// Per-process request-id configuration. Built once by the composition root
/// and injected wherever ids are minted or checked.
#[derive(Clone)]
pub struct ErfidConfig {
    prefix: String,
    format: ErfidFormat,
    generator: Option<ErfidGenerator>,
    include_timestamp: bool,
}

impl fmt::Debug for ErfidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErfidConfig")
            .field("prefix", &self.prefix)
            .field("format", &self.format)
            .field("generator", &self.generator.as_ref().map(|_| "<fn>"))
            .field("include_timestamp", &self.include_timestamp)
            .finish()
    }
}

impl Default for ErfidConfig {
    fn default() -> Self {
        Self {
            prefix: "erf".to_string(),
            format: ErfidFormat::Uuid,
            generator: None,
            include_timestamp: false,
        }
    }
}

impl ErfidConfig {
    pub fn new(
        prefix: impl Into<String>,
        format: ErfidFormat,
        generator: Option<ErfidGenerator>,
        include_timestamp: bool,
    ) -> Result<Self, ErfidError> {
        match (format, &generator) {
            (ErfidFormat::Custom, None) => return Err(ErfidError::MissingGenerator),
            (ErfidFormat::Uuid | ErfidFormat::Nano, Some(_)) => {
                return Err(ErfidError::UnexpectedGenerator(format))
            }
            _ => {}
        }
        Ok(Self {
            prefix: prefix.into(),
            format,
            generator,
            include_timestamp,
        })
    }

    /// Build from the serialized options. A `custom` format cannot arrive
    /// from the environment without a generator, so it is rejected here; the
    /// composition root attaches one via [`ErfidConfig::new`].
    pub fn from_options(options: &ErfidOptions) -> Result<Self, ErfidError> {
        let format = match options.format.as_str() {
            "uuid" => ErfidFormat::Uuid,
            "nano" => ErfidFormat::Nano,
            "custom" => return Err(ErfidError::MissingGenerator),
            other => return Err(ErfidError::UnknownFormat(other.to_string())),
        };
        Self::new(
            options.prefix.clone(),
            format,
            None,
            options.include_timestamp,
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn format(&self) -> ErfidFormat {
        self.format
    }

    /// Mint a new id: `prefix_[timestamp_]baseId`.
    pub fn generate(&self) -> String {
        let base = match self.format {
            ErfidFormat::Uuid => Uuid::new_v4().to_string(),
            ErfidFormat::Nano => nano_id(),
            ErfidFormat::Custom => {
                let generator = self
                    .generator
                    .as_ref()
                    .expect("custom format always carries a generator");
                generator()
            }
        };
        if self.include_timestamp {
            format!("{}_{}_{}", self.prefix, Utc::now().timestamp_millis(), base)
        } else {
            format!("{}_{}", self.prefix, base)
        }
    }

    /// True when `id` could have been produced by this configuration.
    pub fn validate(&self, id: &str) -> bool {
        let Some(parsed) = parse_erfid(id) else {
            return false;
        };
        if parsed.prefix != self.prefix {
            return false;
        }
        if self.include_timestamp != parsed.timestamp.is_some() {
            return false;
        }
        match self.format {
            ErfidFormat::Uuid => is_uuid_v4(&parsed.base),
            ErfidFormat::Nano => is_nano(&parsed.base),
            ErfidFormat::Custom => !parsed.base.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedErfid {
    pub prefix: String,
    pub timestamp: Option<i64>,
    pub base: String,
}

/// Split an id into prefix, optional millisecond timestamp, and base.
/// Accepts 1-3 underscore-separated parts; a 13-digit second segment is the
/// timestamp. The base may itself contain underscores (nano alphabet).
pub fn parse_erfid(id: &str) -> Option<ParsedErfid> {
    if id.is_empty() {
        return None;
    }
    let Some((prefix, rest)) = id.split_once('_') else {
        // Bare base id without a prefix.
        return Some(ParsedErfid {
            prefix: String::new(),
            timestamp: None,
            base: id.to_string(),
        });
    };
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    if let Some((ts, base)) = rest.split_once('_') {
        if ts.len() == 13 && ts.bytes().all(|b| b.is_ascii_digit()) && !base.is_empty() {
            return Some(ParsedErfid {
                prefix: prefix.to_string(),
                timestamp: ts.parse().ok(),
                base: base.to_string(),
            });
        }
    }
    Some(ParsedErfid {
        prefix: prefix.to_string(),
        timestamp: None,
        base: rest.to_string(),
    })
}

fn nano_id() -> String {
    let mut rng = rand::thread_rng();
    (0..NANO_LENGTH)
        .map(|_| NANO_ALPHABET[rng.gen_range(0..NANO_ALPHABET.len())] as char)
        .collect()
}

fn is_uuid_v4(base: &str) -> bool {
    let pattern = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
    )
    .unwrap();
    pattern.is_match(base)
}

fn is_nano(base: &str) -> bool {
    base.len() == NANO_LENGTH
        && base
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
