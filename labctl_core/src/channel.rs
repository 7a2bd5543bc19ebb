//! Logical-to-physical channel mapping.
//!
//! Rig code never names hardware lines directly. It asks for a logical role such as
//! [`PATCH_COMMAND`] and the [`ChannelTable`] resolves it to a physical identifier of the
//! form `"<device>/<line>"` (e.g. `"Dev1/ai22"`). Clock terminals are usually written with a
//! leading slash (`"/Dev2/PFI1"`); [`PhysicalChannel::parse`] accepts both spellings.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Result, SessionError};

/// Analog output driving the amplifier command input.
pub const PATCH_COMMAND: &str = "patch-command";
/// Amplifier voltage readback.
pub const PATCH_VOLTAGE: &str = "patch-voltage";
/// Amplifier current readback.
pub const PATCH_CURRENT: &str = "patch-current";
/// First clock routing terminal.
pub const CLOCK_1: &str = "clock-1";
/// Second clock routing terminal.
pub const CLOCK_2: &str = "clock-2";

fn physical_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/?(?P<device>[^/\s]+)/(?P<line>[^\s]+)$").expect("physical channel pattern")
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysicalChannel {
    device: String,
    line: String,
}

impl PhysicalChannel {
    pub fn parse(name: &str) -> Result<Self> {
        let caps = physical_name_re().captures(name.trim()).ok_or_else(|| {
            SessionError::Configuration(format!(
                "Expecting physical channel of format '<device>/<line>' yet received {:?}",
                name
            ))
        })?;
        Ok(Self {
            device: caps["device"].to_string(),
            line: caps["line"].to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Channel name as the driver expects it in channel lists, e.g. `Dev1/ao0`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.device, self.line)
    }

    /// Fully qualified terminal name, e.g. `/Dev1/PFI1`.
    pub fn terminal(&self) -> String {
        format!("/{}/{}", self.device, self.line)
    }
}

impl fmt::Display for PhysicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    Output,
    InputPrimary,
    InputSecondary,
}

/// A resolved channel: the logical name it was looked up by, its role and where it lives.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    pub logical: String,
    pub role: ChannelRole,
    pub channel: PhysicalChannel,
}

/// Lookup table from logical channel names to physical identifiers.
///
/// Insertion order is kept so that error messages and serialized configs list entries the
/// way they were written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTable {
    entries: IndexMap<String, String>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, logical: &str, physical: &str) {
        self.entries.insert(logical.to_string(), physical.to_string());
    }

    pub fn contains(&self, logical: &str) -> bool {
        self.entries.contains_key(logical)
    }

    pub fn raw(&self, logical: &str) -> Option<&str> {
        self.entries.get(logical).map(String::as_str)
    }

    /// Resolves a logical name, failing fast when the table has no such key.
    pub fn lookup(&self, logical: &str) -> Result<PhysicalChannel> {
        let physical = self.raw(logical).ok_or_else(|| {
            SessionError::Configuration(format!(
                "Logical channel {:?} not found. Registered channels are {:?}",
                logical,
                self.entries.keys().collect::<Vec<_>>()
            ))
        })?;
        PhysicalChannel::parse(physical)
    }

    pub fn resolve(&self, logical: &str, role: ChannelRole) -> Result<ChannelConfig> {
        Ok(ChannelConfig {
            logical: logical.to_string(),
            role,
            channel: self.lookup(logical)?,
        })
    }
}

impl Default for ChannelTable {
    /// Wiring of the single-card patch rig: amplifier I/O on `Dev1`, clock routing between
    /// `Dev1` and `Dev2` over PFI lines.
    fn default() -> Self {
        let mut table = Self::new();
        table.insert(PATCH_COMMAND, "Dev1/ao0");
        table.insert(PATCH_VOLTAGE, "Dev1/ai22");
        table.insert(PATCH_CURRENT, "Dev1/ai20");
        table.insert(CLOCK_1, "/Dev1/PFI1");
        table.insert(CLOCK_2, "/Dev2/PFI7");
        table
    }
}

/// Which logical names play which role in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelRoles {
    pub output: String,
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
}

impl ChannelRoles {
    pub fn new(output: &str, primary: &str, secondary: Option<&str>) -> Self {
        Self {
            output: output.to_string(),
            primary: primary.to_string(),
            secondary: secondary.map(str::to_string),
        }
    }

    /// Command out on [`PATCH_COMMAND`], voltage and current readback in.
    pub fn patch_clamp() -> Self {
        Self::new(PATCH_COMMAND, PATCH_VOLTAGE, Some(PATCH_CURRENT))
    }

    /// Returns the output channel and the input channels in acquisition row order.
    pub fn resolve(&self, table: &ChannelTable) -> Result<(ChannelConfig, Vec<ChannelConfig>)> {
        let output = table.resolve(&self.output, ChannelRole::Output)?;
        let mut inputs = vec![table.resolve(&self.primary, ChannelRole::InputPrimary)?];
        if let Some(secondary) = &self.secondary {
            inputs.push(table.resolve(secondary, ChannelRole::InputSecondary)?);
        }
        Ok((output, inputs))
    }
}

impl Default for ChannelRoles {
    fn default() -> Self {
        Self::patch_clamp()
    }
}
