//! Sample clock pairing between the input (read) and output (write) tasks.
//!
//! The input task always runs on its device's own sample clock. The output task imports it:
//!
//! 1. [`ClockAssignment::SameDevice`]: both tasks live on one card, the output task is
//!    clocked straight from `/<device>/ai/SampleClock`.
//! 2. [`ClockAssignment::ReadIsClock1`]: the input device owns the `clock-1` terminal. The
//!    input task exports its sample clock there and the output task imports it from the
//!    `clock-2` terminal, which is wired to `clock-1`.
//! 3. [`ClockAssignment::ReadIsClock2`]: mirror image of the previous case.
//!
//! Any other layout is rejected. There is no unsynchronized fallback.

use crate::channel::{ChannelTable, PhysicalChannel, CLOCK_1, CLOCK_2};
use crate::error::{Result, SessionError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockAssignment {
    SameDevice {
        device: String,
    },
    ReadIsClock1 {
        export_terminal: String,
        write_clock_src: String,
    },
    ReadIsClock2 {
        export_terminal: String,
        write_clock_src: String,
    },
}

impl ClockAssignment {
    /// Terminal the output task takes its sample clock from.
    pub fn write_clock_src(&self) -> String {
        match self {
            ClockAssignment::SameDevice { device } => format!("/{}/ai/SampleClock", device),
            ClockAssignment::ReadIsClock1 {
                write_clock_src, ..
            }
            | ClockAssignment::ReadIsClock2 {
                write_clock_src, ..
            } => write_clock_src.clone(),
        }
    }

    /// Terminal the input task must export its sample clock to, if any.
    pub fn export_terminal(&self) -> Option<&str> {
        match self {
            ClockAssignment::SameDevice { .. } => None,
            ClockAssignment::ReadIsClock1 {
                export_terminal, ..
            }
            | ClockAssignment::ReadIsClock2 {
                export_terminal, ..
            } => Some(export_terminal),
        }
    }
}

/// Determines the clock pairing for an output channel and the input channels read together.
///
/// Clock terminals are only looked up in `table` when the tasks sit on different devices.
pub fn resolve_clock(
    output: &PhysicalChannel,
    inputs: &[PhysicalChannel],
    table: &ChannelTable,
) -> Result<ClockAssignment> {
    let read = inputs.first().ok_or_else(|| {
        SessionError::Configuration("At least one input channel is required".to_string())
    })?;
    if let Some(stray) = inputs.iter().find(|chan| chan.device() != read.device()) {
        return Err(SessionError::Configuration(format!(
            "Input channels must share one device, found {} next to {}",
            stray, read
        )));
    }
    let read_dev = read.device();
    let write_dev = output.device();

    if read_dev == write_dev {
        return Ok(ClockAssignment::SameDevice {
            device: read_dev.to_string(),
        });
    }

    let clock1 = table.lookup(CLOCK_1)?;
    let clock2 = table.lookup(CLOCK_2)?;
    let no_pairing = || SessionError::ClockResolution {
        read_device: read_dev.to_string(),
        write_device: write_dev.to_string(),
        clock1_device: clock1.device().to_string(),
        clock2_device: clock2.device().to_string(),
    };

    match (read_dev == clock1.device(), read_dev == clock2.device()) {
        (true, false) => Ok(ClockAssignment::ReadIsClock1 {
            export_terminal: clock1.terminal(),
            write_clock_src: clock2.terminal(),
        }),
        (false, true) => Ok(ClockAssignment::ReadIsClock2 {
            export_terminal: clock2.terminal(),
            write_clock_src: clock1.terminal(),
        }),
        // Neither terminal on the read device, or both of them: no single export/import pair
        (false, false) | (true, true) => Err(no_pairing()),
    }
}
