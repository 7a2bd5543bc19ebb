//! Validated description of one acquisition/generation session.
//!
//! A [`SessionPlan`] is everything the engine needs before touching hardware: the output
//! waveform, sample rate, session mode, resolved channels and the clock pairing. Building one
//! through [`SessionPlan::configure`] is the only way to obtain it, so a plan that exists has
//! already passed every configuration and clock check.

use std::fmt;

use crate::channel::{ChannelConfig, ChannelRoles, ChannelTable, PhysicalChannel};
use crate::clock::{resolve_clock, ClockAssignment};
use crate::error::{Result, SessionError};
use crate::waveform::{WaveKind, Waveform};

/// Extra read timeout on top of the nominal chunk duration, in seconds.
pub const READ_TIMEOUT_MARGIN: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Regenerate the waveform and stream `chunk_size` samples per channel per read
    /// until cancelled.
    Continuous { chunk_size: usize },
    /// Play the waveform once with finite timing on both tasks. Nothing is read back.
    Pulse,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionMode::Continuous { chunk_size } => write!(f, "continuous({})", chunk_size),
            SessionMode::Pulse => write!(f, "pulse"),
        }
    }
}

/// Hardware-neutral sample timing mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMode {
    Continuous,
    Finite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub mode: SampleMode,
    /// Buffer size hint in continuous mode, exact sample count in finite mode.
    pub samps_per_chan: u64,
}

#[derive(Clone, Debug)]
pub struct SessionPlan {
    waveform: Waveform,
    samp_rate: f64,
    mode: SessionMode,
    output: ChannelConfig,
    inputs: Vec<ChannelConfig>,
    clock: ClockAssignment,
}

impl SessionPlan {
    /// Validates the session parameters and resolves channels and clock pairing.
    ///
    /// # Errors
    ///
    /// - `Configuration` for a non-positive sample rate, a zero chunk size, an empty waveform,
    ///   a waveform kind that does not match the mode, or a logical name missing from `table`.
    /// - `ClockResolution` when no supported clock pairing matches the channel layout.
    pub fn configure(
        waveform: Waveform,
        samp_rate: f64,
        mode: SessionMode,
        roles: &ChannelRoles,
        table: &ChannelTable,
    ) -> Result<Self> {
        if !(samp_rate.is_finite() && samp_rate > 0.) {
            return Err(SessionError::Configuration(format!(
                "Sample rate must be positive, received {}",
                samp_rate
            )));
        }
        if let SessionMode::Continuous { chunk_size: 0 } = mode {
            return Err(SessionError::Configuration(
                "Chunk size must be positive".to_string(),
            ));
        }
        if waveform.is_empty() {
            return Err(SessionError::Configuration(
                "Output waveform is empty".to_string(),
            ));
        }
        let expected_kind = match mode {
            SessionMode::Continuous { .. } => WaveKind::Periodic,
            SessionMode::Pulse => WaveKind::OneShot,
        };
        if waveform.kind() != expected_kind {
            return Err(SessionError::Configuration(format!(
                "A {} session needs a {} waveform, received {}",
                mode,
                expected_kind,
                waveform.kind()
            )));
        }

        let (output, inputs) = roles.resolve(table)?;
        let input_chans: Vec<PhysicalChannel> =
            inputs.iter().map(|input| input.channel.clone()).collect();
        let clock = resolve_clock(&output.channel, &input_chans, table)?;

        Ok(Self {
            waveform,
            samp_rate,
            mode,
            output,
            inputs,
            clock,
        })
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn samp_rate(&self) -> f64 {
        self.samp_rate
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn output(&self) -> &ChannelConfig {
        &self.output
    }

    pub fn inputs(&self) -> &[ChannelConfig] {
        &self.inputs
    }

    pub fn clock(&self) -> &ClockAssignment {
        &self.clock
    }

    pub fn chunk_size(&self) -> Option<usize> {
        match self.mode {
            SessionMode::Continuous { chunk_size } => Some(chunk_size),
            SessionMode::Pulse => None,
        }
    }

    /// Device whose sample clock paces the session.
    pub fn read_device(&self) -> &str {
        // `configure` guarantees at least one input
        self.inputs[0].channel.device()
    }

    /// Timing of the input task. In continuous mode the chunk size sizes the input buffer;
    /// each read drains exactly one chunk so the buffer never accumulates a backlog.
    pub fn input_timing(&self) -> Timing {
        match self.mode {
            SessionMode::Continuous { chunk_size } => Timing {
                mode: SampleMode::Continuous,
                samps_per_chan: chunk_size as u64,
            },
            SessionMode::Pulse => self.finite_timing(),
        }
    }

    pub fn output_timing(&self) -> Timing {
        match self.mode {
            SessionMode::Continuous { .. } => Timing {
                mode: SampleMode::Continuous,
                samps_per_chan: self.waveform.len() as u64,
            },
            SessionMode::Pulse => self.finite_timing(),
        }
    }

    fn finite_timing(&self) -> Timing {
        Timing {
            mode: SampleMode::Finite,
            samps_per_chan: self.waveform.len() as u64,
        }
    }

    /// Seconds a single blocking read may wait before the driver reports a timeout.
    pub fn read_timeout(&self) -> f64 {
        let chunk = self.chunk_size().unwrap_or(self.waveform.len());
        chunk as f64 / self.samp_rate + READ_TIMEOUT_MARGIN
    }

    /// Seconds to wait for a pulse to finish playing.
    pub fn pulse_timeout(&self) -> f64 {
        self.waveform.duration(self.samp_rate) + READ_TIMEOUT_MARGIN
    }
}

impl fmt::Display for SessionPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} session at {} Sa/s: {} -> [{}], {}",
            self.mode,
            self.samp_rate,
            self.output.channel,
            self.inputs
                .iter()
                .map(|input| input.channel.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.waveform
        )
    }
}

#[cfg(test)]
mod test {
    use crate::channel::*;
    use crate::session::*;

    fn block() -> Waveform {
        Waveform::block(10_000., 100., 0., 0.1, 0.5).unwrap()
    }

    #[test]
    fn continuous_plan_timings() {
        let plan = SessionPlan::configure(
            block(),
            10_000.,
            SessionMode::Continuous { chunk_size: 500 },
            &ChannelRoles::patch_clamp(),
            &ChannelTable::default(),
        )
        .unwrap();
        assert_eq!(plan.chunk_size(), Some(500));
        assert_eq!(plan.read_device(), "Dev1");
        assert_eq!(
            plan.input_timing(),
            Timing {
                mode: SampleMode::Continuous,
                samps_per_chan: 500
            }
        );
        assert_eq!(plan.output_timing().samps_per_chan, 100);
        assert!((plan.read_timeout() - (0.05 + READ_TIMEOUT_MARGIN)).abs() < 1e-9);
    }

    #[test]
    fn pulse_plan_uses_finite_waveform_length() {
        let zap = Waveform::pulse(1.0, 40, 10).unwrap();
        let plan = SessionPlan::configure(
            zap,
            100_000.,
            SessionMode::Pulse,
            &ChannelRoles::patch_clamp(),
            &ChannelTable::default(),
        )
        .unwrap();
        let finite = Timing {
            mode: SampleMode::Finite,
            samps_per_chan: 50,
        };
        assert_eq!(plan.input_timing(), finite);
        assert_eq!(plan.output_timing(), finite);
        assert_eq!(plan.chunk_size(), None);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let roles = ChannelRoles::patch_clamp();
        let table = ChannelTable::default();
        let continuous = SessionMode::Continuous { chunk_size: 100 };

        for rate in [0., -1., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                SessionPlan::configure(block(), rate, continuous, &roles, &table),
                Err(SessionError::Configuration(_))
            ));
        }
        assert!(matches!(
            SessionPlan::configure(
                block(),
                1e4,
                SessionMode::Continuous { chunk_size: 0 },
                &roles,
                &table
            ),
            Err(SessionError::Configuration(_))
        ));
        let empty = Waveform::periodic(ndarray::Array1::zeros(0));
        assert!(matches!(
            SessionPlan::configure(empty, 1e4, continuous, &roles, &table),
            Err(SessionError::Configuration(_))
        ));
        // Kind must agree with mode
        assert!(matches!(
            SessionPlan::configure(block(), 1e4, SessionMode::Pulse, &roles, &table),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn missing_role_is_configuration_error() {
        let mut table = ChannelTable::new();
        table.insert(PATCH_COMMAND, "Dev1/ao0");
        table.insert(PATCH_VOLTAGE, "Dev1/ai22");
        let result = SessionPlan::configure(
            block(),
            1e4,
            SessionMode::Continuous { chunk_size: 100 },
            &ChannelRoles::patch_clamp(),
            &table,
        );
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }
}
