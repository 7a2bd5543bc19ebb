//! Output waveforms handed to the acquisition engine.
//!
//! ## Main Structures and Enumerations:
//!
//! - `WaveKind`: whether a buffer is one period of a repeating signal (`Periodic`) or a
//!   finite pulse played once (`OneShot`).
//!
//! - `Waveform`: the voltage samples plus their kind. Samples sit behind an `Arc`, so handing a
//!   waveform to a running session is a cheap clone and the session's copy can never change
//!   under it. Changing parameters means building a new `Waveform`.
//!
//! ## Constructors:
//!
//! - [`Waveform::block`]: one period of a rectangular wave (seal test pulses).
//! - [`Waveform::constant`]: one period at a fixed level (holding potential, current clamp).
//! - [`Waveform::pulse`]: a plateau followed by a zero tail (zap).

use ndarray::{s, Array1, ArrayView1};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SessionError};

/// Longest buffer a waveform may hold, 2^24 samples (about 168 s at 100 kSa/s).
pub const MAX_WAVEFORM_SAMPS: usize = 1 << 24;

/// Rounds a fractional sample count down to a buffer length within [`MAX_WAVEFORM_SAMPS`].
pub fn sample_count(samps: f64) -> Result<usize> {
    if !(samps.is_finite() && samps >= 0. && samps <= MAX_WAVEFORM_SAMPS as f64) {
        return Err(SessionError::Configuration(format!(
            "Waveform length of {} samples is outside [0, {}]",
            samps, MAX_WAVEFORM_SAMPS
        )));
    }
    Ok(samps.floor() as usize)
}

/// Enum type for the two playback kinds. Supported kinds: `Periodic`, `OneShot`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveKind {
    Periodic,
    OneShot,
}
impl fmt::Display for WaveKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                WaveKind::Periodic => "PERIODIC",
                WaveKind::OneShot => "ONESHOT",
            }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    kind: WaveKind,
    samples: Arc<Array1<f64>>,
}

impl Waveform {
    pub fn periodic(samples: Array1<f64>) -> Self {
        Self {
            kind: WaveKind::Periodic,
            samples: Arc::new(samples),
        }
    }

    pub fn one_shot(samples: Array1<f64>) -> Self {
        Self {
            kind: WaveKind::OneShot,
            samples: Arc::new(samples),
        }
    }

    /// One period of a block wave.
    ///
    /// The period spans `round(samp_rate / freq)` samples. The first `round(duty * period)`
    /// samples sit at `v_max`, the remainder at `v_min`.
    ///
    /// # Examples
    ///
    /// ```
    /// use labctl_core::waveform::*;
    ///
    /// // 100 Hz at 1 kSa/s: 10 samples, 3 high and 7 low
    /// let wave = Waveform::block(1000., 100., -0.1, 0.1, 0.3).unwrap();
    /// assert_eq!(wave.len(), 10);
    /// assert_eq!(wave.samples()[2], 0.1);
    /// assert_eq!(wave.samples()[3], -0.1);
    /// ```
    pub fn block(samp_rate: f64, freq: f64, v_min: f64, v_max: f64, duty: f64) -> Result<Self> {
        if !(samp_rate.is_finite() && samp_rate > 0.) {
            return Err(SessionError::Configuration(format!(
                "Block wave sample rate must be positive, received {}",
                samp_rate
            )));
        }
        if !(freq.is_finite() && freq > 0. && freq <= samp_rate) {
            return Err(SessionError::Configuration(format!(
                "Block wave frequency {} must lie in (0, {}]",
                freq, samp_rate
            )));
        }
        if !(0. ..=1.).contains(&duty) {
            return Err(SessionError::Configuration(format!(
                "Duty cycle {} must lie in [0, 1]",
                duty
            )));
        }
        if !(v_min.is_finite() && v_max.is_finite()) {
            return Err(SessionError::Configuration(format!(
                "Block wave levels must be finite, received {} and {}",
                v_min, v_max
            )));
        }

        let period = sample_count((samp_rate / freq).round())?.max(1);
        let high = ((duty * period as f64).round() as usize).min(period);
        let mut samples = Array1::from_elem(period, v_min);
        samples.slice_mut(s![..high]).fill(v_max);
        Ok(Self::periodic(samples))
    }

    /// One period at a fixed level. Equivalent to a block wave with `v_min == v_max`.
    pub fn constant(samp_rate: f64, freq: f64, value: f64) -> Result<Self> {
        Self::block(samp_rate, freq, value, value, 0.5)
    }

    /// `plateau_samps` samples at `plateau` followed by `tail_samps` zeros, played once.
    ///
    /// ```
    /// # use labctl_core::waveform::*;
    /// let zap = Waveform::pulse(1.0, 5, 10).unwrap();
    /// assert_eq!(zap.kind(), WaveKind::OneShot);
    /// assert_eq!(zap.len(), 15);
    /// assert_eq!(zap.samples()[4], 1.0);
    /// assert_eq!(zap.samples()[5], 0.0);
    /// ```
    pub fn pulse(plateau: f64, plateau_samps: usize, tail_samps: usize) -> Result<Self> {
        if !plateau.is_finite() {
            return Err(SessionError::Configuration(format!(
                "Pulse plateau must be finite, received {}",
                plateau
            )));
        }
        let len = plateau_samps
            .checked_add(tail_samps)
            .filter(|&len| len <= MAX_WAVEFORM_SAMPS)
            .ok_or_else(|| {
                SessionError::Configuration(format!(
                    "Pulse of {} + {} samples exceeds {} samples",
                    plateau_samps, tail_samps, MAX_WAVEFORM_SAMPS
                ))
            })?;
        let mut samples = Array1::zeros(len);
        samples.slice_mut(s![..plateau_samps]).fill(plateau);
        Ok(Self::one_shot(samples))
    }

    pub fn kind(&self) -> WaveKind {
        self.kind
    }

    pub fn samples(&self) -> ArrayView1<'_, f64> {
        self.samples.view()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback time of one pass through the buffer, in seconds.
    pub fn duration(&self, samp_rate: f64) -> f64 {
        self.len() as f64 / samp_rate
    }

    /// Largest absolute voltage in the buffer, or `0.0` when empty.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0., |acc: f64, v| acc.max(v.abs()))
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {} samples, peak {} V]", self.kind, self.len(), self.peak())
    }
}
