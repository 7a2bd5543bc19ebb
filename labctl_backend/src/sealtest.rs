//! # Patch clamp measurement protocols
//!
//! [`SealTest`] pairs an [`AcquisitionEngine`] with one of four [`Protocol`]s and the rig's
//! configuration. Each protocol fixes the session mode, sample rate and chunk size, and has
//! a wave-setting helper that converts amplifier-side quantities into command voltages:
//!
//! | Protocol       | Mode       | Chunk | Output                                   |
//! |----------------|------------|-------|------------------------------------------|
//! | `Seal`         | continuous | 100   | block wave between two voltages          |
//! | `Hold`         | continuous | 500   | constant holding potential               |
//! | `CurrentClamp` | continuous | 500   | constant current command                 |
//! | `Zap`          | pulse      |       | plateau at 100 kSa/s, then 10 zeros      |
//!
//! Setting a wave replaces the stored waveform; a running session keeps playing the one it
//! was started with until it is restarted.

use std::fmt;
use std::str::FromStr;

use labctl_core::channel::{ChannelRoles, ChannelTable};
use labctl_core::config::{MeasurementConstants, RigConfig};
use labctl_core::error::{Result, SessionError};
use labctl_core::session::{SessionMode, SessionPlan};
use labctl_core::waveform::{sample_count, Waveform};

use crate::daq::DaqBackend;
use crate::engine::{AcquisitionEngine, BatchConsumer};

pub const SEAL_CHUNK_SIZE: usize = 100;
pub const HOLD_CHUNK_SIZE: usize = 500;
pub const ZAP_SAMP_RATE: f64 = 100_000.;
/// Zero samples appended after the zap plateau so the command returns to 0 V.
pub const ZAP_TAIL_SAMPS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Seal,
    Hold,
    CurrentClamp,
    Zap,
}

impl Protocol {
    pub fn mode(&self) -> SessionMode {
        match self {
            Protocol::Seal => SessionMode::Continuous {
                chunk_size: SEAL_CHUNK_SIZE,
            },
            Protocol::Hold | Protocol::CurrentClamp => SessionMode::Continuous {
                chunk_size: HOLD_CHUNK_SIZE,
            },
            Protocol::Zap => SessionMode::Pulse,
        }
    }

    pub fn samp_rate(&self, constants: &MeasurementConstants) -> f64 {
        match self {
            Protocol::Zap => ZAP_SAMP_RATE,
            _ => constants.samp_rate,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Protocol::Seal => "seal",
                Protocol::Hold => "hold",
                Protocol::CurrentClamp => "current-clamp",
                Protocol::Zap => "zap",
            }
        )
    }
}

impl FromStr for Protocol {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "seal" => Ok(Protocol::Seal),
            "hold" => Ok(Protocol::Hold),
            "current-clamp" | "current_clamp" | "currentclamp" => Ok(Protocol::CurrentClamp),
            "zap" => Ok(Protocol::Zap),
            _ => Err(SessionError::Configuration(format!(
                "Unknown protocol {:?}, expecting one of seal, hold, current-clamp, zap",
                s
            ))),
        }
    }
}

pub struct SealTest<B: DaqBackend> {
    engine: AcquisitionEngine<B>,
    protocol: Protocol,
    roles: ChannelRoles,
    channels: ChannelTable,
    constants: MeasurementConstants,
    waveform: Waveform,
}

impl<B: DaqBackend> SealTest<B> {
    /// Continuous protocols start out with the configured seal block wave, `Zap` with an
    /// all-zero pulse.
    pub fn new(backend: B, protocol: Protocol, config: &RigConfig) -> Result<Self> {
        let constants = config.constants.clone();
        let waveform = match protocol {
            Protocol::Zap => Waveform::pulse(0., 0, ZAP_TAIL_SAMPS)?,
            _ => Waveform::block(
                constants.samp_rate,
                constants.freq,
                constants.v_min,
                constants.v_max,
                constants.duty,
            )?,
        };
        Ok(Self {
            engine: AcquisitionEngine::new(backend),
            protocol,
            roles: config.roles.clone(),
            channels: config.channels.clone(),
            constants,
            waveform,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn samp_rate(&self) -> f64 {
        self.protocol.samp_rate(&self.constants)
    }

    /// Seal test block wave: low level `lower / gain`, high level `diff / gain` above it.
    pub fn set_seal_wave(
        &mut self,
        in_vol_gain: f64,
        diff_voltage: f64,
        lower_voltage: f64,
    ) -> Result<()> {
        self.expect_protocol(Protocol::Seal)?;
        let gain = checked_gain(in_vol_gain)?;
        let v_min = lower_voltage / gain;
        let v_max = v_min + diff_voltage / gain;
        self.waveform = self.block(v_min, v_max)?;
        Ok(())
    }

    /// Holding potential in mV.
    pub fn set_hold_wave(&mut self, in_vol_gain: f64, hold_mv: f64) -> Result<()> {
        self.expect_protocol(Protocol::Hold)?;
        let v = hold_mv / 1000. / checked_gain(in_vol_gain)?;
        self.waveform = self.constant(v)?;
        Ok(())
    }

    /// Injected current in pA.
    pub fn set_current_clamp_wave(
        &mut self,
        in_vol_gain: f64,
        probe_gain: f64,
        current_pa: f64,
    ) -> Result<()> {
        self.expect_protocol(Protocol::CurrentClamp)?;
        let v = current_pa * 1e-12 / checked_gain(in_vol_gain)? * probe_gain;
        self.waveform = self.constant(v)?;
        Ok(())
    }

    /// Zap plateau of `zap_voltage / gain` lasting `zap_time_us` microseconds.
    pub fn set_zap_wave(
        &mut self,
        in_vol_gain: f64,
        zap_voltage: f64,
        zap_time_us: f64,
    ) -> Result<()> {
        self.expect_protocol(Protocol::Zap)?;
        if !(zap_time_us.is_finite() && zap_time_us >= 0.) {
            return Err(SessionError::Configuration(format!(
                "Zap duration must be non-negative, received {} us",
                zap_time_us
            )));
        }
        let plateau = zap_voltage / checked_gain(in_vol_gain)?;
        let plateau_samps = sample_count(zap_time_us * ZAP_SAMP_RATE / 1e6)?;
        self.waveform = Waveform::pulse(plateau, plateau_samps, ZAP_TAIL_SAMPS)?;
        Ok(())
    }

    /// Plans a session with the current waveform and starts it.
    pub fn start(&mut self, consumer: BatchConsumer) -> Result<()> {
        let plan = SessionPlan::configure(
            self.waveform.clone(),
            self.samp_rate(),
            self.protocol.mode(),
            &self.roles,
            &self.channels,
        )?;
        self.engine.start(plan, consumer)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.engine.stop()
    }

    /// Waits for the session to end on its own, e.g. a zap pulse.
    pub fn join(&mut self) -> Result<()> {
        self.engine.join()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    fn block(&self, v_min: f64, v_max: f64) -> Result<Waveform> {
        let c = &self.constants;
        Waveform::block(c.samp_rate, c.freq, v_min, v_max, c.duty)
    }

    fn constant(&self, v: f64) -> Result<Waveform> {
        Waveform::constant(self.constants.samp_rate, self.constants.freq, v)
    }

    fn expect_protocol(&self, expected: Protocol) -> Result<()> {
        if self.protocol != expected {
            return Err(SessionError::Configuration(format!(
                "Cannot set a {} wave on a {} test",
                expected, self.protocol
            )));
        }
        Ok(())
    }
}

fn checked_gain(gain: f64) -> Result<f64> {
    if gain.is_finite() && gain != 0. {
        Ok(gain)
    } else {
        Err(SessionError::Configuration(format!(
            "Amplifier gain must be finite and non-zero, received {}",
            gain
        )))
    }
}

#[cfg(test)]
mod test {
    use crate::daq::mock::MockDaq;
    use crate::engine::batch_channel;
    use crate::sealtest::*;
    use std::time::Duration;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn protocol_parameters() {
        let constants = MeasurementConstants::default();
        assert_eq!(Protocol::Seal.mode(), SessionMode::Continuous { chunk_size: 100 });
        assert_eq!(Protocol::Hold.mode(), SessionMode::Continuous { chunk_size: 500 });
        assert_eq!(Protocol::Zap.mode(), SessionMode::Pulse);
        assert_eq!(Protocol::CurrentClamp.samp_rate(&constants), 10_000.);
        assert_eq!(Protocol::Zap.samp_rate(&constants), 100_000.);
        assert_eq!("Current-Clamp".parse::<Protocol>().unwrap(), Protocol::CurrentClamp);
        assert!("patch".parse::<Protocol>().is_err());
    }

    #[test]
    fn seal_wave_levels() {
        let mut test = SealTest::new(MockDaq::new(), Protocol::Seal, &RigConfig::default()).unwrap();
        test.set_seal_wave(10., 0.1, -0.05).unwrap();
        let samples = test.waveform().samples();
        assert_eq!(samples.len(), 100);
        assert!(approx(samples[0], -0.005 + 0.01));
        assert!(approx(samples[99], -0.005));
    }

    #[test]
    fn hold_and_current_clamp_are_flat() {
        let mut hold = SealTest::new(MockDaq::new(), Protocol::Hold, &RigConfig::default()).unwrap();
        hold.set_hold_wave(10., -70.).unwrap();
        assert_eq!(hold.waveform(), &Waveform::constant(10_000., 100., -0.007).unwrap());
        assert!(hold.waveform().samples().iter().all(|&v| approx(v, -0.007)));

        let mut clamp =
            SealTest::new(MockDaq::new(), Protocol::CurrentClamp, &RigConfig::default()).unwrap();
        clamp.set_current_clamp_wave(2., 0.5e9, 100.).unwrap();
        // 100 pA / 2 * 0.5 GOhm
        assert!(clamp.waveform().samples().iter().all(|&v| approx(v, 0.025)));
    }

    #[test]
    fn zap_wave_shape() {
        let mut zap = SealTest::new(MockDaq::new(), Protocol::Zap, &RigConfig::default()).unwrap();
        zap.set_zap_wave(10., 1.0, 200.).unwrap();
        // 200 us at 100 kSa/s
        assert_eq!(zap.waveform().len(), 20 + ZAP_TAIL_SAMPS);
        assert!(approx(zap.waveform().samples()[19], 0.1));
        assert_eq!(zap.waveform().samples()[20], 0.);
        assert!(zap.set_zap_wave(10., 1.0, -1.).is_err());
    }

    #[test]
    fn zap_longer_than_a_buffer_is_rejected() {
        let mut zap = SealTest::new(MockDaq::new(), Protocol::Zap, &RigConfig::default()).unwrap();
        zap.set_zap_wave(10., 1.0, 200.).unwrap();
        assert!(matches!(
            zap.set_zap_wave(10., 1.0, 1e20),
            Err(SessionError::Configuration(_))
        ));
        // Previous wave kept
        assert_eq!(zap.waveform().len(), 20 + ZAP_TAIL_SAMPS);
    }

    #[test]
    fn wave_setters_check_protocol_and_gain() {
        let mut seal = SealTest::new(MockDaq::new(), Protocol::Seal, &RigConfig::default()).unwrap();
        assert!(matches!(
            seal.set_hold_wave(10., -70.),
            Err(SessionError::Configuration(_))
        ));
        assert!(matches!(
            seal.set_seal_wave(0., 0.1, 0.),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn seal_session_streams_two_channels() {
        let daq = MockDaq::new();
        let mut seal = SealTest::new(daq.clone(), Protocol::Seal, &RigConfig::default()).unwrap();
        let (consumer, rx) = batch_channel();
        seal.start(consumer).unwrap();
        assert!(seal.is_running());
        let batch = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        seal.stop().unwrap();
        assert!(!seal.is_running());
        assert_eq!(batch.num_channels(), 2);
        assert_eq!(batch.chunk_size(), SEAL_CHUNK_SIZE);
        assert_eq!(daq.released().len(), 2);
    }

    #[test]
    fn zap_session_runs_to_completion() {
        let daq = MockDaq::new();
        let mut zap = SealTest::new(daq.clone(), Protocol::Zap, &RigConfig::default()).unwrap();
        zap.set_zap_wave(10., 1.0, 100.).unwrap();
        zap.start(Box::new(|_| {})).unwrap();
        zap.join().unwrap();
        assert_eq!(daq.samples_written(), 10 + ZAP_TAIL_SAMPS);
    }

    #[test]
    fn bad_wiring_fails_at_start() {
        let mut config = RigConfig::default();
        config.channels = ChannelTable::new();
        let daq = MockDaq::new();
        let mut seal = SealTest::new(daq.clone(), Protocol::Seal, &config).unwrap();
        assert!(matches!(
            seal.start(Box::new(|_| {})),
            Err(SessionError::Configuration(_))
        ));
        assert!(daq.events().is_empty());
    }
}
