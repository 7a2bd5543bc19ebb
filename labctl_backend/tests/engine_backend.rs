use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::{Array2, ArrayView1};

use labctl_backend::{
    batch_channel, AcquisitionEngine, AnalogTask, DaqBackend, Protocol, SealTest,
};
use labctl_core::config::RigConfig;
use labctl_core::error::{Result, SessionError};
use labctl_core::session::{SessionPlan, Timing};
use labctl_core::waveform::Waveform;

// Backend producing constant readings and counting live tasks.
#[derive(Clone, Default)]
struct Flat {
    live: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

struct FlatTask {
    live: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl AnalogTask for FlatTask {
    fn add_ao_voltage_chan(&self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn add_ai_voltage_chan(&self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn cfg_samp_clk_timing(&self, _src: Option<&str>, _rate: f64, _timing: Timing) -> Result<()> {
        Ok(())
    }
    fn export_samp_clk(&self, _terminal: &str) -> Result<()> {
        Ok(())
    }
    fn write_analog(&self, samples: ArrayView1<f64>) -> Result<usize> {
        Ok(samples.len())
    }
    fn read_analog(&self, buf: &mut Array2<f64>, _timeout: f64) -> Result<usize> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.map_or(false, |limit| n >= limit) {
            return Err(SessionError::Hardware("input overflow".to_string()));
        }
        std::thread::sleep(Duration::from_millis(1));
        buf.fill(0.25);
        Ok(buf.ncols())
    }
    fn start(&self) -> Result<()> {
        Ok(())
    }
    fn stop(&self) -> Result<()> {
        Ok(())
    }
    fn wait_until_done(&self, _timeout: f64) -> Result<()> {
        Ok(())
    }
}

impl Drop for FlatTask {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DaqBackend for Flat {
    type Task = FlatTask;

    fn create_task(&self, _name: &str) -> Result<FlatTask> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(FlatTask {
            live: self.live.clone(),
            reads: self.reads.clone(),
            fail_after: self.fail_after,
        })
    }
}

#[test]
fn hold_protocol_streams_until_stopped() {
    let backend = Flat::default();
    let live = backend.live.clone();
    let mut hold = SealTest::new(backend, Protocol::Hold, &RigConfig::default()).unwrap();
    hold.set_hold_wave(10., -70.).unwrap();

    let (consumer, rx) = batch_channel();
    hold.start(consumer).unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 2);
    for _ in 0..3 {
        let batch = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.chunk_size(), 500);
        assert!(batch.primary().iter().all(|&v| v == 0.25));
    }
    hold.stop().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 0);
    // Idempotent
    hold.stop().unwrap();
}

#[test]
fn hardware_error_ends_session_and_frees_tasks() {
    let backend = Flat {
        fail_after: Some(4),
        ..Flat::default()
    };
    let live = backend.live.clone();
    let mut engine = AcquisitionEngine::new(backend);
    let config = RigConfig::default();
    let plan = SessionPlan::configure(
        Waveform::block(10_000., 100., 0., 0.1, 0.5).unwrap(),
        10_000.,
        Protocol::Seal.mode(),
        &config.roles,
        &config.channels,
    )
    .unwrap();
    let (consumer, rx) = batch_channel();
    engine.start(plan, consumer).unwrap();

    assert_eq!(engine.join(), Err(SessionError::Hardware("input overflow".to_string())));
    assert_eq!(rx.try_iter().count(), 4);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(!engine.is_running());
}
