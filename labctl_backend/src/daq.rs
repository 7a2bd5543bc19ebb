//! Hardware-neutral DAQ task interface used by the acquisition engine.
//!
//! [`AnalogTask`] mirrors the handful of driver calls a session needs. [`DaqBackend`] creates
//! tasks; the engine calls it on its worker thread, so task handles never leave that thread
//! and only the backend itself must be `Send + Sync`. Releasing a task is the job of its
//! `Drop` implementation.

use ndarray::{Array2, ArrayView1};

use labctl_core::error::Result;
use labctl_core::session::Timing;

pub trait AnalogTask {
    fn add_ao_voltage_chan(&self, name: &str) -> Result<()>;
    fn add_ai_voltage_chan(&self, name: &str) -> Result<()>;
    /// Configures the sample clock. `src = None` selects the device's onboard clock.
    fn cfg_samp_clk_timing(&self, src: Option<&str>, samp_rate: f64, timing: Timing) -> Result<()>;
    /// Routes this task's sample clock to `terminal`.
    fn export_samp_clk(&self, terminal: &str) -> Result<()>;
    /// Writes one channel's samples; returns samples written.
    fn write_analog(&self, samples: ArrayView1<f64>) -> Result<usize>;
    /// Fills `buf` (one row per channel) and returns samples read per channel.
    fn read_analog(&self, buf: &mut Array2<f64>, timeout: f64) -> Result<usize>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn wait_until_done(&self, timeout: f64) -> Result<()>;
}

pub trait DaqBackend: Send + Sync + 'static {
    type Task: AnalogTask;

    fn create_task(&self, name: &str) -> Result<Self::Task>;
}
