//! Hardware side of the patch rig controller.
//!
//! - [`engine`]: acquisition/generation sessions on a worker thread
//! - [`daq`]: task abstraction the engine drives; [`nidaqmx`] implements it for NI cards
//!   (feature `nidaqmx`)
//! - [`sealtest`]: seal, hold, current clamp and zap protocols
//! - [`stage`], [`serial`]: Ludl stage driver over a per-command serial connection
//! - `python`: pyo3 classes (feature `python`)

pub mod daq;
pub mod engine;
#[cfg(feature = "nidaqmx")]
pub mod nidaqmx;
#[cfg(feature = "python")]
pub mod python;
pub mod sealtest;
pub mod serial;
pub mod stage;
pub mod utils;
pub mod worker_cmd_chan;

pub use crate::daq::{AnalogTask, DaqBackend};
pub use crate::engine::{batch_channel, AcquisitionEngine, Batch, BatchConsumer};
#[cfg(feature = "nidaqmx")]
pub use crate::nidaqmx::{NiDaq, NiTask};
pub use crate::sealtest::{Protocol, SealTest};
pub use crate::serial::{SerialLink, SerialPortLink};
pub use crate::stage::LudlStage;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn labctl_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::PySealTest>()?;
    m.add_class::<python::PyLudlStage>()?;
    Ok(())
}
