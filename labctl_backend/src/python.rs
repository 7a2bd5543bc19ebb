//! Python classes exported by the `labctl_backend` extension module.
//!
//! ```python
//! from labctl_backend import SealTest, LudlStage
//!
//! test = SealTest("seal")
//! test.set_seal_wave(10.0, 0.1, 0.0)
//! test.start(lambda voltage, current: print(voltage.mean(), current.mean()))
//! ...
//! test.stop()
//! ```
//!
//! The callback runs on the acquisition worker thread and receives one numpy array per input
//! channel. `start`, `stop`, `join` and the destructor release the GIL while they wait for
//! the worker, otherwise a worker blocked on the GIL to deliver a batch could never see the
//! stop command.

use numpy::ToPyArray;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use tracing::error;

use labctl_core::config::RigConfig;
use labctl_core::error::SessionError;
use labctl_core::stage::Axes;

use crate::daq::DaqBackend;
use crate::engine::{Batch, BatchConsumer};
use crate::nidaqmx::NiDaq;
use crate::sealtest::{Protocol, SealTest};
use crate::stage::LudlStage;

fn to_py_err(err: SessionError) -> PyErr {
    match err {
        SessionError::Configuration(_) | SessionError::ClockResolution { .. } => {
            PyValueError::new_err(err.to_string())
        }
        SessionError::Hardware(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Stops a session with the GIL released, whether or not the caller holds it.
fn stop_without_gil<B: DaqBackend>(test: &mut SealTest<B>) -> Result<(), SessionError> {
    Python::with_gil(|py| py.allow_threads(|| test.stop()))
}

#[pyclass(name = "SealTest")]
pub struct PySealTest {
    inner: SealTest<NiDaq>,
}

impl Drop for PySealTest {
    // Python runs destructors with the GIL held
    fn drop(&mut self) {
        if let Err(err) = stop_without_gil(&mut self.inner) {
            error!("Session ended with an error: {}", err);
        }
    }
}

#[pymethods]
impl PySealTest {
    /// `protocol` is one of `"seal"`, `"hold"`, `"current-clamp"`, `"zap"`. Without a
    /// `config_path` the built-in rig wiring is used.
    #[new]
    #[pyo3(signature = (protocol, config_path=None))]
    pub fn new(protocol: &str, config_path: Option<&str>) -> PyResult<Self> {
        let protocol: Protocol = protocol.parse().map_err(to_py_err)?;
        let config = match config_path {
            Some(path) => RigConfig::from_json_file(path).map_err(to_py_err)?,
            None => RigConfig::default(),
        };
        let inner = SealTest::new(NiDaq, protocol, &config).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    pub fn set_seal_wave(
        &mut self,
        in_vol_gain: f64,
        diff_voltage: f64,
        lower_voltage: f64,
    ) -> PyResult<()> {
        self.inner
            .set_seal_wave(in_vol_gain, diff_voltage, lower_voltage)
            .map_err(to_py_err)
    }

    pub fn set_hold_wave(&mut self, in_vol_gain: f64, hold_mv: f64) -> PyResult<()> {
        self.inner
            .set_hold_wave(in_vol_gain, hold_mv)
            .map_err(to_py_err)
    }

    pub fn set_current_clamp_wave(
        &mut self,
        in_vol_gain: f64,
        probe_gain: f64,
        current_pa: f64,
    ) -> PyResult<()> {
        self.inner
            .set_current_clamp_wave(in_vol_gain, probe_gain, current_pa)
            .map_err(to_py_err)
    }

    pub fn set_zap_wave(
        &mut self,
        in_vol_gain: f64,
        zap_voltage: f64,
        zap_time_us: f64,
    ) -> PyResult<()> {
        self.inner
            .set_zap_wave(in_vol_gain, zap_voltage, zap_time_us)
            .map_err(to_py_err)
    }

    /// Current output waveform as a numpy array.
    pub fn waveform<'py>(&self, py: Python<'py>) -> &'py numpy::PyArray1<f64> {
        self.inner.waveform().samples().to_pyarray(py)
    }

    /// Starts the session. `callback(primary, secondary)` is called with every batch;
    /// `secondary` is `None` for single-input wiring.
    pub fn start(&mut self, py: Python, callback: PyObject) -> PyResult<()> {
        let consumer: BatchConsumer = Box::new(move |batch: &Batch| {
            Python::with_gil(|py| {
                let primary = batch.primary().to_pyarray(py);
                let secondary = batch.secondary().map(|chan| chan.to_pyarray(py));
                if let Err(err) = callback.call1(py, (primary, secondary)) {
                    error!("Batch callback raised: {}", err);
                }
            })
        });
        let inner = &mut self.inner;
        py.allow_threads(move || inner.start(consumer))
            .map_err(to_py_err)
    }

    pub fn stop(&mut self) -> PyResult<()> {
        stop_without_gil(&mut self.inner).map_err(to_py_err)
    }

    /// Blocks until a pulse session has finished.
    pub fn join(&mut self, py: Python) -> PyResult<()> {
        let inner = &mut self.inner;
        py.allow_threads(move || inner.join()).map_err(to_py_err)
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

#[pyclass(name = "LudlStage")]
pub struct PyLudlStage {
    inner: LudlStage,
}

#[pymethods]
impl PyLudlStage {
    #[new]
    pub fn new(port: &str) -> Self {
        Self {
            inner: LudlStage::open(port),
        }
    }

    /// `(x, y)` as reported by the controller, or `None`.
    pub fn position(&self, py: Python) -> Option<(String, String)> {
        py.allow_threads(|| self.inner.position())
            .map(|pos| (pos.x, pos.y))
    }

    pub fn move_abs(&self, py: Python, x: i64, y: i64) -> bool {
        py.allow_threads(|| self.inner.move_abs(x, y))
    }

    pub fn move_vec(&self, py: Python, x: i64, y: i64) -> bool {
        py.allow_threads(|| self.inner.move_vec(x, y))
    }

    #[pyo3(signature = (x=None, y=None))]
    pub fn move_rel(&self, py: Python, x: Option<i64>, y: Option<i64>) -> PyResult<bool> {
        let axes = match (x, y) {
            (Some(x), Some(y)) => Axes::XY(x, y),
            (Some(x), None) => Axes::X(x),
            (None, Some(y)) => Axes::Y(y),
            (None, None) => return Err(PyValueError::new_err("move_rel needs x, y or both")),
        };
        Ok(py.allow_threads(|| self.inner.move_rel(axes)))
    }

    pub fn home(&self, py: Python) -> bool {
        py.allow_threads(|| self.inner.home())
    }

    pub fn set_zero(&self, py: Python) -> bool {
        py.allow_threads(|| self.inner.set_zero())
    }

    pub fn joystick(&self, py: Python, enabled: bool) -> bool {
        py.allow_threads(|| self.inner.joystick(enabled))
    }

    pub fn motors_stopped(&self, py: Python) -> bool {
        py.allow_threads(|| self.inner.motors_stopped())
    }

    pub fn reset(&self, py: Python) -> bool {
        py.allow_threads(|| self.inner.reset())
    }
}

#[cfg(test)]
mod test {
    use crate::daq::mock::MockDaq;
    use crate::python::*;
    use crossbeam::channel;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn stop_with_gil_held_while_callback_needs_it() {
        pyo3::prepare_freethreaded_python();
        let mut test =
            SealTest::new(MockDaq::new(), Protocol::Seal, &RigConfig::default()).unwrap();
        let (seen_tx, seen_rx) = channel::unbounded();
        let consumer: BatchConsumer = Box::new(move |batch: &Batch| {
            Python::with_gil(|py| {
                let _ = batch.primary().to_pyarray(py);
            });
            let _ = seen_tx.send(());
        });
        test.start(consumer).unwrap();
        seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = channel::bounded(1);
        thread::spawn(move || {
            let result = Python::with_gil(|_py| stop_without_gil(&mut test));
            let _ = done_tx.send((result, test.is_running()));
        });
        let (result, running) = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.is_ok());
        assert!(!running);
    }
}
