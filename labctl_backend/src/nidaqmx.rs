//! Minimal rust wrapper for the parts of the NI-DAQmx C library a patch session uses.
//!
//! [`NiTask`] owns one DAQmx task handle and implements [`AnalogTask`]; [`NiDaq`] is the
//! matching [`DaqBackend`]. Every driver call goes through [`daqmx_call`], which turns a
//! negative status code into [`SessionError::Hardware`] carrying the driver's extended error
//! string. In addition to being logged, driver errors are appended to `nidaqmx_error.logs` in
//! the working directory of the calling process.
//!
//! Dropping an `NiTask` clears the task, which also stops it if it is still running.
//!
//! For details on the underlying calls, refer to the
//! [NI-DAQmx C Reference](https://www.ni.com/docs/en-US/bundle/ni-daqmx-c-api-ref/page/cdaqmx/help_file_title.html).

use libc;
use ndarray::{Array2, ArrayView1};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::{debug, error, warn};

use labctl_core::error::{Result, SessionError};
use labctl_core::session::{SampleMode, Timing};

use crate::daq::{AnalogTask, DaqBackend};

type CConstStr = *const libc::c_char;
type CCharBuf = *mut libc::c_char;
type CFloat64 = libc::c_double;
type CUint32 = libc::c_uint;
type CUint64 = libc::c_ulonglong;
type CBool32 = libc::c_uint;
type CInt32 = libc::c_int;
pub type TaskHandle = *mut libc::c_void;

pub const DAQMX_VAL_RISING: CInt32 = 10280;
pub const DAQMX_VAL_VOLTS: CInt32 = 10348;
pub const DAQMX_VAL_FINITESAMPS: CInt32 = 10178;
pub const DAQMX_VAL_CONTSAMPS: CInt32 = 10123;
pub const DAQMX_VAL_CFG_DEFAULT: CInt32 = -1;
pub const DAQMX_VAL_GROUPBYCHANNEL: CBool32 = 0;
pub const DAQMX_VAL_WAITINFINITELY: CFloat64 = -1.0;
pub const DAQMX_VAL_SAMPLECLOCK: CInt32 = 12487;

const ERROR_LOG: &str = "./nidaqmx_error.logs";
const VOLTAGE_RANGE: (f64, f64) = (-10., 10.);

#[link(name = "NIDAQmx")]
extern "C" {
    fn DAQmxGetExtendedErrorInfo(errorString: CCharBuf, bufferSize: CUint32) -> CInt32;

    fn DAQmxCreateTask(taskName: CConstStr, taskHandle_ptr: &mut TaskHandle) -> CInt32;
    fn DAQmxStartTask(handle: TaskHandle) -> CInt32;
    fn DAQmxStopTask(handle: TaskHandle) -> CInt32;
    fn DAQmxClearTask(handle: TaskHandle) -> CInt32;
    fn DAQmxWaitUntilTaskDone(handle: TaskHandle, timeToWait: CFloat64) -> CInt32;

    fn DAQmxCfgSampClkTiming(
        handle: TaskHandle,
        src: CConstStr,
        rate: CFloat64,
        activeEdge: CInt32,
        sampleMode: CInt32,
        sampsPerChan: CUint64,
    ) -> CInt32;

    fn DAQmxCreateAOVoltageChan(
        handle: TaskHandle,
        name: CConstStr,
        assigned_name: CConstStr,
        minVal: CFloat64,
        maxVal: CFloat64,
        units: CInt32,
        customScaleName: CConstStr,
    ) -> CInt32;
    fn DAQmxCreateAIVoltageChan(
        handle: TaskHandle,
        name: CConstStr,
        assigned_name: CConstStr,
        terminalConfig: CInt32,
        minVal: CFloat64,
        maxVal: CFloat64,
        units: CInt32,
        customScaleName: CConstStr,
    ) -> CInt32;

    fn DAQmxWriteAnalogF64(
        handle: TaskHandle,
        seqLen: CInt32,
        autoStart: CBool32,
        timeout: CFloat64,
        dataLayout: CBool32,
        writeArray: *const CFloat64,
        sampsPerChanWritten: *mut CInt32,
        reserved: *mut CBool32,
    ) -> CInt32;
    fn DAQmxReadAnalogF64(
        handle: TaskHandle,
        numSampsPerChan: CInt32,
        timeout: CFloat64,
        fillMode: CBool32,
        readArray: *mut CFloat64,
        arraySizeInSamps: CUint32,
        sampsPerChanRead: *mut CInt32,
        reserved: *mut CBool32,
    ) -> CInt32;

    fn DAQmxExportSignal(handle: TaskHandle, signalID: CInt32, outputTerminal: CConstStr)
        -> CInt32;
}

/// Calls a DAQmx C-function and converts its status code.
///
/// A negative code is an error: the extended error info is fetched, logged, appended to
/// `nidaqmx_error.logs` and returned as [`SessionError::Hardware`]. A positive code is a
/// driver warning and only logged.
pub fn daqmx_call<F: FnOnce() -> CInt32>(func: F) -> Result<()> {
    let err_code = func();
    if err_code < 0 {
        let mut err_buff = [0 as libc::c_char; 2048];
        unsafe {
            DAQmxGetExtendedErrorInfo(err_buff.as_mut_ptr(), 2048 as CUint32);
        }
        let error_string = unsafe { std::ffi::CStr::from_ptr(err_buff.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        error!("DAQmx Error {}: {}", err_code, error_string);
        if let Err(err) = append_error_log(&error_string) {
            warn!("Failed to write {}: {}", ERROR_LOG, err);
        }
        return Err(SessionError::Hardware(error_string));
    }
    if err_code > 0 {
        warn!("DAQmx warning code {}", err_code);
    }
    Ok(())
}

fn append_error_log(error_string: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(ERROR_LOG)?;
    writeln!(file, "DAQmx Error: {}", error_string)
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| {
        SessionError::Configuration(format!("Name {:?} contains an interior NUL byte", s))
    })
}

/// One NI-DAQmx task. Created and dropped on the thread that uses it.
pub struct NiTask {
    handle: TaskHandle,
}

impl NiTask {
    /// Creates an unnamed task; the driver assigns a unique name.
    pub fn new() -> Result<Self> {
        let mut taskhandle: TaskHandle = std::ptr::null_mut();
        let task_name_cstr = cstring("")?;
        daqmx_call(|| unsafe { DAQmxCreateTask(task_name_cstr.as_ptr(), &mut taskhandle) })?;
        Ok(Self { handle: taskhandle })
    }

    pub fn clear(&self) -> Result<()> {
        daqmx_call(|| unsafe { DAQmxClearTask(self.handle) })
    }
}

impl AnalogTask for NiTask {
    fn add_ao_voltage_chan(&self, name: &str) -> Result<()> {
        let name_cstr = cstring(name)?;
        let assigned_name_cstr = cstring("")?;
        daqmx_call(|| unsafe {
            DAQmxCreateAOVoltageChan(
                self.handle,
                name_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                VOLTAGE_RANGE.0,
                VOLTAGE_RANGE.1,
                DAQMX_VAL_VOLTS,
                std::ptr::null(),
            )
        })
    }

    fn add_ai_voltage_chan(&self, name: &str) -> Result<()> {
        let name_cstr = cstring(name)?;
        let assigned_name_cstr = cstring("")?;
        daqmx_call(|| unsafe {
            DAQmxCreateAIVoltageChan(
                self.handle,
                name_cstr.as_ptr(),
                assigned_name_cstr.as_ptr(),
                DAQMX_VAL_CFG_DEFAULT,
                VOLTAGE_RANGE.0,
                VOLTAGE_RANGE.1,
                DAQMX_VAL_VOLTS,
                std::ptr::null(),
            )
        })
    }

    fn cfg_samp_clk_timing(&self, src: Option<&str>, samp_rate: f64, timing: Timing) -> Result<()> {
        // Empty source selects the onboard clock
        let src_cstring = cstring(src.unwrap_or(""))?;
        let sample_mode = match timing.mode {
            SampleMode::Continuous => DAQMX_VAL_CONTSAMPS,
            SampleMode::Finite => DAQMX_VAL_FINITESAMPS,
        };
        daqmx_call(|| unsafe {
            DAQmxCfgSampClkTiming(
                self.handle,
                src_cstring.as_ptr(),
                samp_rate as CFloat64,
                DAQMX_VAL_RISING,
                sample_mode,
                timing.samps_per_chan as CUint64,
            )
        })
    }

    fn export_samp_clk(&self, terminal: &str) -> Result<()> {
        let output_terminal_cstr = cstring(terminal)?;
        daqmx_call(|| unsafe {
            DAQmxExportSignal(
                self.handle,
                DAQMX_VAL_SAMPLECLOCK,
                output_terminal_cstr.as_ptr(),
            )
        })
    }

    fn write_analog(&self, samples: ArrayView1<f64>) -> Result<usize> {
        let data = samples.as_standard_layout();
        let mut nwritten: CInt32 = 0;
        daqmx_call(|| unsafe {
            DAQmxWriteAnalogF64(
                self.handle,
                data.len() as CInt32,
                false as CBool32,
                DAQMX_VAL_WAITINFINITELY,
                DAQMX_VAL_GROUPBYCHANNEL,
                data.as_ptr(),
                &mut nwritten as *mut CInt32,
                std::ptr::null_mut(),
            )
        })?;
        Ok(nwritten as usize)
    }

    fn read_analog(&self, buf: &mut Array2<f64>, timeout: f64) -> Result<usize> {
        if !buf.is_standard_layout() {
            return Err(SessionError::Hardware(
                "Read buffer must be contiguous in row-major order".to_string(),
            ));
        }
        let samps_per_chan = buf.ncols();
        let array_size = buf.len();
        let mut nread: CInt32 = 0;
        daqmx_call(|| unsafe {
            DAQmxReadAnalogF64(
                self.handle,
                samps_per_chan as CInt32,
                timeout as CFloat64,
                DAQMX_VAL_GROUPBYCHANNEL,
                buf.as_mut_ptr(),
                array_size as CUint32,
                &mut nread as *mut CInt32,
                std::ptr::null_mut(),
            )
        })?;
        Ok(nread as usize)
    }

    fn start(&self) -> Result<()> {
        daqmx_call(|| unsafe { DAQmxStartTask(self.handle) })
    }

    fn stop(&self) -> Result<()> {
        daqmx_call(|| unsafe { DAQmxStopTask(self.handle) })
    }

    fn wait_until_done(&self, timeout: f64) -> Result<()> {
        daqmx_call(|| unsafe { DAQmxWaitUntilTaskDone(self.handle, timeout as CFloat64) })
    }
}

// Define deletion behavior
impl Drop for NiTask {
    fn drop(&mut self) {
        // Errors are already logged by `daqmx_call`
        let _ = self.clear();
    }
}

/// The NI-DAQmx driver as a [`DaqBackend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NiDaq;

impl DaqBackend for NiDaq {
    type Task = NiTask;

    fn create_task(&self, name: &str) -> Result<NiTask> {
        debug!("Creating DAQmx task for {}", name);
        NiTask::new()
    }
}
