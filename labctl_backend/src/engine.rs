//! Acquisition/generation engine.
//!
//! An [`AcquisitionEngine`] runs one [`SessionPlan`] at a time on a dedicated worker thread:
//!
//! 1. **Setup** (worker thread): create the output and input tasks, add channels, export the
//!    input sample clock when the clock pairing needs it, configure timing on both tasks with
//!    the output task importing the input clock, write the whole waveform, then start the
//!    output task followed by the input task. The output task is armed first and waits for
//!    the input clock, so both sides begin on the same edge. The outcome of setup is handed
//!    back to [`AcquisitionEngine::start`] before it returns.
//! 2. **Streaming** (continuous mode): read exactly one chunk per input channel into a fixed
//!    buffer, pass it to the consumer as a [`Batch`], and check for a stop command once per
//!    iteration. A driver error ends the session.
//! 3. **Pulse mode**: wait for the finite output to finish. Nothing is read back.
//!
//! Tasks are owned by the worker and released when it returns, on every exit path.

use crossbeam::channel::{self, Receiver, Sender};
use ndarray::{Array2, ArrayView1};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use labctl_core::error::{Result, SessionError};
use labctl_core::session::{SessionMode, SessionPlan};
use labctl_core::utils::TickTimer;

use crate::daq::{AnalogTask, DaqBackend};
use crate::utils::ChunkCounter;
use crate::worker_cmd_chan::{CmdChan, CmdRecvr, WorkerCmd};

/// One chunk of synchronized samples from every input channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    seq: u64,
    start_pos: u64,
    data: Array2<f64>,
}

impl Batch {
    /// Sequence number, starting at 0 for the first batch of a session.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Acquisition position of the first sample in this batch.
    pub fn start_pos(&self) -> u64 {
        self.start_pos
    }

    /// Samples as a `channels x chunk_size` matrix, rows in input role order.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn channel(&self, idx: usize) -> Option<ArrayView1<'_, f64>> {
        (idx < self.num_channels()).then(|| self.data.row(idx))
    }

    pub fn primary(&self) -> ArrayView1<'_, f64> {
        self.data.row(0)
    }

    pub fn secondary(&self) -> Option<ArrayView1<'_, f64>> {
        self.channel(1)
    }

    pub fn chunk_size(&self) -> usize {
        self.data.ncols()
    }

    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }
}

/// Receives every batch, synchronously on the worker thread.
pub type BatchConsumer = Box<dyn FnMut(&Batch) + Send>;

/// Consumer forwarding batches to another thread. Batches are dropped silently once the
/// receiver is gone.
pub fn batch_channel() -> (BatchConsumer, Receiver<Batch>) {
    let (tx, rx) = channel::unbounded();
    let consumer: BatchConsumer = Box::new(move |batch: &Batch| {
        let _ = tx.send(batch.clone());
    });
    (consumer, rx)
}

pub struct AcquisitionEngine<B: DaqBackend> {
    backend: Arc<B>,
    cmd_chan: CmdChan,
    worker: Option<JoinHandle<Result<()>>>,
}

impl<B: DaqBackend> AcquisitionEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            cmd_chan: CmdChan::new(),
            worker: None,
        }
    }

    /// Whether a worker is alive. A session that ended on its own (pulse finished, driver
    /// error) no longer counts as running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Starts a session and returns once its tasks are configured and running.
    ///
    /// # Errors
    ///
    /// Setup failures of the worker (`Hardware`, or `Configuration` for names the driver
    /// rejects) are returned here; no worker is left behind. Starting while another session
    /// is running is a `Configuration` error.
    pub fn start(&mut self, plan: SessionPlan, consumer: BatchConsumer) -> Result<()> {
        if self.is_running() {
            return Err(SessionError::Configuration(
                "A session is already running, stop it first".to_string(),
            ));
        }
        if let Err(err) = self.join() {
            warn!("Previous session ended with an error: {}", err);
        }

        // Subscribe before spawning so an immediate stop() is not missed
        let recvr = self.cmd_chan.new_recvr();
        let (ready_tx, ready_rx) = channel::bounded(1);
        let backend = self.backend.clone();
        let thread_name = format!("acq-{}", plan.read_device());
        info!("Starting {}", plan);

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_session(&*backend, &plan, consumer, recvr, ready_tx))
            .map_err(|err| {
                SessionError::Hardware(format!("Failed to spawn acquisition worker: {}", err))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SessionError::Hardware(
                    "Acquisition worker exited during setup".to_string(),
                ))
            }
        }
    }

    /// Posts a stop command and waits for the worker to release its tasks.
    ///
    /// A no-op when nothing was started. Returns the error that ended the session, if any.
    pub fn stop(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        self.cmd_chan.send(WorkerCmd::Stop);
        self.join()
    }

    /// Waits for the worker to finish on its own (e.g. a pulse) and returns its result.
    pub fn join(&mut self) -> Result<()> {
        match self.worker.take() {
            None => Ok(()),
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(SessionError::Hardware(
                    "Acquisition worker panicked".to_string(),
                ))
            }),
        }
    }
}

impl<B: DaqBackend> Drop for AcquisitionEngine<B> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("Session ended with an error: {}", err);
        }
    }
}

fn run_session<B: DaqBackend>(
    backend: &B,
    plan: &SessionPlan,
    consumer: BatchConsumer,
    recvr: CmdRecvr,
    ready: Sender<Result<()>>,
) -> Result<()> {
    let mut timer = TickTimer::new();
    let (write_task, read_task) = match setup_tasks(backend, plan) {
        Ok(tasks) => {
            let _ = ready.send(Ok(()));
            tasks
        }
        Err(err) => {
            error!("Session setup failed: {}", err);
            let _ = ready.send(Err(err.clone()));
            return Err(err);
        }
    };
    timer.tick_log("session setup");

    let result = match plan.mode() {
        SessionMode::Continuous { chunk_size } => {
            stream_loop(plan, chunk_size, &read_task, consumer, recvr)
        }
        SessionMode::Pulse => play_pulse(plan, &write_task, recvr),
    };
    if let Err(err) = &result {
        error!("Session aborted: {}", err);
    }

    // Tasks are released on drop; an explicit stop first surfaces driver errors in the log
    for (label, task) in [("input", &read_task), ("output", &write_task)] {
        if let Err(err) = task.stop() {
            warn!("Stopping {} task failed: {}", label, err);
        }
    }
    drop(read_task);
    drop(write_task);
    timer.tick_log("session teardown");
    info!("Session finished");
    result
}

fn setup_tasks<B: DaqBackend>(backend: &B, plan: &SessionPlan) -> Result<(B::Task, B::Task)> {
    let write_task = backend.create_task("write")?;
    let read_task = backend.create_task("read")?;

    write_task.add_ao_voltage_chan(&plan.output().channel.name())?;
    for input in plan.inputs() {
        read_task.add_ai_voltage_chan(&input.channel.name())?;
    }

    let clock = plan.clock();
    if let Some(terminal) = clock.export_terminal() {
        read_task.export_samp_clk(terminal)?;
    }
    read_task.cfg_samp_clk_timing(None, plan.samp_rate(), plan.input_timing())?;
    write_task.cfg_samp_clk_timing(
        Some(&clock.write_clock_src()),
        plan.samp_rate(),
        plan.output_timing(),
    )?;
    debug!("Clock pairing {:?}", clock);

    let waveform = plan.waveform();
    let written = write_task.write_analog(waveform.samples())?;
    if written != waveform.len() {
        return Err(SessionError::Hardware(format!(
            "Wrote {} of {} waveform samples",
            written,
            waveform.len()
        )));
    }

    // Output first: it waits on the input clock, which only runs once the input task starts
    write_task.start()?;
    read_task.start()?;
    Ok((write_task, read_task))
}

fn stream_loop<T: AnalogTask>(
    plan: &SessionPlan,
    chunk_size: usize,
    read_task: &T,
    mut consumer: BatchConsumer,
    mut recvr: CmdRecvr,
) -> Result<()> {
    let mut buf = Array2::zeros((plan.inputs().len(), chunk_size));
    let mut counter = ChunkCounter::new(chunk_size);
    let timeout = plan.read_timeout();

    while recvr.poll() != Some(WorkerCmd::Stop) {
        let nread = read_task.read_analog(&mut buf, timeout)?;
        if nread != chunk_size {
            return Err(SessionError::Hardware(format!(
                "Read {} of {} samples per channel",
                nread, chunk_size
            )));
        }
        let (seq, start_pos, _end_pos) = counter.tick_next();
        let batch = Batch {
            seq,
            start_pos,
            data: buf.clone(),
        };
        consumer(&batch);
    }
    info!("Stop requested after {} batches", counter.pos() / chunk_size as u64);
    Ok(())
}

fn play_pulse<T: AnalogTask>(plan: &SessionPlan, write_task: &T, mut recvr: CmdRecvr) -> Result<()> {
    let playback = Duration::from_secs_f64(plan.waveform().duration(plan.samp_rate()));
    if recvr.recv_timeout(playback) == Some(WorkerCmd::Stop) {
        info!("Pulse interrupted");
        return Ok(());
    }
    write_task.wait_until_done(plan.pulse_timeout())
}
