//! Single-producer command channel between a session owner and its worker thread.
//!
//! Every `send` bumps a message counter under the mutex. A receiver remembers the last
//! counter value it has seen, so a command posted before the worker gets to look is never
//! lost, and a receiver created after earlier sessions ignores their stale commands.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerCmd {
    Run,
    Stop,
}

pub struct CmdChan {
    cmd: Arc<Mutex<(usize, WorkerCmd)>>, // (msg_num, worker_cmd)
    condvar: Arc<Condvar>,
}

impl CmdChan {
    pub fn new() -> Self {
        Self {
            cmd: Arc::new(Mutex::new((0, WorkerCmd::Run))),
            condvar: Arc::new(Condvar::new()),
        }
    }

    pub fn new_recvr(&self) -> CmdRecvr {
        // The first message the new receiver reacts to is `msg_num + 1`
        let (msg_num, _cmd_val) = &*self.cmd.lock();
        CmdRecvr {
            cmd: self.cmd.clone(),
            condvar: self.condvar.clone(),
            viewed_msg_num: *msg_num,
        }
    }

    pub fn send(&self, cmd: WorkerCmd) {
        let mut mutex_guard = self.cmd.lock();
        let (msg_num, cmd_val) = &mut *mutex_guard;
        *cmd_val = cmd;
        *msg_num += 1;
        self.condvar.notify_all();
    }
}

impl Default for CmdChan {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CmdRecvr {
    cmd: Arc<Mutex<(usize, WorkerCmd)>>,
    condvar: Arc<Condvar>,
    viewed_msg_num: usize,
}

impl CmdRecvr {
    /// Latest command posted since the previous poll, without blocking.
    ///
    /// When several commands were posted in between, only the most recent one is returned.
    pub fn poll(&mut self) -> Option<WorkerCmd> {
        let (msg_num, cmd_val) = &*self.cmd.lock();
        if *msg_num == self.viewed_msg_num {
            return None;
        }
        self.viewed_msg_num = *msg_num;
        Some(*cmd_val)
    }

    /// Waits up to `timeout` for a new command.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<WorkerCmd> {
        let mut mutex_guard = self.cmd.lock();
        if mutex_guard.0 == self.viewed_msg_num {
            self.condvar.wait_for(&mut mutex_guard, timeout);
        }
        let (msg_num, cmd_val) = &*mutex_guard;
        if *msg_num == self.viewed_msg_num {
            return None;
        }
        self.viewed_msg_num = *msg_num;
        Some(*cmd_val)
    }
}
