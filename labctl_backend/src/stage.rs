//! Ludl MAC5000 stage driver.
//!
//! Every public operation is one [`StageCommand`] sent over a fresh connection and wrapped
//! in the stage's [`RetryPolicy`]. Operations never return errors: once the retry budget is
//! spent they return their failure value (`false` or `None`) and the cause is in the log.

use std::thread;
use std::time::Duration;

use tracing::info;

use labctl_core::error::TransportError;
use labctl_core::retry::RetryPolicy;
use labctl_core::stage::{
    parse_position, parse_status, Axes, StageCommand, StagePosition, RESET_SETTLE,
};

use crate::serial::{SerialLink, SerialPortLink};

pub struct LudlStage<L: SerialLink = SerialPortLink> {
    link: L,
    retry: RetryPolicy,
    reset_settle: Duration,
}

impl LudlStage<SerialPortLink> {
    /// Stage on a serial port such as `/dev/ttyUSB0` or `COM3`.
    pub fn open(port: &str) -> Self {
        Self::with_link(SerialPortLink::new(port))
    }
}

impl<L: SerialLink> LudlStage<L> {
    pub fn with_link(link: L) -> Self {
        Self {
            link,
            retry: RetryPolicy::default(),
            reset_settle: RESET_SETTLE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Current position, or `None` when the controller gave no usable position.
    pub fn position(&self) -> Option<StagePosition> {
        let cmd = StageCommand::Where;
        self.retry.run(cmd.name(), || {
            let reply = self.query(&cmd)?;
            Ok::<_, TransportError>(parse_position(&reply))
        })
    }

    pub fn move_abs(&self, x: i64, y: i64) -> bool {
        self.send(StageCommand::Move { x, y })
    }

    pub fn move_vec(&self, x: i64, y: i64) -> bool {
        self.send(StageCommand::VectorMove { x, y })
    }

    pub fn move_rel(&self, axes: Axes) -> bool {
        self.send(StageCommand::MoveRelative(axes))
    }

    pub fn home(&self) -> bool {
        self.send(StageCommand::Home)
    }

    pub fn set_zero(&self) -> bool {
        self.send(StageCommand::SetZero)
    }

    pub fn joystick(&self, enabled: bool) -> bool {
        self.send(StageCommand::Joystick(enabled))
    }

    /// `true` once both motors have stopped. Gives `false` while moving and when the
    /// controller cannot be reached.
    pub fn motors_stopped(&self) -> bool {
        let cmd = StageCommand::Status;
        self.retry.run::<bool, TransportError, _>(cmd.name(), || {
            let reply = self.query(&cmd)?;
            parse_status(&cmd.to_wire(), &reply)
        })
    }

    /// Resets the controller and waits for it to come back.
    pub fn reset(&self) -> bool {
        let acked = self.send(StageCommand::Reset);
        if acked {
            info!("Stage reset, waiting {:?}", self.reset_settle);
            thread::sleep(self.reset_settle);
        }
        acked
    }

    fn send(&self, cmd: StageCommand) -> bool {
        self.retry.run(cmd.name(), || {
            self.link.exchange(&cmd.encode(), false)?;
            Ok::<_, TransportError>(true)
        })
    }

    fn query(&self, cmd: &StageCommand) -> Result<String, TransportError> {
        Ok(self
            .link
            .exchange(&cmd.encode(), cmd.expects_reply())?
            .unwrap_or_default())
    }
}
