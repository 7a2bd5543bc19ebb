//! Ludl MAC5000 command set: wire formatting and reply parsing.
//!
//! Nothing here touches a serial port. The backend's stage driver encodes a
//! [`StageCommand`], exchanges it over a fresh connection, and hands the reply text to
//! [`parse_position`] or [`parse_status`].

use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

pub const BAUD_RATE: u32 = 9600;
pub const LINE_TERMINATOR: &str = "\r";
/// Read timeout for commands that expect a reply.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Time the controller needs to come back after `REMRES`.
pub const RESET_SETTLE: Duration = Duration::from_secs(5);

/// Axis selection for relative moves. Steps are signed controller units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axes {
    X(i64),
    Y(i64),
    XY(i64, i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageCommand {
    /// Query the current X/Y position.
    Where,
    /// Absolute move, axes in sequence.
    Move { x: i64, y: i64 },
    /// Absolute move with both axes interpolated along a straight line.
    VectorMove { x: i64, y: i64 },
    MoveRelative(Axes),
    Home,
    /// Declare the current position as the origin.
    SetZero,
    /// Enable (`true`) or disable the joystick.
    Joystick(bool),
    /// Query whether the motors are still moving.
    Status,
    /// Controller reset.
    Reset,
}

impl StageCommand {
    /// Short operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StageCommand::Where => "position",
            StageCommand::Move { .. } => "move",
            StageCommand::VectorMove { .. } => "vector move",
            StageCommand::MoveRelative(_) => "relative move",
            StageCommand::Home => "home",
            StageCommand::SetZero => "set zero",
            StageCommand::Joystick(_) => "joystick",
            StageCommand::Status => "status",
            StageCommand::Reset => "reset",
        }
    }

    /// Command text without the line terminator.
    pub fn to_wire(&self) -> String {
        match *self {
            StageCommand::Where => "Where X Y".to_string(),
            StageCommand::Move { x, y } => format!("Move X = {} Y = {}", x, y),
            StageCommand::VectorMove { x, y } => format!("Vmove X = {} Y = {}", x, y),
            StageCommand::MoveRelative(Axes::X(x)) => format!("Movrel X = {}", x),
            StageCommand::MoveRelative(Axes::Y(y)) => format!("Movrel Y = {}", y),
            StageCommand::MoveRelative(Axes::XY(x, y)) => format!("Movrel X = {} Y = {}", x, y),
            StageCommand::Home => "Home".to_string(),
            StageCommand::SetZero => "Here X = 0 Y = 0".to_string(),
            StageCommand::Joystick(true) => "Joystick X+ Y+".to_string(),
            StageCommand::Joystick(false) => "Joystick X- Y-".to_string(),
            StageCommand::Status => "Status".to_string(),
            StageCommand::Reset => "REMRES".to_string(),
        }
    }

    /// Bytes written to the port.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_wire().into_bytes();
        bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
        bytes
    }

    pub fn expects_reply(&self) -> bool {
        matches!(self, StageCommand::Where | StageCommand::Status)
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Stage coordinates exactly as the controller reported them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagePosition {
    pub x: String,
    pub y: String,
}

impl StagePosition {
    /// Integer step counts, when both coordinates are numeric.
    pub fn as_steps(&self) -> Option<(i64, i64)> {
        Some((self.x.parse().ok()?, self.y.parse().ok()?))
    }
}

impl fmt::Display for StagePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Parses a `Where` reply such as `":A 1500 -200"`.
///
/// Replies with fewer than three whitespace-separated tokens carry no position and give
/// `None`. Extra trailing tokens are ignored.
///
/// ```
/// use labctl_core::stage::parse_position;
///
/// let pos = parse_position(":A 1500 -200\n").unwrap();
/// assert_eq!((pos.x.as_str(), pos.y.as_str()), ("1500", "-200"));
/// assert!(parse_position(":A 1500").is_none());
/// ```
pub fn parse_position(reply: &str) -> Option<StagePosition> {
    let tokens: Vec<&str> = reply.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    Some(StagePosition {
        x: tokens[1].to_string(),
        y: tokens[2].to_string(),
    })
}

/// Parses a `Status` reply. `"N"` means the motors are stopped, any other single token
/// means they are still running.
pub fn parse_status(command: &str, reply: &str) -> Result<bool, TransportError> {
    let tokens: Vec<&str> = reply.split_whitespace().collect();
    match tokens.as_slice() {
        [token] => Ok(*token == "N"),
        _ => Err(TransportError::MalformedReply {
            command: command.to_string(),
            reply: reply.to_string(),
        }),
    }
}
