use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use labctl_backend::{LudlStage, SerialLink};
use labctl_core::error::TransportError;
use labctl_core::retry::RetryPolicy;

type Outcome = Result<Option<String>, TransportError>;

// Serial link replaying one scripted outcome per exchange.
struct Replay {
    script: RefCell<VecDeque<Outcome>>,
    calls: RefCell<Vec<String>>,
}

impl Replay {
    fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl SerialLink for Replay {
    fn exchange(&self, command: &[u8], _read_reply: bool) -> Outcome {
        self.calls
            .borrow_mut()
            .push(String::from_utf8_lossy(command).into_owned());
        self.script.borrow_mut().pop_front().unwrap_or(Ok(None))
    }
}

fn timed_out() -> Outcome {
    Err(TransportError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        "no reply",
    )))
}

fn link_down() -> Outcome {
    Err(TransportError::Link {
        port: "COM3".to_string(),
        reason: "access denied".to_string(),
    })
}

#[test]
fn position_after_transient_failures() {
    let stage = LudlStage::with_link(Replay::new(vec![
        link_down(),
        timed_out(),
        timed_out(),
        Ok(Some(":A 1500 -200\r\n".to_string())),
    ]))
    .with_retry(RetryPolicy::new(8, Duration::ZERO));

    let pos = stage.position().unwrap();
    assert_eq!((pos.x.as_str(), pos.y.as_str()), ("1500", "-200"));
    assert_eq!(pos.as_steps(), Some((1500, -200)));
    assert_eq!(stage.link().calls.borrow().len(), 4);
    assert!(stage
        .link()
        .calls
        .borrow()
        .iter()
        .all(|cmd| cmd == "Where X Y\r"));
}

#[test]
fn default_policy_gives_up_after_eight_attempts() {
    let stage = LudlStage::with_link(Replay::new((0..8).map(|_| link_down()).collect()));
    let start = Instant::now();
    assert!(!stage.move_abs(10, 20));
    let elapsed = start.elapsed();

    assert_eq!(stage.link().calls.borrow().len(), 8);
    // Seven 200 ms pauses between eight attempts
    assert!(elapsed >= Duration::from_millis(1400));
}

#[test]
fn failing_query_returns_none() {
    let stage = LudlStage::with_link(Replay::new((0..8).map(|_| timed_out()).collect()))
        .with_retry(RetryPolicy::new(8, Duration::ZERO));
    assert_eq!(stage.position(), None);
    assert!(!stage.motors_stopped());
    // position used up the script, status got an empty reply every time
    assert_eq!(stage.link().calls.borrow().len(), 16);
}

#[test]
fn status_polling_until_stopped() {
    let stage = LudlStage::with_link(Replay::new(vec![
        Ok(Some("B\r\n".to_string())),
        Ok(Some("B\r\n".to_string())),
        Ok(Some("N\r\n".to_string())),
    ]))
    .with_retry(RetryPolicy::new(8, Duration::ZERO));

    let mut polls = 0;
    while !stage.motors_stopped() {
        polls += 1;
        assert!(polls < 10);
    }
    assert_eq!(polls, 2);
}
