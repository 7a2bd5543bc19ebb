//! Serial transport for the stage controller.
//!
//! [`SerialPortLink`] opens the port for every exchange and closes it when the exchange is
//! over, so a controller that was power-cycled or re-plugged between commands is picked up
//! without any reconnect logic.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::trace;

use labctl_core::error::TransportError;
use labctl_core::stage::{BAUD_RATE, READ_TIMEOUT};

/// One command/reply exchange with a line-oriented device.
pub trait SerialLink {
    /// Writes `command` (terminator included). With `read_reply` set, reads one reply line
    /// and returns it; an empty string means the read timed out before any byte arrived.
    fn exchange(&self, command: &[u8], read_reply: bool) -> Result<Option<String>, TransportError>;
}

#[derive(Clone, Debug)]
pub struct SerialPortLink {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortLink {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: BAUD_RATE,
            read_timeout: READ_TIMEOUT,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl SerialLink for SerialPortLink {
    fn exchange(&self, command: &[u8], read_reply: bool) -> Result<Option<String>, TransportError> {
        let mut conn = serialport::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|err| TransportError::Link {
                port: self.port.clone(),
                reason: err.to_string(),
            })?;

        trace!("{} <- {:?}", self.port, String::from_utf8_lossy(command));
        conn.write_all(command)?;
        conn.flush()?;
        if !read_reply {
            return Ok(None);
        }

        let bytes = read_line(&mut conn)?;
        let reply = String::from_utf8(bytes).map_err(|err| TransportError::MalformedReply {
            command: String::from_utf8_lossy(command).trim_end().to_string(),
            reply: String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })?;
        trace!("{} -> {:?}", self.port, reply);
        Ok(Some(reply))
    }
}

/// Reads bytes up to and including `\n`, stopping early at end of stream or when the port's
/// read timeout expires.
pub fn read_line<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(line)
}

#[cfg(test)]
mod test {
    use crate::serial::*;

    /// Yields its bytes, then times out.
    struct SlowPort {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for SlowPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos == self.data.len() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn reads_up_to_newline() {
        let mut reader: &[u8] = b":A 10 20\r\nN\r\n";
        assert_eq!(read_line(&mut reader).unwrap(), b":A 10 20\r\n".to_vec());
        assert_eq!(read_line(&mut reader).unwrap(), b"N\r\n".to_vec());
        assert!(read_line(&mut reader).unwrap().is_empty());
    }

    #[test]
    fn timeout_returns_partial_line() {
        let mut port = SlowPort {
            data: b"N".to_vec(),
            pos: 0,
        };
        assert_eq!(read_line(&mut port).unwrap(), b"N".to_vec());
        assert!(read_line(&mut port).unwrap().is_empty());
    }

    #[test]
    fn unopenable_port_is_link_error() {
        let link = SerialPortLink::new("/nonexistent/ttyLUDL");
        assert_eq!(link.port(), "/nonexistent/ttyLUDL");
        assert!(matches!(
            link.exchange(b"Where X Y\r", true),
            Err(TransportError::Link { .. })
        ));
    }
}
