// SHOREBENCH CONTROL CONNECTION
// ONE-WAY, NEWLINE-TERMINATED TEXT COMMANDS. NOTHING IS READ BACK.
// A PEER-CLOSE CHECK BEFORE EACH WRITE TURNS A CRASHED ENGINE INTO AN ERROR
// INSTEAD OF A SILENTLY DROPPED COMMAND.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};

use tracing::debug;

use crate::error::{BenchError, Result};

pub const QUIT: &str = "quit";

pub trait ControlStream: Write {
    // TRUE IF THE PEER HAS CLOSED ITS END
    fn peer_closed(&self) -> io::Result<bool>;

    fn close(&mut self) {}
}

impl ControlStream for TcpStream {
    fn peer_closed(&self) -> io::Result<bool> {
        self.set_nonblocking(true)?;
        let mut buf = [0u8; 1];
        let closed = match self.peek(&mut buf) {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(true),
            Err(e) => Err(e),
        };
        self.set_nonblocking(false)?;
        closed
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

pub struct ControlConnection<S: ControlStream = TcpStream> {
    stream: S,
    port: u16,
}

impl ControlConnection<TcpStream> {
    pub fn open(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("localhost", port))
            .map_err(|source| BenchError::Connect { port, source })?;
        stream.set_nodelay(true).ok();
        Ok(Self::over(stream, port))
    }
}

impl<S: ControlStream> ControlConnection<S> {
    pub fn over(stream: S, port: u16) -> Self {
        Self { stream, port }
    }

    pub fn send(&mut self, cmd: &str) -> Result<()> {
        let lost = BenchError::ConnectionLost { port: self.port };
        match self.stream.peer_closed() {
            Ok(false) => {}
            Ok(true) | Err(_) => return Err(lost),
        }
        debug!(port = self.port, cmd, "send");
        self.stream
            .write_all(format!("{}\n", cmd).as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|_| lost)
    }

    // QUIT, THEN AN EMPTY LINE, THEN CLOSE. THE ENGINE EXITS ON QUIT, SO A
    // PEER ALREADY GONE BY THE EMPTY LINE IS NOT AN ERROR.
    pub fn stop(mut self) -> Result<S> {
        self.send(QUIT)?;
        if let Err(e) = self.send("") {
            debug!(port = self.port, error = %e, "peer gone after quit");
        }
        self.stream.close();
        Ok(self.stream)
    }
}
