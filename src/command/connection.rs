use std::io::{BufReader, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use super::Exchange;
use crate::error::{BridgeError, Result};
use crate::protocol::codec::{encode_message, read_response};
use crate::protocol::ArgumentMap;

/// A connected, blocking command socket.
pub struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Connection {
    pub fn connect(path: &Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Non-blocking liveness check while idle. The command socket only ever
    /// carries replies, so any readable byte (or EOF) means the peer is
    /// gone or out of step with us.
    pub fn probe(&mut self) -> Result<()> {
        if !self.reader.buffer().is_empty() {
            return Err(BridgeError::protocol(format!(
                "{} unsolicited bytes buffered from daemon",
                self.reader.buffer().len()
            )));
        }

        let mut scratch = [0u8; 4096];
        self.reader.get_ref().set_nonblocking(true)?;
        let outcome = self.reader.get_mut().read(&mut scratch);
        self.reader.get_ref().set_nonblocking(false)?;

        match outcome {
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(())
            }
            Err(e) => Err(e.into()),
            Ok(0) => Err(BridgeError::PeerClosed),
            Ok(n) => Err(BridgeError::protocol(format!(
                "daemon sent {} unsolicited bytes",
                n
            ))),
        }
    }
}

impl Exchange for Connection {
    fn exchange(&mut self, command: &str, args: &ArgumentMap) -> Result<Option<ArgumentMap>> {
        tracing::trace!(command, "sending command");
        self.writer.write_all(&encode_message(command, args))?;
        self.writer.flush()?;
        read_response(&mut self.reader)
    }
}
