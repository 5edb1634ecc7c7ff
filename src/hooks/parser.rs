use std::mem;

use super::HookEvent;
use crate::error::{BridgeError, Result};
use crate::protocol::escape::unescape;
use crate::protocol::{ArgumentMap, DONE_LINE, MAX_ARG_LINES, MAX_LINE_BYTES};

/// Where the parser is inside the current event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsePhase {
    /// Reading the event name line.
    AwaitingCommandName,
    /// At the start of an argument line (or the closing `done`).
    AwaitingArgLine,
    /// The key of an argument line has been read; collecting its values.
    AwaitingValue { key: String, values: Vec<String> },
}

/// Incremental hook event decoder.
///
/// Bytes arrive in arbitrary chunks from a non-blocking socket. [`push`]
/// buffers them and [`next_event`] advances the state machine byte by byte,
/// stopping as soon as one event completes so the caller can dispatch it
/// before looking for the next. Running out of bytes leaves every piece of
/// partial state in place for the next delivery.
///
/// [`push`]: HookParser::push
/// [`next_event`]: HookParser::next_event
#[derive(Debug)]
pub struct HookParser {
    phase: ParsePhase,
    buffer: Vec<u8>,
    pos: usize,
    token: Vec<u8>,
    line_len: usize,
    command: String,
    args: ArgumentMap,
    arg_lines: usize,
}

impl Default for HookParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HookParser {
    pub fn new() -> Self {
        Self {
            phase: ParsePhase::AwaitingCommandName,
            buffer: Vec::new(),
            pos: 0,
            token: Vec::new(),
            line_len: 0,
            command: String::new(),
            args: ArgumentMap::new(),
            arg_lines: 0,
        }
    }

    pub fn phase(&self) -> &ParsePhase {
        &self.phase
    }

    /// True when no partial event is held.
    pub fn is_idle(&self) -> bool {
        self.phase == ParsePhase::AwaitingCommandName
            && self.token.is_empty()
            && self.pos >= self.buffer.len()
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.pos >= self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Advance until one event completes (`Some`) or the buffered bytes run
    /// out (`None`). An error leaves the parser unusable: the stream is out
    /// of step and the connection must be dropped.
    pub fn next_event(&mut self) -> Result<Option<HookEvent>> {
        while self.pos < self.buffer.len() {
            let byte = self.buffer[self.pos];
            self.pos += 1;
            if let Some(event) = self.consume(byte)? {
                return Ok(Some(event));
            }
        }
        self.buffer.clear();
        self.pos = 0;
        Ok(None)
    }

    fn consume(&mut self, byte: u8) -> Result<Option<HookEvent>> {
        if byte == b'\n' {
            self.line_len = 0;
            return self.end_line();
        }

        self.line_len += 1;
        if self.line_len > MAX_LINE_BYTES {
            return Err(BridgeError::protocol(format!(
                "hook line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }

        if byte == b'\t' {
            match self.phase {
                // The event name is the whole line.
                ParsePhase::AwaitingCommandName => self.token.push(byte),
                ParsePhase::AwaitingArgLine => {
                    let key = self.take_token()?;
                    if key.is_empty() {
                        return Err(BridgeError::protocol("hook argument line has an empty key"));
                    }
                    self.phase = ParsePhase::AwaitingValue {
                        key,
                        values: Vec::new(),
                    };
                }
                ParsePhase::AwaitingValue { .. } => {
                    let value = self.take_token()?;
                    if let ParsePhase::AwaitingValue { values, .. } = &mut self.phase {
                        values.push(value);
                    }
                }
            }
            return Ok(None);
        }

        self.token.push(byte);
        Ok(None)
    }

    fn end_line(&mut self) -> Result<Option<HookEvent>> {
        match mem::replace(&mut self.phase, ParsePhase::AwaitingArgLine) {
            ParsePhase::AwaitingCommandName => {
                self.command = self.take_token()?;
                Ok(None)
            }
            ParsePhase::AwaitingArgLine => {
                if self.token != DONE_LINE.as_bytes() {
                    let line = String::from_utf8_lossy(&self.token).into_owned();
                    return Err(BridgeError::protocol(format!(
                        "malformed hook argument line: {:?}",
                        line
                    )));
                }
                self.token.clear();
                self.phase = ParsePhase::AwaitingCommandName;
                self.arg_lines = 0;
                Ok(Some(HookEvent {
                    name: mem::take(&mut self.command),
                    args: mem::take(&mut self.args),
                }))
            }
            ParsePhase::AwaitingValue { key, mut values } => {
                values.push(self.take_token()?);
                self.args.insert(key, values);
                self.arg_lines += 1;
                if self.arg_lines >= MAX_ARG_LINES {
                    return Err(BridgeError::protocol(format!(
                        "{} or more hook argument lines, possibly malicious peer",
                        MAX_ARG_LINES
                    )));
                }
                Ok(None)
            }
        }
    }

    fn take_token(&mut self) -> Result<String> {
        let raw = String::from_utf8(mem::take(&mut self.token))
            .map_err(|_| BridgeError::protocol("hook line is not valid UTF-8"))?;
        Ok(unescape(&raw))
    }
}
