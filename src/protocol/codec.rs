use std::io::{BufRead, Read};

use super::escape::{escape, unescape};
use super::{ArgumentMap, DONE_LINE, MAX_ARG_LINES, MAX_LINE_BYTES, OK_LINE};
use crate::error::{BridgeError, Result};

/// Serialize a command (or hook event) and its arguments:
/// the name line, one `key\tvalue...` line per key, then `done`.
pub fn encode_message(command: &str, args: &ArgumentMap) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&escape(command));
    out.push('\n');
    for (key, values) in args.iter() {
        out.push_str(&escape(key));
        for value in values {
            out.push('\t');
            out.push_str(&escape(value));
        }
        out.push('\n');
    }
    out.push_str(DONE_LINE);
    out.push('\n');
    out.into_bytes()
}

/// Serialize a successful response: `ok`, the argument lines, then `done`.
pub fn encode_ok_response(args: &ArgumentMap) -> Vec<u8> {
    encode_message(OK_LINE, args)
}

/// Parse one argument line (without its newline) into an unescaped key and
/// its values. A line needs a non-empty key and at least one tab.
pub fn parse_arg_line(line: &str) -> Result<(String, Vec<String>)> {
    let mut fields = line.split('\t');
    let key = fields.next().unwrap_or_default();
    let values: Vec<String> = fields.map(unescape).collect();

    if key.is_empty() || values.is_empty() {
        return Err(BridgeError::protocol(format!(
            "malformed argument line: {:?}",
            truncate(line, 64)
        )));
    }

    Ok((unescape(key), values))
}

/// Read one newline-terminated line, returned without its terminator.
/// End of stream (even mid-line) is `PeerClosed`.
pub fn read_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;

    if n == 0 {
        return Err(BridgeError::PeerClosed);
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_LINE_BYTES {
            return Err(BridgeError::protocol(format!(
                "line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }
        return Err(BridgeError::PeerClosed);
    }
    buf.pop();

    String::from_utf8(buf).map_err(|_| BridgeError::protocol("line is not valid UTF-8"))
}

/// Read argument lines until `done`. Fails once [`MAX_ARG_LINES`] lines
/// have been read without reaching `done`.
pub fn read_args_until_done<R: BufRead>(reader: &mut R) -> Result<ArgumentMap> {
    let mut args = ArgumentMap::new();
    let mut arg_lines = 0usize;

    loop {
        if arg_lines >= MAX_ARG_LINES {
            return Err(BridgeError::protocol(format!(
                "{} or more argument lines, possibly malicious peer",
                MAX_ARG_LINES
            )));
        }

        let line = read_line(reader)?;
        tracing::trace!(line = %line, "<<");
        if line == DONE_LINE {
            return Ok(args);
        }

        let (key, values) = parse_arg_line(&line)?;
        args.insert(key, values);
        arg_lines += 1;
    }
}

/// Read a command response. `Ok(Some(args))` for `ok`; `Ok(None)` when the
/// daemon reported a failure (the block is skipped up to `done` unparsed).
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Option<ArgumentMap>> {
    let status = read_line(reader)?;
    tracing::trace!(line = %status, "<<");

    if status == OK_LINE {
        return read_args_until_done(reader).map(Some);
    }

    loop {
        let line = read_line(reader)?;
        if line == DONE_LINE {
            return Ok(None);
        }
    }
}

/// Read a full message (name line plus arguments). This is the shape of a
/// request as the daemon sees it, and of a hook event read synchronously.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<(String, ArgumentMap)> {
    let name = unescape(&read_line(reader)?);
    let args = read_args_until_done(reader)?;
    Ok((name, args))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
