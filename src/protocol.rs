//! Request framing: inline and bulk forms, interleaved with command lookup
//! exactly as `processCommand`/`readQueryFromClient` do in
//! `examples/original_source/redis_beta/redis.c` — arity is checked against
//! the raw token count *before* a bulk command's trailing length field is
//! peeled off, because that length field itself occupies one of the arity
//! slots on the inline line.

use crate::constants::{MAX_ARGS, MAX_BULK_LEN, MAX_INLINE_LINE_LEN};
use crate::error::ProtocolError;
use crate::strbuf::Str;

/// What the command table knows about a name, as far as framing cares:
/// its arity (total argument count, including the command name itself)
/// and whether its last argument is delivered as a bulk payload.
pub struct CommandInfo {
    pub arity: usize,
    pub is_bulk: bool,
}

/// One fully-framed request, ready for dispatch. `name` has already been
/// case-folded to lowercase; `args` holds every argument after the command
/// name (for a bulk command, the final element is the bulk payload with
/// its trailing CRLF already stripped).
pub struct Request {
    pub name: String,
    pub args: Vec<Str>,
}

enum Mode {
    BetweenCommands,
    AwaitingBulk { name: String, args: Vec<Str>, remaining: u64 },
}

/// Per-client parsing state. Owns the unconsumed input buffer.
pub struct RequestParser {
    inbuf: Vec<u8>,
    mode: Mode,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser { inbuf: Vec::new(), mode: Mode::BetweenCommands }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.inbuf.extend_from_slice(data);
    }

    pub fn has_buffered_input(&self) -> bool {
        !self.inbuf.is_empty()
    }

    /// Try to frame exactly one request out of whatever has been `feed`.
    /// Returns `Ok(None)` when more bytes are needed. Call repeatedly after
    /// a read to drain every complete request already buffered.
    pub fn try_frame(&mut self, lookup: impl Fn(&str) -> Option<CommandInfo>) -> Result<Option<Request>, ProtocolError> {
        loop {
            match &self.mode {
                Mode::BetweenCommands => match self.try_frame_inline(&lookup)? {
                    None => return Ok(None),
                    Some(LineOutcome::Empty) => continue,
                    Some(LineOutcome::Complete(req)) => return Ok(Some(req)),
                    Some(LineOutcome::AwaitBulk { name, args, remaining }) => {
                        self.mode = Mode::AwaitingBulk { name, args, remaining };
                        continue;
                    }
                },
                Mode::AwaitingBulk { remaining, .. } => {
                    if (self.inbuf.len() as u64) < *remaining {
                        return Ok(None);
                    }
                    let Mode::AwaitingBulk { name, mut args, remaining } = std::mem::replace(&mut self.mode, Mode::BetweenCommands) else {
                        unreachable!()
                    };
                    let body: Vec<u8> = self.inbuf.drain(..remaining as usize).collect();
                    let payload_len = (remaining as usize).saturating_sub(2);
                    args.push(Str::from_bytes(body[..payload_len].to_vec()));
                    return Ok(Some(Request { name, args }));
                }
            }
        }
    }

    fn try_frame_inline(&mut self, lookup: &impl Fn(&str) -> Option<CommandInfo>) -> Result<Option<LineOutcome>, ProtocolError> {
        let newline = self.inbuf.iter().position(|&b| b == b'\n');
        let Some(pos) = newline else {
            if self.inbuf.len() > MAX_INLINE_LINE_LEN {
                return Err(ProtocolError::LineTooLong(MAX_INLINE_LINE_LEN));
            }
            return Ok(None);
        };
        let mut line: Vec<u8> = self.inbuf.drain(..=pos).collect();
        line.pop(); // trailing '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let mut tokens: Vec<Vec<u8>> = line.split(|&b| b == b' ').filter(|t| !t.is_empty()).map(|t| t.to_vec()).collect();
        if tokens.is_empty() {
            return Ok(Some(LineOutcome::Empty));
        }
        if tokens.len() > MAX_ARGS {
            tokens.truncate(MAX_ARGS);
        }

        let mut name = String::from_utf8_lossy(&tokens[0]).into_owned();
        name.make_ascii_lowercase();
        let args: Vec<Str> = tokens[1..].iter().map(|t| Str::from_bytes(t.clone())).collect();

        let info = lookup(&name);
        let arity_matches = info.as_ref().map(|i| i.arity == tokens.len()).unwrap_or(false);

        if let Some(info) = info {
            if info.is_bulk && arity_matches {
                let mut args = args;
                let len_tok = args.pop().expect("bulk arity implies at least the length token");
                let declared: i64 = String::from_utf8_lossy(len_tok.as_bytes()).parse().map_err(|_| ProtocolError::InvalidBulkLength)?;
                if declared < 0 {
                    return Err(ProtocolError::InvalidBulkLength);
                }
                let declared = declared as u64;
                if declared > MAX_BULK_LEN {
                    return Err(ProtocolError::BulkTooLarge(declared, MAX_BULK_LEN));
                }
                return Ok(Some(LineOutcome::AwaitBulk { name, args, remaining: declared + 2 }));
            }
        }

        Ok(Some(LineOutcome::Complete(Request { name, args })))
    }
}

enum LineOutcome {
    Empty,
    Complete(Request),
    AwaitBulk { name: String, args: Vec<Str>, remaining: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> Option<CommandInfo> {
        match name {
            "ping" => Some(CommandInfo { arity: 1, is_bulk: false }),
            "get" => Some(CommandInfo { arity: 2, is_bulk: false }),
            "set" => Some(CommandInfo { arity: 3, is_bulk: true }),
            "echo" => Some(CommandInfo { arity: 2, is_bulk: true }),
            _ => None,
        }
    }

    #[test]
    fn inline_request_is_framed_immediately() {
        let mut p = RequestParser::new();
        p.feed(b"PING\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.name, "ping");
        assert!(req.args.is_empty());
    }

    #[test]
    fn command_name_is_case_folded() {
        let mut p = RequestParser::new();
        p.feed(b"PiNg\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.name, "ping");
    }

    #[test]
    fn empty_inline_arguments_are_skipped() {
        let mut p = RequestParser::new();
        p.feed(b"GET  foo\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.args, vec![Str::from("foo")]);
    }

    #[test]
    fn bulk_command_waits_for_body_across_reads() {
        let mut p = RequestParser::new();
        p.feed(b"SET foo 3\r\n");
        assert!(p.try_frame(table).unwrap().is_none());
        p.feed(b"ba");
        assert!(p.try_frame(table).unwrap().is_none());
        p.feed(b"r\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.name, "set");
        assert_eq!(req.args, vec![Str::from("foo"), Str::from("bar")]);
    }

    #[test]
    fn bulk_length_zero_is_just_the_trailing_crlf() {
        let mut p = RequestParser::new();
        p.feed(b"ECHO 0\r\n\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.args, vec![Str::from("")]);
    }

    #[test]
    fn bulk_length_over_limit_is_rejected() {
        let mut p = RequestParser::new();
        p.feed(b"SET foo 9999999999\r\n");
        let err = p.try_frame(table).unwrap_err();
        assert!(matches!(err, ProtocolError::BulkTooLarge(_, _)));
    }

    #[test]
    fn unknown_command_is_framed_for_dispatch_to_reject() {
        let mut p = RequestParser::new();
        p.feed(b"GARBAGE_CMD\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.name, "garbage_cmd");
    }

    #[test]
    fn arity_mismatch_on_bulk_command_is_not_treated_as_bulk_header() {
        // SET has arity 3; one argument is a mismatch, so the "length"
        // token is left alone and the whole line is handed to dispatch
        // (which will produce a wrong-arity error), never entering the
        // bulk-wait state.
        let mut p = RequestParser::new();
        p.feed(b"SET foo\r\n");
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.name, "set");
        assert_eq!(req.args, vec![Str::from("foo")]);
    }

    #[test]
    fn oversize_unframed_line_is_a_protocol_error() {
        let mut p = RequestParser::new();
        p.feed(&vec![b'a'; 2000]);
        let err = p.try_frame(table).unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong(_)));
    }

    #[test]
    fn more_than_sixteen_arguments_are_truncated() {
        let mut p = RequestParser::new();
        let mut line = b"unknown".to_vec();
        for i in 0..20 {
            line.extend_from_slice(format!(" a{i}").as_bytes());
        }
        line.extend_from_slice(b"\r\n");
        p.feed(&line);
        let req = p.try_frame(table).unwrap().unwrap();
        assert_eq!(req.args.len(), 15); // MAX_ARGS(16) - 1 for the command name
    }
}
