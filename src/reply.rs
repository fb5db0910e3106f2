//! Reply construction. A `Reply` is a short sequence of wire-ready chunks
//! pushed onto a client's outgoing `DList<Obj>` exactly as `addReply`/
//! `addReplySds` push pre-framed objects onto `c->reply` in
//! `examples/original_source/redis_beta/redis.c` — there is no separate
//! serialization pass, the queued bytes already are the wire format.

use crate::object::{new_str, Obj, SHARED};
use crate::strbuf::Str;
use std::fmt::Write as _;

/// One or more wire chunks to enqueue, in order, for a single reply.
pub enum Reply {
    /// A single pre-framed shared or ad-hoc object (status line, `nil\r\n`,
    /// `0\r\n`/`1\r\n`, etc).
    Raw(Obj),
    /// `-ERR <message>\r\n`, matching every `addReplySds(c,
    /// sdsnew("-ERR ..."))` call site.
    Error(String),
    /// A bulk value reply: `<len>\r\n` then the payload then a trailing
    /// `\r\n`, matching `getCommand`'s success arm.
    Bulk(Obj),
    /// A value-position type error inside what would otherwise be a bulk
    /// reply: `<-len(msg)>\r\n<msg>\r\n`, matching `getCommand`'s
    /// `o->type != REDIS_STRING` arm and the equivalent list-command arms.
    BulkTypeError(String),
    /// A bare integer reply (no colon prefix, unlike later Redis
    /// protocols): `<n>\r\n`.
    Integer(i64),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Raw(SHARED.ok.clone())
    }

    pub fn pong() -> Reply {
        Reply::Raw(SHARED.pong.clone())
    }

    pub fn nil() -> Reply {
        Reply::Raw(SHARED.nil.clone())
    }

    pub fn zero() -> Reply {
        Reply::Raw(SHARED.zero.clone())
    }

    pub fn one() -> Reply {
        Reply::Raw(SHARED.one.clone())
    }

    pub fn bool(b: bool) -> Reply {
        if b {
            Reply::one()
        } else {
            Reply::zero()
        }
    }

    /// The shared `-ERR\r\n` singleton, for call sites that have no more
    /// specific message to report (matches `sharedObjs.err` in the
    /// original, `redis.c:397`).
    pub fn err() -> Reply {
        Reply::Raw(SHARED.err.clone())
    }

    pub fn crlf() -> Reply {
        Reply::Raw(SHARED.crlf.clone())
    }

    /// Push every chunk this reply expands to onto `out`, in wire order.
    pub fn enqueue(self, out: &mut Vec<Obj>) {
        match self {
            Reply::Raw(obj) => out.push(obj),
            Reply::Error(msg) => out.push(new_str(format!("-ERR {msg}\r\n"))),
            Reply::Bulk(obj) => {
                let bytes = obj.as_str().map(Str::as_bytes).unwrap_or(&[]);
                out.push(new_str(format!("{}\r\n", bytes.len())));
                out.push(obj);
                out.push(SHARED.crlf.clone());
            }
            Reply::BulkTypeError(msg) => {
                let mut s = String::new();
                let _ = write!(s, "{}\r\n{}\r\n", -(msg.len() as i64), msg);
                out.push(new_str(s));
            }
            Reply::Integer(n) => out.push(new_str(format!("{n}\r\n"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(r: Reply) -> Vec<u8> {
        let mut chunks = Vec::new();
        r.enqueue(&mut chunks);
        let mut out = Vec::new();
        for c in chunks {
            out.extend_from_slice(c.as_str().unwrap().as_bytes());
        }
        out
    }

    #[test]
    fn ok_reply_is_preframed() {
        assert_eq!(flatten(Reply::ok()), b"+OK\r\n");
    }

    #[test]
    fn err_reply_is_the_shared_singleton() {
        assert_eq!(flatten(Reply::err()), b"-ERR\r\n");
    }

    #[test]
    fn error_reply_gets_err_prefix_and_crlf() {
        assert_eq!(flatten(Reply::Error("no such key".into())), b"-ERR no such key\r\n");
    }

    #[test]
    fn bulk_reply_is_length_then_payload_then_crlf() {
        let v = new_str("bar");
        assert_eq!(flatten(Reply::Bulk(v)), b"3\r\nbar\r\n");
    }

    #[test]
    fn bulk_type_error_uses_negative_length_prefix() {
        let msg = "GET against key not holding a string value";
        let expected = format!("{}\r\n{}\r\n", -(msg.len() as i64), msg);
        assert_eq!(flatten(Reply::BulkTypeError(msg.into())), expected.as_bytes());
    }

    #[test]
    fn integer_reply_has_no_colon_prefix() {
        assert_eq!(flatten(Reply::Integer(42)), b"42\r\n");
    }
}
