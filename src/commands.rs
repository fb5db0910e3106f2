//! Command table and handlers. Grounded line-for-line on the `*Command`
//! functions in `examples/original_source/redis_beta/redis.c`: every
//! reply shape (bare status, bulk, the value-position negative-length
//! type error, the "always OK regardless of outcome" quirks on `DEL` and
//! `SET`/`SETNX`) matches what that source actually sends, not a
//! generic reinterpretation of the command name.

use crate::db::Db;
use crate::object::{new_list, new_str, ObjData};
use crate::protocol::CommandInfo;
use crate::reply::Reply;
use crate::server::Server;
use crate::strbuf::Str;
use parking_lot::MutexGuard;
use std::cmp::Ordering;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

/// Arity (including the command name) and bulk-ness for every known
/// command, used by `protocol::RequestParser` to decide framing and by
/// `dispatch` to report "unknown command".
pub fn command_table(name: &str) -> Option<CommandInfo> {
    let (arity, is_bulk) = match name {
        "get" => (2, false),
        "set" => (3, true),
        "setnx" => (3, true),
        "del" => (2, false),
        "exists" => (2, false),
        "incr" => (2, false),
        "decr" => (2, false),
        "rpush" => (3, true),
        "lpush" => (3, true),
        "rpop" => (2, false),
        "lpop" => (2, false),
        "llen" => (2, false),
        "lindex" => (3, false),
        "lrange" => (4, false),
        "ltrim" => (4, false),
        "randomkey" => (1, false),
        "select" => (2, false),
        "move" => (3, false),
        "rename" => (3, false),
        "renamenx" => (3, false),
        "keys" => (2, false),
        "dbsize" => (1, false),
        "ping" => (1, false),
        "echo" => (2, true),
        "save" => (1, false),
        "bgsave" => (1, false),
        "shutdown" => (1, false),
        "lastsave" => (1, false),
        "type" => (2, false),
        _ => return None,
    };
    Some(CommandInfo { arity, is_bulk })
}

/// Dispatches one already-framed request against `server`, using and
/// possibly updating the connection's currently-selected database index.
/// `QUIT` is handled by the caller before this is ever invoked, exactly as
/// `processCommand` special-cases it ahead of the command table lookup.
pub fn dispatch(server: &Arc<Server>, db_index: &mut usize, name: &str, args: &[Str]) -> Vec<Reply> {
    let Some(info) = command_table(name) else {
        return vec![Reply::Error("unknown command".into())];
    };
    // `RequestParser` only uses arity to decide whether a command is
    // framed as bulk; a malformed inline line (wrong argument count on a
    // non-bulk command) still reaches here and must be rejected before
    // any handler indexes into `args`, matching `processCommand`'s
    // "wrong number of arguments" reply instead of a panic.
    if args.len() != info.arity - 1 {
        return vec![Reply::Error(format!("wrong number of arguments for '{name}' command"))];
    }
    match name {
        "ping" => vec![Reply::pong()],
        "echo" => vec![Reply::Bulk(new_str(args[0].clone()))],
        "get" => cmd_get(server, *db_index, &args[0]),
        "set" => cmd_set(server, *db_index, &args[0], &args[1], false),
        "setnx" => cmd_set(server, *db_index, &args[0], &args[1], true),
        "del" => cmd_del(server, *db_index, &args[0]),
        "exists" => cmd_exists(server, *db_index, &args[0]),
        "incr" => cmd_incr_decr(server, *db_index, &args[0], 1),
        "decr" => cmd_incr_decr(server, *db_index, &args[0], -1),
        "rpush" => cmd_push(server, *db_index, &args[0], &args[1], true),
        "lpush" => cmd_push(server, *db_index, &args[0], &args[1], false),
        "rpop" => cmd_pop(server, *db_index, &args[0], true),
        "lpop" => cmd_pop(server, *db_index, &args[0], false),
        "llen" => cmd_llen(server, *db_index, &args[0]),
        "lindex" => cmd_lindex(server, *db_index, &args[0], &args[1]),
        "lrange" => cmd_lrange(server, *db_index, &args[0], &args[1], &args[2]),
        "ltrim" => cmd_ltrim(server, *db_index, &args[0], &args[1], &args[2]),
        "randomkey" => cmd_randomkey(server, *db_index),
        "select" => cmd_select(server, db_index, &args[0]),
        "move" => cmd_move(server, *db_index, &args[0], &args[1]),
        "rename" => cmd_rename(server, *db_index, &args[0], &args[1], false),
        "renamenx" => cmd_rename(server, *db_index, &args[0], &args[1], true),
        "keys" => cmd_keys(server, *db_index, &args[0]),
        "dbsize" => vec![Reply::Integer(db(server, *db_index).len() as i64)],
        "save" => cmd_save(server),
        "bgsave" => cmd_bgsave(server),
        "shutdown" => cmd_shutdown(server),
        "lastsave" => vec![Reply::Integer(server.last_save.load(AtomicOrdering::Relaxed))],
        "type" => cmd_type(server, *db_index, &args[0]),
        _ => vec![Reply::Error("unknown command".into())],
    }
}

fn db(server: &Arc<Server>, index: usize) -> MutexGuard<'_, Db> {
    server.databases[index].lock()
}

fn mark_dirty(server: &Arc<Server>) {
    server.dirty.fetch_add(1, AtomicOrdering::Relaxed);
}

fn cmd_get(server: &Arc<Server>, idx: usize, key: &Str) -> Vec<Reply> {
    let d = db(server, idx);
    match d.get(key) {
        None => vec![Reply::nil()],
        Some(obj) => match obj.as_ref() {
            ObjData::Str(s) => vec![Reply::Bulk(new_str(s.clone()))],
            _ => vec![Reply::BulkTypeError("GET against key not holding a string value".into())],
        },
    }
}

/// `SET`/`SETNX` both always reply `+OK`, matching `setGenericCommand`:
/// a `SETNX` against an existing key silently drops the new value and
/// still replies `+OK`, it just never stores it.
fn cmd_set(server: &Arc<Server>, idx: usize, key: &Str, value: &Str, nx: bool) -> Vec<Reply> {
    let mut d = db(server, idx);
    if nx {
        d.set_if_absent(key.clone(), new_str(value.clone()));
    } else {
        d.set(key.clone(), new_str(value.clone()));
    }
    mark_dirty(server);
    vec![Reply::ok()]
}

/// `DEL` always replies `+OK` regardless of whether the key existed,
/// matching `delCommand`.
fn cmd_del(server: &Arc<Server>, idx: usize, key: &Str) -> Vec<Reply> {
    let mut d = db(server, idx);
    if d.remove(key).is_some() {
        mark_dirty(server);
    }
    vec![Reply::ok()]
}

fn cmd_exists(server: &Arc<Server>, idx: usize, key: &Str) -> Vec<Reply> {
    vec![Reply::bool(db(server, idx).contains(key))]
}

/// `INCR`/`DECR`: a missing key or a non-string value is treated as `0`
/// (`value = 0`), never an error, matching `incrDecrCommand`.
fn cmd_incr_decr(server: &Arc<Server>, idx: usize, key: &Str, delta: i64) -> Vec<Reply> {
    let mut d = db(server, idx);
    let current = match d.get(key).and_then(|o| o.as_str()) {
        Some(s) => std::str::from_utf8(s.as_bytes()).ok().and_then(|t| t.parse::<i64>().ok()).unwrap_or(0),
        None => 0,
    };
    let value = current + delta;
    d.set(key.clone(), new_str(value.to_string()));
    mark_dirty(server);
    vec![Reply::Integer(value)]
}

fn cmd_push(server: &Arc<Server>, idx: usize, key: &Str, value: &Str, tail: bool) -> Vec<Reply> {
    let mut d = db(server, idx);
    match d.get(key) {
        None => {
            let mut list = crate::dlist::DList::new();
            list.push_back(new_str(value.clone()));
            d.set(key.clone(), new_list(list));
        }
        Some(obj) => match obj.as_ref() {
            ObjData::List(_) => {
                // Mutating a stored list in place would break the
                // copy-on-write snapshot guarantee (see Db::snapshot), so
                // every push rebuilds the list value instead.
                let mut cloned = obj.as_list().unwrap().iter().cloned().collect::<crate::dlist::DList<_>>();
                if tail {
                    cloned.push_back(new_str(value.clone()));
                } else {
                    cloned.push_front(new_str(value.clone()));
                }
                d.set(key.clone(), new_list(cloned));
            }
            _ => return vec![Reply::Error("push against existing key not holding a list".into())],
        },
    }
    mark_dirty(server);
    vec![Reply::ok()]
}

fn cmd_llen(server: &Arc<Server>, idx: usize, key: &Str) -> Vec<Reply> {
    let d = db(server, idx);
    match d.get(key) {
        None => vec![Reply::zero()],
        Some(obj) => match obj.as_ref() {
            ObjData::List(l) => vec![Reply::Integer(l.len() as i64)],
            // The original sends a bare "-1\r\n" here, not an `-ERR` line.
            _ => vec![Reply::Raw(new_str("-1\r\n"))],
        },
    }
}

fn cmd_lindex(server: &Arc<Server>, idx: usize, key: &Str, index_arg: &Str) -> Vec<Reply> {
    let index: i64 = parse_index(index_arg);
    let d = db(server, idx);
    match d.get(key) {
        None => vec![Reply::nil()],
        Some(obj) => match obj.as_ref() {
            ObjData::List(l) => {
                let real = if index < 0 { l.len() as i64 + index } else { index };
                if real < 0 || real as usize >= l.len() {
                    vec![Reply::nil()]
                } else {
                    vec![Reply::Bulk(l.get(real as usize).unwrap().clone())]
                }
            }
            _ => vec![Reply::BulkTypeError("LINDEX against key not holding a list value".into())],
        },
    }
}

fn cmd_pop(server: &Arc<Server>, idx: usize, key: &Str, tail: bool) -> Vec<Reply> {
    let mut d = db(server, idx);
    match d.get(key) {
        None => vec![Reply::nil()],
        Some(obj) => match obj.as_ref() {
            ObjData::List(_) => {
                let mut cloned = obj.as_list().unwrap().iter().cloned().collect::<crate::dlist::DList<_>>();
                let popped = if tail { cloned.pop_back() } else { cloned.pop_front() };
                match popped {
                    None => vec![Reply::nil()],
                    Some(ele) => {
                        d.set(key.clone(), new_list(cloned));
                        mark_dirty(server);
                        vec![Reply::Bulk(ele)]
                    }
                }
            }
            _ => vec![Reply::BulkTypeError("POP against key not holding a list value".into())],
        },
    }
}

fn cmd_lrange(server: &Arc<Server>, idx: usize, key: &Str, start_arg: &Str, end_arg: &Str) -> Vec<Reply> {
    let d = db(server, idx);
    match d.get(key) {
        None => vec![Reply::nil()],
        Some(obj) => match obj.as_ref() {
            ObjData::List(l) => {
                let llen = l.len() as i64;
                let (start, end) = normalize_range(parse_index(start_arg), parse_index(end_arg), llen);
                if start > end || start >= llen {
                    return vec![Reply::zero()];
                }
                let end = end.min(llen - 1);
                let mut out = vec![Reply::Integer(end - start + 1)];
                for i in start..=end {
                    out.push(Reply::Bulk(l.get(i as usize).unwrap().clone()));
                }
                out
            }
            _ => vec![Reply::BulkTypeError("LRANGE against key not holding a list value".into())],
        },
    }
}

fn cmd_ltrim(server: &Arc<Server>, idx: usize, key: &Str, start_arg: &Str, end_arg: &Str) -> Vec<Reply> {
    let mut d = db(server, idx);
    let kind = match d.get(key) {
        None => return vec![Reply::Error("no such key".into())],
        Some(obj) => match obj.as_ref() {
            ObjData::List(l) => Some(l.iter().cloned().collect::<crate::dlist::DList<_>>()),
            _ => None,
        },
    };
    let Some(mut list) = kind else {
        return vec![Reply::Error("LTRIM against key not holding a list value".into())];
    };
    let llen = list.len() as i64;
    let (start, end) = normalize_range(parse_index(start_arg), parse_index(end_arg), llen);
    if start > end || start >= llen || llen == 0 {
        list.clear();
    } else {
        let end = end.min(llen - 1);
        list.retain_range(start as usize, end as usize);
    }
    d.set(key.clone(), new_list(list));
    vec![Reply::ok()]
}

fn cmd_randomkey(server: &Arc<Server>, idx: usize) -> Vec<Reply> {
    let d = db(server, idx);
    match d.random_key() {
        None => vec![Reply::crlf()],
        Some(key) => vec![Reply::Raw(new_str(key.clone())), Reply::crlf()],
    }
}

fn cmd_select(server: &Arc<Server>, db_index: &mut usize, id_arg: &Str) -> Vec<Reply> {
    let id: i64 = parse_index(id_arg);
    if id < 0 || id as usize >= server.databases.len() {
        return vec![Reply::Error("invalid DB index".into())];
    }
    *db_index = id as usize;
    vec![Reply::ok()]
}

fn cmd_move(server: &Arc<Server>, src_idx: usize, key: &Str, dst_arg: &Str) -> Vec<Reply> {
    let dst: i64 = parse_index(dst_arg);
    if dst < 0 || dst as usize >= server.databases.len() {
        return vec![Reply::Error("target DB out of range".into())];
    }
    let dst_idx = dst as usize;
    if dst_idx == src_idx {
        return vec![Reply::Error("source DB is the same as target DB".into())];
    }

    // Lock in a fixed order (lower index first) so MOVE never deadlocks
    // against a concurrent MOVE in the opposite direction.
    let (first, second) = if src_idx < dst_idx { (src_idx, dst_idx) } else { (dst_idx, src_idx) };
    let mut guard_a = server.databases[first].lock();
    let mut guard_b = server.databases[second].lock();
    let (src, dst) = if src_idx < dst_idx { (&mut guard_a, &mut guard_b) } else { (&mut guard_b, &mut guard_a) };

    if !src.contains(key) {
        return vec![Reply::Error("no such key".into())];
    }
    if dst.contains(key) {
        return vec![Reply::Error("target DB already contains the moved key".into())];
    }
    let (k, v) = src.take(key).unwrap();
    dst.set(k, v);
    mark_dirty(server);
    vec![Reply::ok()]
}

fn cmd_rename(server: &Arc<Server>, idx: usize, src: &Str, dst: &Str, nx: bool) -> Vec<Reply> {
    if src.cmp_bytes(dst) == Ordering::Equal {
        return vec![Reply::Error("src and dest key are the same".into())];
    }
    let mut d = db(server, idx);
    let Some(value) = d.get(src).cloned() else {
        return vec![Reply::Error("no such key".into())];
    };
    if nx && d.contains(dst) {
        return vec![Reply::Error("destination key exists".into())];
    }
    d.set(dst.clone(), value);
    d.remove(src);
    mark_dirty(server);
    vec![Reply::ok()]
}

fn cmd_keys(server: &Arc<Server>, idx: usize, pattern: &Str) -> Vec<Reply> {
    let d = db(server, idx);
    let mut joined = Str::new();
    let mut first = true;
    for key in d.keys() {
        if crate::glob::glob_match(pattern.as_bytes(), key.as_bytes(), false) {
            if !first {
                joined.append(b" ");
            }
            joined.append(key.as_bytes());
            first = false;
        }
    }
    vec![Reply::Bulk(new_str(joined))]
}

fn cmd_save(server: &Arc<Server>) -> Vec<Reply> {
    match server.save_foreground() {
        Ok(()) => vec![Reply::ok()],
        Err(_) => vec![Reply::err()],
    }
}

fn cmd_bgsave(server: &Arc<Server>) -> Vec<Reply> {
    if server.bgsave_in_progress.load(AtomicOrdering::Relaxed) {
        return vec![Reply::Error("background save already in progress".into())];
    }
    match server.save_background() {
        Ok(()) => vec![Reply::ok()],
        Err(_) => vec![Reply::err()],
    }
}

/// A clean shutdown: save, then exit the process (connection never gets to
/// send a reply on the success path, matching the original's `exit()`
/// inside the command handler itself).
fn cmd_shutdown(server: &Arc<Server>) -> Vec<Reply> {
    tracing::warn!("user requested shutdown, saving DB...");
    match server.save_foreground() {
        Ok(()) => {
            tracing::warn!("server exit now, bye bye...");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::warn!(error = %e, "error trying to save the DB, can't exit");
            vec![Reply::Error("can't quit, problems saving the DB".into())]
        }
    }
}

fn cmd_type(server: &Arc<Server>, idx: usize, key: &Str) -> Vec<Reply> {
    let d = db(server, idx);
    let name = d.get(key).map(|o| o.type_name()).unwrap_or("none");
    vec![Reply::Raw(new_str(format!("+{name}\r\n")))]
}

fn parse_index(arg: &Str) -> i64 {
    std::str::from_utf8(arg.as_bytes()).ok().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0)
}

/// Converts possibly-negative `start`/`end` indices into the clamped,
/// non-negative form `lrangeCommand`/`ltrimCommand` compute before the
/// sanity checks.
fn normalize_range(start: i64, end: i64, len: i64) -> (i64, i64) {
    let norm = |i: i64| -> i64 {
        let i = if i < 0 { len + i } else { i };
        i.max(0)
    };
    (norm(start), norm(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_server() -> Arc<Server> {
        Arc::new(Server::new(Config::default()))
    }

    #[test]
    fn set_then_get_round_trips() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("k"), Str::from("v")]);
        let reply = dispatch(&server, &mut idx, "get", &[Str::from("k")]);
        assert!(matches!(reply[0], Reply::Bulk(_)));
    }

    #[test]
    fn get_missing_key_is_nil() {
        let server = test_server();
        let mut idx = 0usize;
        let reply = dispatch(&server, &mut idx, "get", &[Str::from("missing")]);
        assert!(matches!(reply[0], Reply::Raw(_)));
    }

    #[test]
    fn incr_on_missing_key_starts_from_zero() {
        let server = test_server();
        let mut idx = 0usize;
        let reply = dispatch(&server, &mut idx, "incr", &[Str::from("counter")]);
        assert!(matches!(reply[0], Reply::Integer(1)));
    }

    #[test]
    fn setnx_against_existing_key_still_replies_ok_but_does_not_overwrite() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("k"), Str::from("first")]);
        dispatch(&server, &mut idx, "setnx", &[Str::from("k"), Str::from("second")]);
        let d = server.databases[0].lock();
        assert_eq!(d.get(&Str::from("k")).unwrap().as_str().unwrap().as_bytes(), b"first");
    }

    #[test]
    fn push_then_lrange_preserves_order() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "rpush", &[Str::from("l"), Str::from("a")]);
        dispatch(&server, &mut idx, "rpush", &[Str::from("l"), Str::from("b")]);
        let reply = dispatch(&server, &mut idx, "lrange", &[Str::from("l"), Str::from("0"), Str::from("-1")]);
        assert!(matches!(reply[0], Reply::Integer(2)));
    }

    #[test]
    fn move_transfers_key_between_databases() {
        let server = Arc::new(Server::new(Config { databases: 2, ..Config::default() }));
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("k"), Str::from("v")]);
        let reply = dispatch(&server, &mut idx, "move", &[Str::from("k"), Str::from("1")]);
        assert!(matches!(reply[0], Reply::Raw(_)));
        assert!(!server.databases[0].lock().contains(&Str::from("k")));
        assert!(server.databases[1].lock().contains(&Str::from("k")));
    }

    #[test]
    fn select_out_of_range_is_an_error() {
        let server = test_server();
        let mut idx = 0usize;
        let reply = dispatch(&server, &mut idx, "select", &[Str::from("999")]);
        assert!(matches!(reply[0], Reply::Error(_)));
        assert_eq!(idx, 0);
    }

    #[test]
    fn type_reports_string_list_and_none() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("s"), Str::from("v")]);
        dispatch(&server, &mut idx, "rpush", &[Str::from("l"), Str::from("v")]);
        let r1 = dispatch(&server, &mut idx, "type", &[Str::from("s")]);
        let r2 = dispatch(&server, &mut idx, "type", &[Str::from("l")]);
        let r3 = dispatch(&server, &mut idx, "type", &[Str::from("missing")]);
        for r in [&r1, &r2, &r3] {
            assert!(matches!(r[0], Reply::Raw(_)));
        }
    }

    #[test]
    fn push_against_string_key_is_an_error() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("k"), Str::from("v")]);
        let reply = dispatch(&server, &mut idx, "rpush", &[Str::from("k"), Str::from("x")]);
        assert!(matches!(reply[0], Reply::Error(_)));
    }

    #[test]
    fn llen_against_string_key_is_a_bare_negative_one() {
        let server = test_server();
        let mut idx = 0usize;
        dispatch(&server, &mut idx, "set", &[Str::from("k"), Str::from("v")]);
        let reply = dispatch(&server, &mut idx, "llen", &[Str::from("k")]);
        assert!(matches!(reply[0], Reply::Raw(_)));
    }

    #[test]
    fn del_always_replies_ok_even_for_a_missing_key() {
        let server = test_server();
        let mut idx = 0usize;
        let reply = dispatch(&server, &mut idx, "del", &[Str::from("missing")]);
        assert!(matches!(reply[0], Reply::Raw(_)));
    }

    #[test]
    fn ltrim_keeps_exactly_the_requested_inclusive_window() {
        let server = test_server();
        let mut idx = 0usize;
        for v in ["a", "b", "c", "d", "e"] {
            dispatch(&server, &mut idx, "rpush", &[Str::from("l"), Str::from(v)]);
        }
        dispatch(&server, &mut idx, "ltrim", &[Str::from("l"), Str::from("1"), Str::from("3")]);
        let reply = dispatch(&server, &mut idx, "lrange", &[Str::from("l"), Str::from("0"), Str::from("-1")]);
        assert!(matches!(reply[0], Reply::Integer(3)));
        let elements: Vec<&Str> = reply[1..].iter().map(|r| match r {
            Reply::Bulk(obj) => obj.as_str().unwrap(),
            _ => panic!("expected bulk element"),
        }).collect();
        assert_eq!(elements, vec![&Str::from("b"), &Str::from("c"), &Str::from("d")]);
    }
}
