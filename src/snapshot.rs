//! Binary snapshot persistence, matching `saveDb`/`loadDb` in
//! `examples/original_source/redis_beta/redis.c`: a 9-byte magic header,
//! then a stream of `(type byte, network-order u32 length, payload)`
//! entries interleaved with `SELECTDB` opcodes, terminated by `EOF`.

use crate::constants::{DUMP_FILENAME, RDB_MAGIC, RDB_STACK_BUF_LEN};
use crate::db::Db;
use crate::dlist::DList;
use crate::error::{SnapshotError, SnapshotResult};
use crate::object::{new_list, new_str, Obj, ObjData};
use crate::strbuf::Str;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const OPCODE_SELECTDB: u8 = 254;
const OPCODE_EOF: u8 = 255;

fn write_len(w: &mut impl Write, len: u32) -> SnapshotResult<()> {
    w.write_all(&len.to_be_bytes())?;
    Ok(())
}

fn read_len(r: &mut impl Read) -> SnapshotResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| SnapshotError::ShortRead)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_exact_len(r: &mut impl Read, len: usize) -> SnapshotResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|_| SnapshotError::ShortRead)?;
    Ok(buf)
}

/// Write every non-empty database to `w` in order, preceded by a
/// `SELECTDB` opcode, terminated by `EOF`. `databases[i]` is assumed to
/// already be a point-in-time snapshot (see `Db::snapshot`), so nothing
/// here needs to hold a lock.
pub fn write_snapshot(w: &mut impl Write, databases: &[Db]) -> SnapshotResult<()> {
    w.write_all(RDB_MAGIC)?;
    for (idx, db) in databases.iter().enumerate() {
        if db.is_empty() {
            continue;
        }
        w.write_all(&[OPCODE_SELECTDB])?;
        write_len(w, idx as u32)?;
        for (key, value) in db.iter() {
            match value.as_ref() {
                ObjData::Str(s) => {
                    w.write_all(&[TYPE_STRING])?;
                    write_len(w, key.len() as u32)?;
                    w.write_all(key.as_bytes())?;
                    write_len(w, s.len() as u32)?;
                    w.write_all(s.as_bytes())?;
                }
                ObjData::List(list) => {
                    w.write_all(&[TYPE_LIST])?;
                    write_len(w, key.len() as u32)?;
                    w.write_all(key.as_bytes())?;
                    write_len(w, list.len() as u32)?;
                    for ele in list.iter() {
                        let bytes = ele.as_str().map(Str::as_bytes).unwrap_or(&[]);
                        write_len(w, bytes.len() as u32)?;
                        w.write_all(bytes)?;
                    }
                }
                ObjData::Set => unreachable!("set values are never constructed"),
            }
        }
    }
    w.write_all(&[OPCODE_EOF])?;
    Ok(())
}

/// Atomically replace `path` with a freshly written snapshot: write to a
/// sibling temp file, then rename, matching `saveDb`'s
/// write-temp-then-rename sequence so a crash mid-write never corrupts the
/// previous good file.
pub fn save_to_path(path: &Path, databases: &[Db]) -> SnapshotResult<()> {
    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut w = BufWriter::new(file);
        write_snapshot(&mut w, databases)?;
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let mut name = format!("temp-{pid}-");
    if let Some(f) = path.file_name() {
        name.push_str(&f.to_string_lossy());
    } else {
        name.push_str(DUMP_FILENAME);
    }
    path.with_file_name(name)
}

/// Load every database from `r`. A missing file is the caller's concern
/// (treated as "start empty", not an error here); anything that parses as
/// far as this function but is malformed is fatal, matching `loadDb`'s
/// `exit(1)` on short read / bad magic / duplicate key — callers should
/// propagate the error up to a fatal startup abort.
pub fn load_snapshot(r: &mut impl Read, databases: &mut [Db]) -> SnapshotResult<()> {
    let mut magic = [0u8; 9];
    r.read_exact(&mut magic).map_err(|_| SnapshotError::ShortRead)?;
    if &magic != RDB_MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let mut dbidx = 0usize;
    loop {
        let mut type_buf = [0u8; 1];
        r.read_exact(&mut type_buf).map_err(|_| SnapshotError::ShortRead)?;
        match type_buf[0] {
            OPCODE_EOF => break,
            OPCODE_SELECTDB => {
                let id = read_len(r)? as usize;
                if id >= databases.len() {
                    return Err(SnapshotError::UnknownType(type_buf[0]));
                }
                dbidx = id;
            }
            TYPE_STRING => {
                let key = read_key(r)?;
                let vlen = read_len(r)? as usize;
                let bytes = read_value(r, vlen)?;
                insert_loaded(&mut databases[dbidx], key, new_str(Str::from_bytes(bytes)))?;
            }
            TYPE_LIST => {
                let key = read_key(r)?;
                let count = read_len(r)?;
                let mut list = DList::new();
                for _ in 0..count {
                    let vlen = read_len(r)? as usize;
                    let bytes = read_value(r, vlen)?;
                    list.push_back(new_str(Str::from_bytes(bytes)));
                }
                insert_loaded(&mut databases[dbidx], key, new_list(list))?;
            }
            other => return Err(SnapshotError::UnknownType(other)),
        }
    }
    Ok(())
}

fn read_key(r: &mut impl Read) -> SnapshotResult<Str> {
    let klen = read_len(r)? as usize;
    let bytes = read_value(r, klen)?;
    Ok(Str::from_bytes(bytes))
}

fn read_value(r: &mut impl Read, len: usize) -> SnapshotResult<Vec<u8>> {
    let _ = RDB_STACK_BUF_LEN; // documents the original's stack-vs-heap split; irrelevant in safe Rust
    read_exact_len(r, len)
}

fn insert_loaded(db: &mut Db, key: Str, value: Obj) -> SnapshotResult<()> {
    if db.contains(&key) {
        return Err(SnapshotError::DuplicateKey(key.as_str_lossy().into_owned()));
    }
    db.set(key, value);
    Ok(())
}

/// Load `path` into `databases` if it exists. Returns `Ok(false)` when
/// there is no file to load (not an error, matching `loadDb`'s `REDIS_ERR`
/// return on `fopen` failure being treated as "nothing to load" by its
/// caller), `Ok(true)` on a successful load.
pub fn load_from_path(path: &Path, databases: &mut [Db]) -> SnapshotResult<bool> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(SnapshotError::Io(e)),
    };
    let mut r = BufReader::new(file);
    load_snapshot(&mut r, databases)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::new_str as mkstr;

    #[test]
    fn round_trips_a_string_and_a_list_through_bytes() {
        let mut dbs = vec![Db::new(), Db::new()];
        dbs[0].set(Str::from("greeting"), mkstr("hello"));
        let mut list = DList::new();
        list.push_back(mkstr("a"));
        list.push_back(mkstr("b"));
        dbs[1].set(Str::from("mylist"), new_list(list));

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &dbs).unwrap();

        let mut loaded = vec![Db::new(), Db::new()];
        load_snapshot(&mut &buf[..], &mut loaded).unwrap();

        assert_eq!(
            loaded[0].get(&Str::from("greeting")).unwrap().as_str().unwrap().as_bytes(),
            b"hello"
        );
        let l = loaded[1].get(&Str::from("mylist")).unwrap().as_list().unwrap();
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn empty_databases_produce_only_magic_and_eof() {
        let dbs = vec![Db::new(), Db::new()];
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &dbs).unwrap();
        assert_eq!(buf, [RDB_MAGIC.as_slice(), &[OPCODE_EOF]].concat());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut loaded = vec![Db::new()];
        let err = load_snapshot(&mut &b"NOTREDIS\0"[..], &mut loaded).unwrap_err();
        assert!(matches!(err, SnapshotError::BadMagic));
    }

    #[test]
    fn truncated_file_is_a_short_read() {
        let dbs = vec![{
            let mut d = Db::new();
            d.set(Str::from("k"), mkstr("v"));
            d
        }];
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &dbs).unwrap();
        buf.truncate(buf.len() - 3);
        let mut loaded = vec![Db::new()];
        let err = load_snapshot(&mut &buf[..], &mut loaded).unwrap_err();
        assert!(matches!(err, SnapshotError::ShortRead));
    }

    #[test]
    fn duplicate_key_across_selectdb_opcodes_is_rejected() {
        // Two SELECTDB 0 blocks writing the same key would come from a
        // corrupted file; construct one by hand to exercise the guard.
        let mut buf = Vec::new();
        buf.extend_from_slice(RDB_MAGIC);
        for _ in 0..2 {
            buf.push(OPCODE_SELECTDB);
            buf.extend_from_slice(&0u32.to_be_bytes());
            buf.push(TYPE_STRING);
            buf.extend_from_slice(&1u32.to_be_bytes());
            buf.extend_from_slice(b"k");
            buf.extend_from_slice(&1u32.to_be_bytes());
            buf.extend_from_slice(b"v");
        }
        buf.push(OPCODE_EOF);
        let mut loaded = vec![Db::new()];
        let err = load_snapshot(&mut &buf[..], &mut loaded).unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateKey(_)));
    }

    #[test]
    fn missing_file_loads_as_false_not_an_error() {
        let mut loaded = vec![Db::new()];
        let ok = load_from_path(Path::new("/nonexistent/path/to/dump.rdb"), &mut loaded).unwrap();
        assert!(!ok);
    }
}
