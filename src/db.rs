//! A single numbered keyspace: a `Dict` from `Str` keys to `Obj` values.

use crate::dict::Dict;
use crate::object::Obj;
use crate::strbuf::Str;

impl AsRef<[u8]> for Str {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[derive(Default)]
pub struct Db {
    dict: Dict<Str, Obj>,
}

impl Db {
    pub fn new() -> Self {
        Db { dict: Dict::new() }
    }

    pub fn get(&self, key: &Str) -> Option<&Obj> {
        self.dict.find(key)
    }

    /// Insert-or-overwrite, matching `dictReplace` semantics: the old value
    /// (if any) is simply dropped, which for an `Arc` decrements its
    /// refcount rather than freeing anything directly.
    pub fn set(&mut self, key: Str, value: Obj) {
        self.dict.replace(key, value);
    }

    /// `SETNX`-style: only inserts if absent. Returns `true` on success.
    pub fn set_if_absent(&mut self, key: Str, value: Obj) -> bool {
        self.dict.insert(key, value)
    }

    pub fn remove(&mut self, key: &Str) -> Option<Obj> {
        self.dict.delete(key).map(|(_, v)| v)
    }

    /// Remove without decrementing anything conceptually tied to the old
    /// slot: used by `MOVE`, which transfers the `Obj` (and the key's
    /// ownership) into another database without the value's refcount
    /// changing.
    pub fn take(&mut self, key: &Str) -> Option<(Str, Obj)> {
        self.dict.delete(key)
    }

    pub fn contains(&self, key: &Str) -> bool {
        self.dict.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Str> {
        self.dict.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Str, &Obj)> {
        self.dict.iter()
    }

    pub fn random_key(&self) -> Option<&Str> {
        self.dict.random_entry().map(|(k, _)| k)
    }

    /// Shrink the backing table if it has grown sparse. Invoked from the
    /// cron, matching the original's `tryResizeHashTables` policy.
    pub fn maybe_shrink(&mut self) {
        use crate::constants::{DICT_SHRINK_FILL_PERCENT, DICT_SHRINK_MIN_SIZE};
        let cap = self.dict.capacity();
        if cap > DICT_SHRINK_MIN_SIZE {
            let fill_percent = self.dict.len() * 100 / cap;
            if fill_percent < DICT_SHRINK_FILL_PERCENT {
                self.dict.resize();
            }
        }
    }

    /// A cheap structural clone for background-save: every value is an
    /// `Arc` clone, so this walks the table once and shares all payloads
    /// rather than deep-copying them. Since no command ever mutates a
    /// stored `Obj` in place (every mutation replaces the dict entry with a
    /// freshly built value), this snapshot is stable even while the
    /// original database keeps being written to after the clone is taken —
    /// exactly the copy-on-write guarantee a real `fork()` would give, see
    /// DESIGN.md.
    pub fn snapshot(&self) -> Db {
        let mut copy = Db::new();
        for (k, v) in self.dict.iter() {
            copy.dict.insert(k.clone(), v.clone());
        }
        copy
    }
}
