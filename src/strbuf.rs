//! Binary-safe, growable byte buffer (`Str`).
//!
//! Analogous to `sds.c` in `examples/original_source/redis_beta`: an
//! immutable-to-the-outside byte sequence with embedded-NUL support. Every
//! operation here is one the command layer or the snapshot codec actually
//! consumes; there is no general-purpose string API beyond that.

use std::fmt::Write as _;

#[derive(Clone, Debug, Default, Eq)]
pub struct Str(Vec<u8>);

impl Str {
    pub fn new() -> Self {
        Str(Vec::new())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Str(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn append_fmt(&mut self, args: std::fmt::Arguments<'_>) {
        // `Vec<u8>` doesn't implement `fmt::Write`; go through a scratch
        // `String` instead, same two-step the original does via `sdscatprintf`.
        let mut scratch = String::new();
        let _ = scratch.write_fmt(args);
        self.0.extend_from_slice(scratch.as_bytes());
    }

    /// Trim bytes belonging to `cutset` off both ends.
    pub fn trim(&mut self, cutset: &[u8]) {
        let start = self.0.iter().position(|b| !cutset.contains(b)).unwrap_or(self.0.len());
        let end = self.0.iter().rposition(|b| !cutset.contains(b)).map(|p| p + 1).unwrap_or(start);
        self.0 = self.0[start..end].to_vec();
    }

    /// Slice by inclusive `[start, end]` indices; negative indices count
    /// from the end, as in `LRANGE`/`LTRIM`/`sdsrange`.
    pub fn range(&self, start: i64, end: i64) -> Str {
        let len = self.0.len() as i64;
        if len == 0 {
            return Str::new();
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i
            }
        };
        let s = norm(start).min(len - 1).max(0);
        let e = norm(end).min(len - 1);
        if s > e || len == 0 {
            return Str::new();
        }
        Str(self.0[s as usize..=e as usize].to_vec())
    }

    pub fn split(&self, sep: &[u8]) -> Vec<Str> {
        if sep.is_empty() {
            return vec![self.clone()];
        }
        split_on(&self.0, sep).into_iter().map(Str::from_bytes).collect()
    }

    pub fn to_lowercase(&mut self) {
        for b in self.0.iter_mut() {
            b.make_ascii_lowercase();
        }
    }

    pub fn cmp_bytes(&self, other: &Str) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }

    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

fn split_on(haystack: &[u8], needle: &[u8]) -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    let mut start = 0;
    if needle.is_empty() {
        return vec![haystack.to_vec()];
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            parts.push(haystack[start..i].to_vec());
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(haystack[start..].to_vec());
    parts
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for Str {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str(s.as_bytes().to_vec())
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(s.into_bytes())
    }
}

impl From<Vec<u8>> for Str {
    fn from(v: Vec<u8>) -> Self {
        Str(v)
    }
}

impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_len() {
        let mut s = Str::from("foo");
        s.append(b"bar");
        assert_eq!(s.as_bytes(), b"foobar");
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn append_fmt_writes_formatted_text() {
        let mut s = Str::new();
        s.append_fmt(format_args!("{}", -42));
        assert_eq!(s.as_bytes(), b"-42");
    }

    #[test]
    fn trim_strips_cutset_from_both_ends() {
        let mut s = Str::from("  hello \r\n");
        s.trim(b" \r\n");
        assert_eq!(s.as_bytes(), b"hello");
    }

    #[test]
    fn trim_all_cutset_yields_empty() {
        let mut s = Str::from("   ");
        s.trim(b" ");
        assert!(s.is_empty());
    }

    #[test]
    fn range_handles_negative_indices() {
        let s = Str::from("Hello World");
        assert_eq!(s.range(0, -1).as_bytes(), b"Hello World");
        assert_eq!(s.range(-5, -1).as_bytes(), b"World");
        assert_eq!(s.range(6, 100).as_bytes(), b"World");
    }

    #[test]
    fn range_start_after_end_is_empty() {
        let s = Str::from("abc");
        assert!(s.range(2, 0).is_empty());
    }

    #[test]
    fn split_on_literal_separator() {
        let s = Str::from("a::b::c");
        let parts = s.split(b"::");
        assert_eq!(parts, vec![Str::from("a"), Str::from("b"), Str::from("c")]);
    }

    #[test]
    fn lowercase_in_place() {
        let mut s = Str::from("MiXeD");
        s.to_lowercase();
        assert_eq!(s.as_bytes(), b"mixed");
    }
}
