//! Fractional rank keys for ordering sibling blocks.
//!
//! A rank key is a lowercase string. Siblings are displayed in lexicographic
//! order of their keys, so inserting a block between two others only needs a
//! fresh key that sorts between its neighbours; nothing else is renumbered.
//!
//! Bounds are expressed as strings where `""` means "unbounded":
//!
//! ```text
//! between("", "")    -> "n"      first key in an empty list
//! between("a", "b")  -> "an"
//! between("n", "")   -> "u"      append after "n"
//! between("", "n")   -> "g"      prepend before "n"
//! ```
//!
//! Keys produced here never end in `'a'`, which keeps room below every key.

use thiserror::Error;

/// Codepoint standing in for a missing character of the lower bound
/// (`` ` ``, one below `'a'`).
const LOWER_SENTINEL: u32 = 'a' as u32 - 1;

/// Codepoint standing in for a missing character of the upper bound
/// (`{`, one above `'z'`).
const UPPER_SENTINEL: u32 = 'z' as u32 + 1;

const A: u32 = 'a' as u32;
const B: u32 = 'b' as u32;
const Z: u32 = 'z' as u32;

/// Errors returned when a key cannot be generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("rank key {key:?} contains {found:?}; only 'a'..='z' is allowed")]
    InvalidCharacter { key: String, found: char },

    #[error("lower bound {prev:?} does not sort before upper bound {next:?}")]
    OutOfOrder { prev: String, next: String },

    #[error("no rank key fits between {prev:?} and {next:?}")]
    NoRoom { prev: String, next: String },
}

/// Generate a key that sorts strictly between `prev` and `next`.
///
/// An empty `prev` means no lower bound, an empty `next` means no upper bound.
pub fn between(prev: &str, next: &str) -> Result<String, RankError> {
    validate(prev)?;
    validate(next)?;

    if !next.is_empty() && prev >= next {
        return Err(RankError::OutOfOrder {
            prev: prev.to_string(),
            next: next.to_string(),
        });
    }

    let prev_bytes = prev.as_bytes();
    let next_bytes = next.as_bytes();
    let lower = |i: usize| prev_bytes.get(i).map_or(LOWER_SENTINEL, |&c| u32::from(c));
    let upper = |i: usize| next_bytes.get(i).map_or(UPPER_SENTINEL, |&c| u32::from(c));

    // Leftmost position where the bounds differ. Terminates because past the
    // end of both strings the sentinels differ.
    let mut pos = 0;
    let (mut p, mut n) = loop {
        let (p, n) = (lower(pos), upper(pos));
        if p != n {
            break (p, n);
        }
        pos += 1;
    };

    let mut key = String::with_capacity(pos + 2);
    key.push_str(&prev[..pos]);
    let mut cursor = pos + 1;

    if p == LOWER_SENTINEL {
        // prev is exhausted: shadow the run of 'a's in next
        while n == A {
            key.push('a');
            n = upper(cursor);
            cursor += 1;
        }
        if n == B {
            key.push('a');
            n = UPPER_SENTINEL;
        }
    } else if p + 1 == n {
        // consecutive characters: keep p and go one level deeper
        key.push(letter(p));
        n = UPPER_SENTINEL;
        loop {
            p = lower(cursor);
            cursor += 1;
            if p != Z {
                break;
            }
            key.push('z');
        }
    }

    key.push(letter((p + n).div_ceil(2)));

    if key.as_str() > prev && (next.is_empty() || key.as_str() < next) {
        Ok(key)
    } else {
        Err(RankError::NoRoom {
            prev: prev.to_string(),
            next: next.to_string(),
        })
    }
}

/// Key for a block appended after `prev` (or first in an empty list).
pub fn after(prev: &str) -> Result<String, RankError> {
    between(prev, "")
}

/// Key for a block prepended before `next`.
pub fn before(next: &str) -> Result<String, RankError> {
    between("", next)
}

fn validate(key: &str) -> Result<(), RankError> {
    match key.chars().find(|c| !c.is_ascii_lowercase()) {
        Some(found) => Err(RankError::InvalidCharacter {
            key: key.to_string(),
            found,
        }),
        None => Ok(()),
    }
}

/// Codepoints handed to this are always within the sentinel range.
fn letter(codepoint: u32) -> char {
    char::from(codepoint as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_between(prev: &str, next: &str) -> String {
        let key = between(prev, next).unwrap();
        assert!(key.as_str() > prev, "{key:?} should sort after {prev:?}");
        if !next.is_empty() {
            assert!(key.as_str() < next, "{key:?} should sort before {next:?}");
        }
        key
    }

    #[test]
    fn test_empty_bounds_give_single_midpoint() {
        assert_eq!(between("", "").unwrap(), "n");
    }

    #[test]
    fn test_consecutive_letters() {
        assert_eq!(assert_between("a", "b"), "an");
        assert_eq!(assert_between("az", "b"), "azn");
        assert_eq!(assert_between("m", "n"), "mn");
    }

    #[test]
    fn test_open_ended_bounds() {
        assert_between("a", "");
        assert_between("", "b");
        assert_eq!(between("n", "").unwrap(), "u");
        assert_eq!(between("", "n").unwrap(), "g");
        assert_eq!(between("", "b").unwrap(), "an");
    }

    #[test]
    fn test_prev_is_prefix_of_next() {
        assert_eq!(assert_between("a", "ab"), "aan");
        assert_between("abc", "abcd");
        assert_between("n", "nab");
    }

    #[test]
    fn test_wide_gap_uses_midpoint() {
        assert_eq!(assert_between("a", "z"), "n");
        assert_eq!(assert_between("abc", "abx"), "abn");
    }

    #[test]
    fn test_repeated_append_stays_ordered() {
        let mut keys = vec![after("").unwrap()];
        for _ in 0..100 {
            let next = after(keys.last().unwrap()).unwrap();
            keys.push(next);
        }
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_repeated_prepend_stays_ordered() {
        let mut keys = vec![before("").unwrap()];
        for _ in 0..100 {
            let first = before(&keys[0]).unwrap();
            keys.insert(0, first);
        }
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| !k.ends_with('a')));
    }

    #[test]
    fn test_repeated_bisection_stays_ordered() {
        let low = "b".to_string();
        let mut high = "c".to_string();
        for _ in 0..100 {
            high = assert_between(&low, &high);
        }

        let mut low = "b".to_string();
        let high = "c".to_string();
        for _ in 0..100 {
            low = assert_between(&low, &high);
        }
    }

    #[test]
    fn test_rejects_uppercase_and_digits() {
        assert!(matches!(
            between("A", ""),
            Err(RankError::InvalidCharacter { found: 'A', .. })
        ));
        assert!(matches!(
            between("", "a1"),
            Err(RankError::InvalidCharacter { found: '1', .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_or_equal_bounds() {
        assert!(matches!(between("b", "a"), Err(RankError::OutOfOrder { .. })));
        assert!(matches!(between("m", "m"), Err(RankError::OutOfOrder { .. })));
    }

    #[test]
    fn test_no_room_below_a() {
        assert!(matches!(between("", "a"), Err(RankError::NoRoom { .. })));
        assert!(matches!(between("", "aaa"), Err(RankError::NoRoom { .. })));
    }
}
