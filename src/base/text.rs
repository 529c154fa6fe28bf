//! ASCII text utilities.
//!
//! CIF names (data blocks, categories, items) compare case-insensitively
//! over ASCII only; folding touches A–Z and nothing else. No Unicode
//! tables are consulted anywhere in this crate.

use std::cmp::Ordering;

/// ASCII lower-casing of a single byte, folding A–Z only.
#[inline]
pub(crate) fn fold(b: u8) -> u8 {
    if b.is_ascii_uppercase() { b + 32 } else { b }
}

/// Case-insensitive equality, ASCII-only folding.
#[inline]
pub fn iequals(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .all(|(x, y)| fold(x) == fold(y))
}

/// Case-insensitive three-way compare, bytewise with ASCII folding.
pub fn icompare(a: &str, b: &str) -> Ordering {
    let mut ia = a.bytes();
    let mut ib = b.bytes();
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match fold(x).cmp(&fold(y)) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Does `s` start with `prefix`, compared case-insensitively?
pub fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && iequals(&s[..prefix.len()], prefix)
}

/// Does `s` contain `needle` anywhere, compared case-insensitively?
pub fn contains_ignore_case(s: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if s.len() < needle.len() {
        return false;
    }
    (0..=s.len() - needle.len()).any(|i| iequals(&s[i..i + needle.len()], needle))
}

/// ASCII lower-cased copy, used for name keys in ordered maps.
pub(crate) fn to_lower(s: &str) -> String {
    s.bytes().map(|b| fold(b) as char).collect()
}

/// CIF whitespace is space, tab, and line feed (CR is normalized away by
/// the scanner before classification).
#[inline]
pub fn is_cif_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n'
}

/// Split a full tag into `(category, item)`.
///
/// `_atom_site.label` → `("atom_site", "label")`. A leading underscore is
/// stripped; without a dot the category is empty and the whole name is the
/// item (legacy single-part tags).
pub fn split_tag_name(tag: &str) -> (&str, &str) {
    let tag = tag.strip_prefix('_').unwrap_or(tag);
    match tag.find('.') {
        Some(ix) => (&tag[..ix], &tag[ix + 1..]),
        None => ("", tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iequals() {
        assert!(iequals("ATOM_SITE", "atom_site"));
        assert!(iequals("", ""));
        assert!(!iequals("atom", "atoms"));
        // Folding is ASCII-only: these differ.
        assert!(!iequals("é", "É"));
    }

    #[test]
    fn test_icompare_ordering() {
        assert_eq!(icompare("aap", "AAP"), Ordering::Equal);
        assert_eq!(icompare("aap", "noot"), Ordering::Less);
        assert_eq!(icompare("noot", "aap"), Ordering::Greater);
        assert_eq!(icompare("aa", "aap"), Ordering::Less);
    }

    #[test]
    fn test_starts_and_contains() {
        assert!(starts_with_ignore_case("DATA_test", "data_"));
        assert!(!starts_with_ignore_case("dat", "data_"));
        assert!(contains_ignore_case("and STOP_ this too", "stop_"));
        assert!(!contains_ignore_case("boo.data_.whatever", "loop_"));
    }

    #[test]
    fn test_split_tag_name() {
        assert_eq!(split_tag_name("_atom_site.label"), ("atom_site", "label"));
        assert_eq!(split_tag_name("_cell_length_a"), ("", "cell_length_a"));
        assert_eq!(split_tag_name("t.id"), ("t", "id"));
    }
}
