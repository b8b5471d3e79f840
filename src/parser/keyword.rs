//! Keyword scanning over line-oriented xCAT command output.
//!
//! A table of `(substring, setter)` pairs is applied to every line. The first
//! keyword found on a line claims it, and each keyword only binds on the first
//! line it appears in.

use crate::error::{Result, ZvmError};

/// One entry of a keyword table.
pub struct Keyword<T> {
    pub pattern: &'static str,
    pub set: fn(&mut T, String),
}

impl<T> Keyword<T> {
    pub const fn new(pattern: &'static str, set: fn(&mut T, String)) -> Self {
        Self { pattern, set }
    }
}

/// Result of a scan: the populated target and how many keywords bound.
#[derive(Debug, Default)]
pub struct Matched<T> {
    pub fields: T,
    pub count: usize,
}

/// Text following `pattern`, trimmed, with one pair of surrounding quotes removed.
pub fn value_after<'a>(line: &'a str, pattern: &str) -> Option<&'a str> {
    let start = line.find(pattern)? + pattern.len();
    Some(strip_quotes(&line[start..]))
}

fn strip_quotes(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix('"').unwrap_or(s);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.trim()
}

/// Scans `lines` with `table`. Keywords that never occur stay unset.
pub fn match_lines<'a, T, I>(lines: I, table: &[Keyword<T>]) -> Matched<T>
where
    T: Default,
    I: IntoIterator<Item = &'a str>,
{
    let mut fields = T::default();
    let mut bound = vec![false; table.len()];
    let mut count = 0;

    for line in lines {
        for (idx, kw) in table.iter().enumerate() {
            if let Some(value) = value_after(line, kw.pattern) {
                if !bound[idx] {
                    (kw.set)(&mut fields, value.to_string());
                    bound[idx] = true;
                    count += 1;
                }
                break;
            }
        }
    }

    Matched { fields, count }
}

/// Like [`match_lines`], but an input where no keyword matched at all is a
/// malformed response rather than an empty record.
pub fn match_required<'a, T, I>(lines: I, table: &[Keyword<T>], what: &str) -> Result<T>
where
    T: Default,
    I: IntoIterator<Item = &'a str>,
{
    let matched = match_lines(lines, table);
    if matched.count == 0 {
        let expected: Vec<&str> = table.iter().map(|k| k.pattern).collect();
        return Err(ZvmError::malformed(format!(
            "no value for {} (expected one of {:?})",
            what, expected
        )));
    }
    Ok(matched.fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug)]
    struct Pair {
        name: Option<String>,
        size: Option<String>,
    }

    const TABLE: &[Keyword<Pair>] = &[
        Keyword::new("Name:", |p, v| p.name = Some(v)),
        Keyword::new("Size:", |p, v| p.size = Some(v)),
    ];

    #[test]
    fn test_value_after_strips_quotes_and_spaces() {
        assert_eq!(value_after("n: Size: \"42 KB\" ", "Size:"), Some("42 KB"));
        assert_eq!(value_after("n: Size:   7", "Size:"), Some("7"));
        assert_eq!(value_after("n: other", "Size:"), None);
    }

    #[test]
    fn test_first_matching_line_wins() {
        let m = match_lines(["Name: a", "Name: b", "Size: 1"], TABLE);
        assert_eq!(m.count, 2);
        assert_eq!(m.fields.name.as_deref(), Some("a"));
        assert_eq!(m.fields.size.as_deref(), Some("1"));
    }

    #[test]
    fn test_line_contributes_one_field() {
        let m = match_lines(["Name: x Size: 3"], TABLE);
        assert_eq!(m.count, 1);
        assert_eq!(m.fields.name.as_deref(), Some("x Size: 3"));
        assert!(m.fields.size.is_none());
    }

    #[test]
    fn test_missing_keywords_stay_unset() {
        let m = match_lines(["nothing here"], TABLE);
        assert_eq!(m.count, 0);
        assert!(m.fields.name.is_none());
    }

    #[test]
    fn test_required_rejects_empty_match() {
        let err = match_required(["junk"], TABLE, "pair").unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
        assert!(match_required(["Size: 9"], TABLE, "pair").is_ok());
    }
}
