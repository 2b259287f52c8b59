use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use xxhash_rust::xxh64::Xxh64;

use crate::error::{Error, Result};

const SEP: u8 = 0xff;

lazy_static! {
    static ref LABEL_PAIR_RE: Regex =
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"((?:[^"\\]|\\.)*)""#).unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, escape(&self.value))
    }
}

/// Writes `{a="1", b="2"}`.
pub fn write_labels<'a, I>(f: &mut fmt::Formatter<'_>, labels: I) -> fmt::Result
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    write!(f, "{{")?;
    for (i, (name, value)) in labels.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}=\"{}\"", name, escape(value))?;
    }
    write!(f, "}}")
}

/// Parses the `{a="1", b="2"}` form written by [`write_labels`].
pub fn parse_labels(s: &str) -> Result<Vec<Label>> {
    let trimmed = s.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| Error::InvalidLabels(format!("expected {{...}}, got {:?}", s)))?;

    let mut labels = vec![];
    let mut last = 0;
    for caps in LABEL_PAIR_RE.captures_iter(inner) {
        let Some(m) = caps.get(0) else { continue };
        let gap = inner[last..m.start()].trim();
        let gap_ok = if labels.is_empty() { gap.is_empty() } else { gap == "," };
        if !gap_ok {
            return Err(Error::InvalidLabels(format!("unexpected {:?} in {:?}", gap, s)));
        }
        labels.push(Label::new(&caps[1], unescape(&caps[2])));
        last = m.end();
    }
    let rest = inner[last..].trim();
    if !(rest.is_empty() || (rest == "," && !labels.is_empty())) {
        return Err(Error::InvalidLabels(format!("unexpected {:?} in {:?}", rest, s)));
    }
    Ok(labels)
}

/// Feeds `name 0xff value 0xff` for every label into the hasher.
pub fn hash_labels<'a, I>(hasher: &mut Xxh64, labels: I)
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    for (name, value) in labels {
        hasher.update(name.as_bytes());
        hasher.update(&[SEP]);
        hasher.update(value.as_bytes());
        hasher.update(&[SEP]);
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_simple_pairs() {
        let labels = parse_labels(r#"{job="team-a/worker-1", __address__="node01:12345"}"#).unwrap();
        assert_eq!(
            labels,
            vec![
                Label::new("job", "team-a/worker-1"),
                Label::new("__address__", "node01:12345"),
            ]
        );
    }

    #[test]
    fn parse_values_with_separators() {
        let labels = parse_labels(r#"{a="x,y=z", b="say \"hi\"\n"}"#).unwrap();
        assert_eq!(labels[0].value, "x,y=z");
        assert_eq!(labels[1].value, "say \"hi\"\n");
    }

    #[test]
    fn parse_empty_set() {
        assert!(parse_labels("{}").unwrap().is_empty());
        assert!(parse_labels("  { }  ").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_labels(r#"job="a""#).is_err());
        assert!(parse_labels(r#"{job="a" pod="b"}"#).is_err());
        assert!(parse_labels(r#"{job=a}"#).is_err());
        assert!(parse_labels(r#"{, job="a"}"#).is_err());
    }

    #[test]
    fn label_display_escapes() {
        assert_eq!(Label::new("a", "q\"uote").to_string(), r#"a="q\"uote""#);
    }
}
