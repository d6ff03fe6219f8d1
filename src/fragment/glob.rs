// src/fragment/glob.rs

//! Brace expansion and glob-to-regex translation.

/// Quantifier for `*` wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Star {
    /// `([^/]+)`: namespace keys and target partial patterns.
    OneOrMore,
    /// `([^/]*)`: whole-value globs such as definitions.
    ZeroOrMore,
}

impl Star {
    fn group(self) -> &'static str {
        match self {
            Star::OneOrMore => "([^/]+)",
            Star::ZeroOrMore => "([^/]*)",
        }
    }
}

struct BraceGroup {
    /// Byte index of the closing `}`.
    end: usize,
    alternatives: Vec<String>,
}

/// Inspect the `{` at byte `start`. Returns `None` when the braces are not a
/// real group (unbalanced, or neither a comma list nor a range), in which case
/// they are literal text.
fn brace_group(s: &str, start: usize) -> Option<BraceGroup> {
    let mut depth = 0usize;
    let mut commas = Vec::new();
    for (i, c) in s[start..].char_indices() {
        let i = start + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let body = &s[start + 1..i];
                    let alternatives = if commas.is_empty() {
                        range(body)?
                    } else {
                        let mut alts = Vec::with_capacity(commas.len() + 1);
                        let mut from = start + 1;
                        for comma in &commas {
                            alts.push(s[from..*comma].to_string());
                            from = comma + 1;
                        }
                        alts.push(s[from..i].to_string());
                        alts
                    };
                    return Some(BraceGroup {
                        end: i,
                        alternatives,
                    });
                }
            }
            ',' if depth == 1 => commas.push(i),
            _ => {}
        }
    }
    None
}

/// `1..3` or `a..c`.
fn range(body: &str) -> Option<Vec<String>> {
    let (lo, hi) = body.split_once("..")?;
    if let (Ok(lo), Ok(hi)) = (lo.parse::<i64>(), hi.parse::<i64>()) {
        let items: Vec<String> = if lo <= hi {
            (lo..=hi).map(|n| n.to_string()).collect()
        } else {
            (hi..=lo).rev().map(|n| n.to_string()).collect()
        };
        return Some(items);
    }

    let mut lo_chars = lo.chars();
    let mut hi_chars = hi.chars();
    match (lo_chars.next(), lo_chars.next(), hi_chars.next(), hi_chars.next()) {
        (Some(a), None, Some(b), None) if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
            let (a, b) = (a as u8, b as u8);
            let items = if a <= b {
                (a..=b).map(|c| (c as char).to_string()).collect()
            } else {
                (b..=a).rev().map(|c| (c as char).to_string()).collect()
            };
            Some(items)
        }
        _ => None,
    }
}

/// Expand every brace group, leftmost first, preserving order.
///
/// `{a,b}/c` becomes `["a/c", "b/c"]`; text without groups expands to itself.
pub fn expand_braces(s: &str) -> Vec<String> {
    for (i, c) in s.char_indices() {
        if c != '{' {
            continue;
        }
        if let Some(group) = brace_group(s, i) {
            let prefix = &s[..i];
            let suffix = &s[group.end + 1..];
            return group
                .alternatives
                .iter()
                .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
                .collect();
        }
    }
    vec![s.to_string()]
}

/// Translate a glob into regex source (unanchored).
///
/// Every `*` becomes one capturing group; brace groups become non-capturing
/// alternations so the capture count equals the number of stars.
pub fn glob_to_regex(glob: &str, star: Star) -> String {
    let mut out = String::new();
    let mut iter = glob.char_indices();
    while let Some((i, c)) = iter.next() {
        match c {
            '*' => out.push_str(star.group()),
            '{' => match brace_group(glob, i) {
                Some(group) => {
                    let alts: Vec<String> = group
                        .alternatives
                        .iter()
                        .map(|alt| glob_to_regex(alt, star))
                        .collect();
                    out.push_str("(?:");
                    out.push_str(&alts.join("|"));
                    out.push(')');
                    // skip past the closing brace
                    for (j, _) in iter.by_ref() {
                        if j == group.end {
                            break;
                        }
                    }
                }
                None => out.push_str(&regex::escape("{")),
            },
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out
}
