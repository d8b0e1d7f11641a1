//! Reader for `key=value` properties files.
//!
//! Supported syntax:
//! - `#` and `!` start a comment line;
//! - the key ends at the first unescaped `=`, `:` or whitespace;
//! - a line ending with an odd number of backslashes continues on the next
//!   line, whose leading whitespace is dropped;
//! - escapes `\t`, `\n`, `\r`, `\f`, `\uXXXX`; any other escaped character
//!   stands for itself.
//!
//! A key appearing twice keeps its last value.

use std::path::Path;

use dropin_core::Properties;

use crate::error::{io_err, DeployError, PropertiesError};

const BLANKS: &[char] = &[' ', '\t', '\x0c'];
const SEPARATORS: &[char] = &['=', ':'];

/// Read and parse the properties file at `path`.
pub fn read(path: &Path) -> Result<Properties, DeployError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse(&text).map_err(|source| DeployError::Properties {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse(text: &str) -> Result<Properties, PropertiesError> {
    let mut properties = Properties::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let line = line.trim_start_matches(BLANKS);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_string();
        while continues(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start_matches(BLANKS)),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let line_number = index + 1;
        properties.insert(unescape(key, line_number)?, unescape(value, line_number)?);
    }
    Ok(properties)
}

fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..index], line[index + 1..].trim_start_matches(BLANKS)),
            ' ' | '\t' | '\x0c' => {
                let rest = line[index..].trim_start_matches(BLANKS);
                let rest = rest
                    .strip_prefix(SEPARATORS)
                    .map(|rest| rest.trim_start_matches(BLANKS))
                    .unwrap_or(rest);
                return (&line[..index], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str, line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = (hex.chars().count() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| PropertiesError {
                        line,
                        reason: format!("malformed \\u escape '\\u{hex}'"),
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
