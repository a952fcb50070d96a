//! Parser for bundled static configuration files
//!
//! The format is a sequence of brace-delimited stanzas:
//!
//! ```text
//! service {
//!     proto-fd-max 15000
//! }
//! namespace test {
//!     replication-factor 2
//!     storage-engine device {
//!         file /opt/data/test.dat
//!     }
//! }
//! ```
//!
//! Stanza headers (including their qualifier) become key path segments, so
//! the above yields `namespace.test.replication-factor`. A key repeated in
//! the same stanza keeps every value, joined with `,`.

use crate::error::StaticConfigError;
use bundlecheck_core::flatten::join_key;
use std::collections::BTreeMap;

pub fn parse(text: &str) -> Result<Vec<(String, String)>, StaticConfigError> {
    let mut stack: Vec<String> = Vec::new();
    let mut values: BTreeMap<String, String> = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if line == "}" {
            if stack.pop().is_none() {
                return Err(StaticConfigError::UnmatchedBrace { line: idx + 1 });
            }
            continue;
        }

        if let Some(header) = line.strip_suffix('{') {
            let segment = header.split_whitespace().collect::<Vec<_>>().join(".");
            let path = join_key(stack.last().map(String::as_str), &segment);
            stack.push(path);
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default().trim();
        let path = join_key(stack.last().map(String::as_str), key);

        values
            .entry(path)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    if let Some(open) = stack.pop() {
        return Err(StaticConfigError::UnclosedStanza { stanza: open });
    }

    Ok(values.into_iter().collect())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}
