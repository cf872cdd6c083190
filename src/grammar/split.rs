//! Top-level splitting of script text.
//!
//! A `>` or `|` only separates when it is outside double quotes and outside any
//! `()`, `[]` or `{}` pair. `~` escapes the following character.

use crate::imports::*;

/// Byte offsets of top-level separators and of closing brackets that return to depth zero.
fn scan(text: &str) -> std::result::Result<Vec<(usize, char)>, ErrorLog> {
    let mut quoted = false;
    let mut stack: Vec<(usize, char)> = Vec::new();
    let mut marks = Vec::new();
    let mut chars = text.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '~' => {
                chars.next();
            }
            '"' => quoted = !quoted,
            _ if quoted => {}
            '(' | '[' | '{' => stack.push((i, c)),
            ')' | ']' | '}' => match stack.pop() {
                Some((_, open)) if closer(open) == c => {
                    if stack.is_empty() {
                        marks.push((i, c));
                    }
                }
                Some((at, open)) => {
                    return Err(ErrorLog::fatal(format!(
                        "Mismatched `{c}` at position {i}, `{open}` opened at position {at} in `{text}`"
                    )));
                }
                None => {
                    return Err(ErrorLog::fatal(format!(
                        "Unbalanced `{c}` at position {i} in `{text}`"
                    )));
                }
            },
            '>' | '|' if stack.is_empty() => marks.push((i, c)),
            _ => {}
        }
    }

    match stack.pop() {
        Some((at, open)) => Err(ErrorLog::fatal(format!(
            "Unclosed `{open}` at position {at} in `{text}`"
        ))),
        None => Ok(marks),
    }
}

fn closer(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Splits a script into its origin and the pipeline text that follows the first top-level `>`.
///
/// A leading `->` becomes an explicit `print` step.
pub fn split_origin(script: &str) -> std::result::Result<(String, String), ErrorLog> {
    let marks = scan(script)?;
    let Some(&(at, _)) = marks.iter().find(|(_, c)| *c == '>') else {
        return Ok((script.trim().to_string(), String::new()));
    };

    let origin = &script[..at];
    let rest = script[at + 1..].trim();
    match origin.strip_suffix('-') {
        Some(origin) if rest.is_empty() => Ok((origin.trim().to_string(), "print".to_string())),
        Some(origin) => Ok((origin.trim().to_string(), format!("print > {rest}"))),
        None => Ok((origin.trim().to_string(), rest.to_string())),
    }
}

/// Splits pipeline text into steps on top-level `>`. Each `->` adds a `print` step.
pub fn segments(pipeline: &str) -> std::result::Result<Vec<String>, ErrorLog> {
    let marks = scan(pipeline)?;
    let mut out = Vec::new();
    let mut start = 0;

    for (at, _) in marks.into_iter().filter(|(_, c)| *c == '>') {
        let before = &pipeline[start..at];
        match before.strip_suffix('-') {
            Some(before) => {
                out.push(before.trim().to_string());
                out.push("print".to_string());
            }
            None => out.push(before.trim().to_string()),
        }
        start = at + 1;
    }
    out.push(pipeline[start..].trim().to_string());

    // `a -> b` leaves an empty step where the arrow began, drop it
    if out.len() > 1 && out[0].is_empty() && out[1] == "print" {
        out.remove(0);
    }
    Ok(out)
}

/// Splits the contents of a `[...]` on top-level `|`.
pub fn alternatives(text: &str) -> std::result::Result<Vec<String>, ErrorLog> {
    let marks = scan(text)?;
    let mut out = Vec::new();
    let mut start = 0;
    for (at, _) in marks.into_iter().filter(|(_, c)| *c == '|') {
        out.push(text[start..at].trim().to_string());
        start = at + 1;
    }
    out.push(text[start..].trim().to_string());
    Ok(out)
}

/// For text starting with `(` or `[`, returns what is inside the matching bracket and what follows it.
pub fn enclosed(text: &str) -> std::result::Result<(&str, &str), ErrorLog> {
    let marks = scan(text)?;
    match marks.iter().find(|(_, c)| matches!(c, ')' | ']' | '}')) {
        Some(&(at, _)) => Ok((&text[1..at], &text[at + 1..])),
        None => Err(ErrorLog::fatal(format!("Expected a bracketed expression in `{text}`"))),
    }
}
