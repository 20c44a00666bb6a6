//! `@file` command-line expansion.
//!
//! An argument of the form `@params.txt` is replaced by the tokens of that
//! file before clap parsing: one token per whitespace-delimited word, lines
//! starting with `#` are comments, double-quoted spans group words, and
//! `\"` escapes a literal quote.

use std::fs;
use std::io;

/// Split one line into tokens, honouring quotes and `\"` escapes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for c in line.chars() {
        if c == '"' {
            if current.ends_with('\\') {
                current.pop();
                current.push('"');
            } else {
                in_quote = !in_quote;
            }
        } else if c.is_whitespace() && !in_quote {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Expand every `@file` argument in place. Expanded tokens are not scanned
/// for further `@` references.
pub fn expand_at_args<I>(args: I) -> io::Result<Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    for arg in args {
        match arg.strip_prefix('@') {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    io::Error::new(e.kind(), format!("cannot read argument file {path}: {e}"))
                })?;
                for line in text.lines() {
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    out.extend(tokenize(line));
                }
            }
            None => out.push(arg),
        }
    }
    Ok(out)
}

/// The process arguments with `@file` references expanded.
pub fn expanded_args() -> io::Result<Vec<String>> {
    expand_at_args(std::env::args())
}
