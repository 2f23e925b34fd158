//! Minimal lexer for the `CREATE TABLE` text SQLite keeps in `sqlite_master`.
//!
//! Only enough structure is recovered to split the definition list into
//! top-level entries and to find named constraints inside them.

use crate::core::schema::ConstraintKind;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Literal,
    Punct(char),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
}

fn lex(sql: &str) -> Vec<Spanned> {
    let mut out = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '"' | '`' | '[' | '\'' => {
                let close = if ch == '[' { ']' } else { ch };
                let mut text = String::new();
                while let Some((_, c)) = chars.next() {
                    if c == close {
                        // doubled delimiter is an escape, except for brackets
                        if close != ']' && chars.peek().map(|(_, n)| *n) == Some(close) {
                            chars.next();
                            text.push(c);
                            continue;
                        }
                        break;
                    }
                    text.push(c);
                }
                if ch == '\'' {
                    Token::Literal
                } else {
                    Token::Quoted(text)
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut text = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if n.is_alphanumeric() || *n == '_' {
                        text.push(*n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Word(text)
            }
            c => Token::Punct(c),
        };
        out.push(Spanned { token, start });
    }
    out
}

fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
}

fn ident_text(token: &Token) -> Option<&str> {
    match token {
        Token::Word(w) | Token::Quoted(w) => Some(w),
        _ => None,
    }
}

/// Split the parenthesised definition list of a `CREATE TABLE` statement.
pub(super) fn split_definitions(create_sql: &str) -> Result<Vec<String>> {
    let tokens = lex(create_sql);
    let mut depth = 0usize;
    let mut open = None;
    let mut closed = false;
    let mut cuts = Vec::new();

    for spanned in &tokens {
        match spanned.token {
            Token::Punct('(') => {
                depth += 1;
                if depth == 1 && open.is_none() {
                    open = Some(spanned.start + 1);
                }
            }
            Token::Punct(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 && open.is_some() {
                    cuts.push(spanned.start);
                    closed = true;
                    break;
                }
            }
            Token::Punct(',') if depth == 1 => cuts.push(spanned.start),
            _ => {}
        }
    }

    let Some(mut from) = open.filter(|_| closed) else {
        return Err(MigrateError::Migration(format!(
            "cannot parse table definition: {}",
            create_sql
        )));
    };

    let mut parts = Vec::with_capacity(cuts.len());
    for cut in cuts {
        parts.push(create_sql[from..cut].trim().to_string());
        from = cut + 1;
    }
    Ok(parts)
}

/// Column name of a definition entry, or `None` for a table constraint.
pub(super) fn column_name(definition: &str) -> Option<String> {
    let tokens = lex(definition);
    let first = &tokens.first()?.token;
    if ["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK"]
        .iter()
        .any(|k| is_keyword(first, k))
    {
        return None;
    }
    ident_text(first).map(str::to_string)
}

/// Named constraints in a definition entry with the byte offset of their `CONSTRAINT` keyword.
pub(super) fn named_constraints(definition: &str) -> Vec<(String, ConstraintKind, usize)> {
    let tokens = lex(definition);
    let mut found = Vec::new();
    for window in tokens.windows(3) {
        if !is_keyword(&window[0].token, "CONSTRAINT") {
            continue;
        }
        let Some(name) = ident_text(&window[1].token) else {
            continue;
        };
        let kind = match &window[2].token {
            t if is_keyword(t, "PRIMARY") => ConstraintKind::PrimaryKey,
            t if is_keyword(t, "FOREIGN") || is_keyword(t, "REFERENCES") => {
                ConstraintKind::ForeignKey
            }
            t if is_keyword(t, "UNIQUE") => ConstraintKind::Unique,
            t if is_keyword(t, "CHECK") => ConstraintKind::Check,
            _ => continue,
        };
        found.push((name.to_string(), kind, window[0].start));
    }
    found
}

/// Whether `column` appears in the first parenthesised group of `sql`: the key
/// columns of an index or table constraint, or the expression of a check.
pub(super) fn first_group_mentions(sql: &str, column: &str) -> bool {
    let mut depth = 0usize;
    for spanned in lex(sql) {
        match &spanned.token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return false;
                }
            }
            token if depth > 0 => {
                if ident_text(token).is_some_and(|name| name.eq_ignore_ascii_case(column)) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Name of the index created by a stored `CREATE [UNIQUE] INDEX` statement.
pub(super) fn created_index_name(create_sql: &str) -> Option<String> {
    let tokens = lex(create_sql);
    let mut rest = tokens.iter().map(|s| &s.token).skip_while(|t| !is_keyword(t, "INDEX"));
    rest.next()?;
    let mut next = rest.next()?;
    if is_keyword(next, "IF") {
        // IF NOT EXISTS
        next = rest.nth(2)?;
    }
    ident_text(next).map(str::to_string)
}

/// Split a declared type such as `VARCHAR(50)` or `DECIMAL(10,2)` into base and arguments.
pub(super) fn parse_declared_type(declared: &str) -> (String, Option<u32>, Option<u32>) {
    let declared = declared.trim();
    let Some(open) = declared.find('(') else {
        return (declared.to_uppercase(), None, None);
    };
    let base = declared[..open].trim().to_uppercase();
    let args: Vec<u32> = declared[open + 1..]
        .trim_end_matches(')')
        .split(',')
        .filter_map(|a| a.trim().parse().ok())
        .collect();
    (base, args.first().copied(), args.get(1).copied())
}
