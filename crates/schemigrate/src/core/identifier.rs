//! Identifier validation and quoting.
//!
//! Identifiers cannot be bound as parameters, so table, column and constraint
//! names are checked and quoted before they reach SQL text. Check-constraint
//! expressions are screened for statement separators and comments.

use crate::error::{MigrateError, Result};

/// Longest identifier accepted on any engine (SQL Server allows 128).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject empty identifiers, NUL bytes and names over [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::InvalidIdentifier(format!(
            "identifier exceeds {} bytes (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate `name` and wrap it in `open`/`close`, doubling any embedded `close`.
///
/// ```ignore
/// assert_eq!(quote_delimited("a\"b", '"', '"')?, "\"a\"\"b\"");
/// assert_eq!(quote_delimited("x]y", '[', ']')?, "[x]]y]");
/// ```
pub fn quote_delimited(name: &str, open: char, close: char) -> Result<String> {
    validate_identifier(name)?;
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(open);
    for ch in name.chars() {
        if ch == close {
            quoted.push(close);
        }
        quoted.push(ch);
    }
    quoted.push(close);
    Ok(quoted)
}

/// Screen a check-constraint expression.
///
/// Rejects `;`, comment markers and `EXEC`/`EXECUTE` as a word. Expressions are
/// otherwise passed through verbatim.
pub fn validate_check_expression(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(MigrateError::InvalidIdentifier(
            "check expression cannot be empty".to_string(),
        ));
    }

    if expression.contains(';') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "check expression contains a statement separator: {:?}",
            expression
        )));
    }

    if ["--", "/*", "*/"].iter().any(|m| expression.contains(m)) {
        return Err(MigrateError::InvalidIdentifier(format!(
            "check expression contains a comment marker: {:?}",
            expression
        )));
    }

    let executes = expression
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| word.eq_ignore_ascii_case("exec") || word.eq_ignore_ascii_case("execute"));
    if executes {
        return Err(MigrateError::InvalidIdentifier(format!(
            "check expression contains EXEC: {:?}",
            expression
        )));
    }

    Ok(())
}
