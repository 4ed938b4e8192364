//! Rewrites `?` placeholders to the `$1..$n` form the server expects.
//!
//! The text is tokenized with the PostgreSQL dialect so a `?` inside a
//! string literal, a quoted identifier or a comment is left alone.
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Tokenizer};

use crate::error::{Error, Result};

pub fn number_placeholders(sql: &str) -> Result<String> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| Error::QueryText(e.to_string()))?;

    let line_starts = line_starts(sql);
    let mut out = String::with_capacity(sql.len() + 16);
    let mut cursor = 0;
    let mut count = 0;
    for token in &tokens {
        let text = token.token.to_string();
        if is_numbered(&text) {
            return Err(Error::QueryText(format!(
                "numbered placeholder {} mixed with ? placeholders",
                text
            )));
        }
        if text != "?" {
            continue;
        }
        let offset = byte_offset(sql, &line_starts, &token.span.start)
            .filter(|o| sql[*o..].starts_with('?'))
            .ok_or_else(|| {
                Error::QueryText(format!("cannot locate placeholder at {:?}", token.span.start))
            })?;
        count += 1;
        out.push_str(&sql[cursor..offset]);
        out.push('$');
        out.push_str(&count.to_string());
        cursor = offset + 1;
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}

fn is_numbered(text: &str) -> bool {
    text.strip_prefix('$')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn line_starts(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Tokenizer locations are one-based lines and one-based character columns.
fn byte_offset(sql: &str, line_starts: &[usize], location: &Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
    let start = *line_starts.get(line)?;
    sql[start..]
        .char_indices()
        .nth(column)
        .map(|(i, _)| start + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_in_order() {
        assert_eq!(
            number_placeholders("SELECT a FROM t WHERE a = ? AND b = CAST(? AS inet)").unwrap(),
            "SELECT a FROM t WHERE a = $1 AND b = CAST($2 AS inet)"
        );
    }

    #[test]
    fn test_literals_and_comments_untouched() {
        let sql = "SELECT '?', \"what?\" FROM t -- really?\nWHERE a = ?";
        assert_eq!(
            number_placeholders(sql).unwrap(),
            "SELECT '?', \"what?\" FROM t -- really?\nWHERE a = $1"
        );
    }

    #[test]
    fn test_multibyte_text_before_placeholder() {
        assert_eq!(
            number_placeholders("SELECT 'héllo'\n, ?").unwrap(),
            "SELECT 'héllo'\n, $1"
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(number_placeholders("SELECT 1").unwrap(), "SELECT 1");
    }

    #[test]
    fn test_rejects_mixed_styles() {
        let err = number_placeholders("SELECT $1, ?").unwrap_err();
        assert!(matches!(err, Error::QueryText(_)));
    }

    #[test]
    fn test_unterminated_literal() {
        assert!(matches!(
            number_placeholders("SELECT 'oops"),
            Err(Error::QueryText(_))
        ));
    }
}
