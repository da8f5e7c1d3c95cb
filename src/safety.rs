//! Read-only statement gate.
//!
//! Classification is intentionally conservative and text-based: the first
//! keyword of the statement decides, after leading comments and stray
//! semicolons are stripped. Anything the classifier does not recognize as
//! mutating passes through; the database user's own grants remain the
//! backstop.

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{DbError, DbResult};

/// Statement-leading keywords that mark a statement as mutating.
pub const MUTATING_KEYWORDS: [&str; 13] = [
    "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME",
    "GRANT", "REVOKE", "COMMIT", "ROLLBACK",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub mutating: bool,
    pub keyword: Option<&'static str>,
}

impl Classification {
    const PASS: Self = Self {
        mutating: false,
        keyword: None,
    };
}

/// Classify a statement by its leading keyword.
pub fn classify(sql: &str) -> Classification {
    let Some(word) = leading_word(sql) else {
        return Classification::PASS;
    };
    for keyword in MUTATING_KEYWORDS {
        if word.eq_ignore_ascii_case(keyword) {
            return Classification {
                mutating: true,
                keyword: Some(keyword),
            };
        }
    }
    Classification::PASS
}

/// Classify and reject mutating statements.
pub fn ensure_read_only(sql: &str) -> DbResult<()> {
    match classify(sql) {
        Classification {
            mutating: true,
            keyword: Some(keyword),
        } => Err(DbError::policy_violation(keyword)),
        _ => Ok(()),
    }
}

/// Reject requests that pack several statements into one string. Statements
/// that do not parse are let through; the backend produces the authoritative
/// syntax error.
pub fn ensure_single_statement(sql: &str) -> DbResult<()> {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) if statements.len() > 1 => Err(DbError::driver(
            "query contains multiple statements; submit one statement per request",
            None,
        )),
        _ => Ok(()),
    }
}

/// First word of the statement, with leading whitespace, semicolons and
/// comments stripped. The full word is taken, so identifiers that merely
/// start with a keyword ("createdAt", "delete_log") do not match.
fn leading_word(sql: &str) -> Option<&str> {
    let rest = skip_trivia(sql);
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    if end == 0 { None } else { Some(&rest[..end]) }
}

fn skip_trivia(mut s: &str) -> &str {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix(';') {
            s = rest;
        } else if let Some(rest) = s.strip_prefix("--") {
            s = match rest.find('\n') {
                Some(idx) => &rest[idx + 1..],
                None => "",
            };
        } else if let Some(rest) = s.strip_prefix("/*") {
            s = match rest.find("*/") {
                Some(idx) => &rest[idx + 2..],
                None => "",
            };
        } else {
            return s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mutating_keyword_is_blocked() {
        for keyword in MUTATING_KEYWORDS {
            let sql = format!("{} something", keyword);
            let result = classify(&sql);
            assert!(result.mutating, "{keyword} should be blocked");
            assert_eq!(result.keyword, Some(keyword));
        }
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert!(classify("drop table users").mutating);
        assert!(classify("Insert INTO t VALUES (1)").mutating);
    }

    #[test]
    fn test_select_passes() {
        assert!(!classify("SELECT * FROM users").mutating);
        assert!(!classify("WITH recent AS (SELECT 1) SELECT * FROM recent").mutating);
        assert!(!classify("EXPLAIN SELECT 1").mutating);
        assert!(!classify("SHOW TABLES").mutating);
    }

    #[test]
    fn test_leading_trivia_is_skipped() {
        assert!(classify(";; DROP TABLE x").mutating);
        assert!(classify("  -- harmless comment\nDELETE FROM t").mutating);
        assert!(classify("/* multi\nline */ TRUNCATE t").mutating);
        assert!(!classify("-- DROP TABLE x\nSELECT 1").mutating);
    }

    #[test]
    fn test_identifiers_starting_with_keyword_pass() {
        assert!(!classify("createdAt").mutating);
        assert!(!classify("delete_log").mutating);
        assert!(!classify("update2 stats").mutating);
    }

    #[test]
    fn test_empty_and_comment_only_input_pass() {
        assert!(!classify("").mutating);
        assert!(!classify("   ").mutating);
        assert!(!classify("-- nothing here").mutating);
        assert!(!classify("/* unterminated").mutating);
    }

    #[test]
    fn test_ensure_read_only_names_keyword() {
        let err = ensure_read_only("DROP TABLE users").unwrap_err();
        assert!(err.to_string().contains("DROP"));
        assert!(ensure_read_only("SELECT 1").is_ok());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = ensure_single_statement("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("multiple statements"));
    }

    #[test]
    fn test_single_statement_accepted() {
        assert!(ensure_single_statement("SELECT 1").is_ok());
        // A trailing semicolon is not a second statement.
        assert!(ensure_single_statement("SELECT 1;").is_ok());
    }

    #[test]
    fn test_unparseable_statement_passes_through() {
        assert!(ensure_single_statement("SHOW ENGINE INNODB STATUS").is_ok());
    }
}
