//! Annotation-directed parsing of SQL migration files.
//!
//! A migration file carries both directions, separated by line-anchored
//! directive comments:
//!
//! ```sql
//! -- +gander Up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
//!
//! -- +gander Down
//! DROP TABLE users;
//! ```
//!
//! Statements are split on terminating semicolons. A body that contains
//! semicolons of its own (a stored procedure, a PL/pgSQL `DO` block) must be
//! bracketed with `-- +gander StatementBegin` / `-- +gander StatementEnd`,
//! which disables splitting for the enclosed text. `-- +gander NO TRANSACTION`
//! anywhere in the file opts the whole file out of transactional execution.

use crate::error::Error;
use crate::migration::Direction;

const DIRECTIVE_PREFIX: &str = "-- +gander";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Up,
    Down,
}

/// Parse one side of a SQL migration file.
///
/// Returns the ordered statements for `direction` and whether the file should
/// be executed inside a transaction. Statements outside any Up/Down section
/// are discarded. An empty file parses to `([], true)`.
pub fn parse_sql_migration(contents: &str, direction: Direction) -> Result<(Vec<String>, bool), Error> {
    let wanted = match direction {
        Direction::Up => Section::Up,
        Direction::Down => Section::Down,
    };

    let mut statements: Vec<String> = Vec::new();
    let mut use_tx = true;
    let mut section = Section::None;
    let mut in_block = false;
    let mut buf = String::new();

    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(DIRECTIVE_PREFIX) {
            match rest.trim().to_ascii_lowercase().as_str() {
                "up" => {
                    if in_block {
                        return Err(annotation_error(lineno, "directive inside a StatementBegin block"));
                    }
                    section = Section::Up;
                }
                "down" => {
                    if in_block {
                        return Err(annotation_error(lineno, "directive inside a StatementBegin block"));
                    }
                    section = Section::Down;
                }
                "statementbegin" => {
                    if in_block {
                        return Err(annotation_error(lineno, "StatementBegin blocks cannot be nested"));
                    }
                    in_block = true;
                }
                "statementend" => {
                    if !in_block {
                        return Err(annotation_error(
                            lineno,
                            "StatementEnd without a matching StatementBegin",
                        ));
                    }
                    in_block = false;
                    if section == wanted {
                        let stmt = buf.trim();
                        if !stmt.is_empty() {
                            statements.push(stmt.to_string());
                        }
                    }
                    buf.clear();
                }
                "no transaction" => use_tx = false,
                other => {
                    return Err(annotation_error(lineno, &format!("unknown annotation {other:?}")));
                }
            }
            continue;
        }

        if section != wanted {
            continue;
        }

        if !in_block {
            // Blank lines between statements and leading comments carry no
            // statement text.
            if buf.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
                continue;
            }
        }

        buf.push_str(line);
        buf.push('\n');

        if !in_block && ends_with_semicolon(line) {
            statements.push(buf.trim().to_string());
            buf.clear();
        }
    }

    if in_block {
        return Err(Error::Generic(
            "unexpected end of file: missing '-- +gander StatementEnd'".to_string(),
        ));
    }
    if !buf.trim().is_empty() {
        return Err(Error::Generic(format!(
            "unfinished SQL query: {:?}: missing semicolon?",
            buf.trim()
        )));
    }

    Ok((statements, use_tx))
}

fn annotation_error(lineno: usize, message: &str) -> Error {
    Error::Generic(format!("line {}: {}", lineno + 1, message))
}

/// Whether the significant text of a line ends with a statement-terminating
/// semicolon, ignoring trailing `--` comments and semicolons inside
/// single-quoted literals.
fn ends_with_semicolon(line: &str) -> bool {
    strip_line_comment(line).trim_end().ends_with(';')
}

/// Cut a trailing `--` comment off a line, honoring single-quoted literals.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'-' if !in_quote && i + 1 < bytes.len() && bytes[i + 1] == b'-' => {
                return &line[..i];
            }
            _ => {}
        }
        i += 1;
    }
    line
}

/// Statement text with comment-only and blank lines removed, for error
/// messages and statement-level logging.
pub(crate) fn clean_statement(stmt: &str) -> String {
    stmt.lines()
        .filter(|line| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with("--")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_up_and_down_sections() {
        let input = "\
-- +gander Up
CREATE TABLE a (id INTEGER);
CREATE TABLE b (id INTEGER);

-- +gander Down
DROP TABLE b;
DROP TABLE a;
";
        let (up, use_tx) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up, vec!["CREATE TABLE a (id INTEGER);", "CREATE TABLE b (id INTEGER);"]);
        assert!(use_tx);

        let (down, _) = parse_sql_migration(input, Direction::Down).unwrap();
        assert_eq!(down, vec!["DROP TABLE b;", "DROP TABLE a;"]);
    }

    #[test]
    fn statement_blocks_disable_splitting() {
        let input = "\
-- +gander Up
CREATE TABLE a;
-- +gander StatementBegin
DO $$
BEGIN
  INSERT INTO a DEFAULT VALUES;
  INSERT INTO a DEFAULT VALUES;
END
$$;
-- +gander StatementEnd
-- +gander Down
DROP TABLE a;
";
        let (up, use_tx) = parse_sql_migration(input, Direction::Up).unwrap();
        assert!(use_tx);
        assert_eq!(up.len(), 2);
        assert_eq!(up[0], "CREATE TABLE a;");
        assert!(up[1].starts_with("DO $$"));
        assert!(up[1].ends_with("$$;"));
        assert!(up[1].contains("INSERT INTO a DEFAULT VALUES;"));

        let (down, _) = parse_sql_migration(input, Direction::Down).unwrap();
        assert_eq!(down, vec!["DROP TABLE a;"]);
    }

    #[test]
    fn multi_line_statements_accumulate_until_semicolon() {
        let input = "\
-- +gander Up
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT
);
";
        let (up, _) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up.len(), 1);
        assert!(up[0].starts_with("CREATE TABLE users ("));
        assert!(up[0].ends_with(");"));
    }

    #[test]
    fn no_transaction_directive_clears_use_tx() {
        let input = "\
-- +gander NO TRANSACTION
-- +gander Up
CREATE INDEX CONCURRENTLY idx ON t (c);
";
        let (up, use_tx) = parse_sql_migration(input, Direction::Up).unwrap();
        assert!(!use_tx);
        assert_eq!(up.len(), 1);
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let input = "-- +gander UP\nSELECT 1;\n-- +gander DOWN\nSELECT 2;\n";
        let (up, _) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up, vec!["SELECT 1;"]);
    }

    #[test]
    fn statements_outside_sections_are_discarded() {
        let input = "SELECT 'preamble';\n-- +gander Up\nSELECT 1;\n";
        let (up, _) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up, vec!["SELECT 1;"]);
    }

    #[test]
    fn empty_file_parses_to_no_statements_in_a_transaction() {
        let (up, use_tx) = parse_sql_migration("", Direction::Up).unwrap();
        assert!(up.is_empty());
        assert!(use_tx);
    }

    #[test]
    fn unknown_annotation_is_an_error() {
        let err = parse_sql_migration("-- +gander Sideways\n", Direction::Up).unwrap_err();
        assert!(err.to_string().contains("unknown annotation"));
    }

    #[test]
    fn statement_end_without_begin_is_an_error() {
        let input = "-- +gander Up\n-- +gander StatementEnd\n";
        let err = parse_sql_migration(input, Direction::Up).unwrap_err();
        assert!(err.to_string().contains("StatementEnd without a matching StatementBegin"));
    }

    #[test]
    fn nested_statement_begin_is_an_error() {
        let input = "-- +gander Up\n-- +gander StatementBegin\n-- +gander StatementBegin\n";
        let err = parse_sql_migration(input, Direction::Up).unwrap_err();
        assert!(err.to_string().contains("cannot be nested"));
    }

    #[test]
    fn unterminated_statement_begin_is_an_error() {
        let input = "-- +gander Up\n-- +gander StatementBegin\nSELECT 1;\n";
        let err = parse_sql_migration(input, Direction::Up).unwrap_err();
        assert!(err.to_string().contains("missing '-- +gander StatementEnd'"));
    }

    #[test]
    fn trailing_unterminated_statement_is_an_error() {
        let input = "-- +gander Up\nSELECT 1\n";
        let err = parse_sql_migration(input, Direction::Up).unwrap_err();
        assert!(err.to_string().contains("missing semicolon"));
    }

    #[test]
    fn semicolons_in_comments_and_literals_do_not_split() {
        let input = "-- +gander Up\nINSERT INTO t VALUES ('a;b') -- trailing; note\n;\n";
        let (up, _) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up.len(), 1);
        assert!(up[0].contains("'a;b'"));
    }

    #[test]
    fn comment_only_lines_between_statements_are_skipped() {
        let input = "-- +gander Up\n-- creates the table\nCREATE TABLE a (id INTEGER);\n";
        let (up, _) = parse_sql_migration(input, Direction::Up).unwrap();
        assert_eq!(up, vec!["CREATE TABLE a (id INTEGER);"]);
    }

    #[test]
    fn clean_statement_drops_comment_lines() {
        let cleaned = clean_statement("-- note\nSELECT 1;\n\n");
        assert_eq!(cleaned, "SELECT 1;");
    }
}
