//! Migration file naming: version parsing, new-version allocation, and the
//! name transforms used when creating files.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::Error;

pub(crate) const SQL_EXT: &str = "sql";
pub(crate) const CODE_EXT: &str = "rs";

/// Versions formatted from a wall clock use this layout (`YYYYMMDDhhmmss`).
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Sequential versions are left-padded to this width.
const SEQ_VERSION_WIDTH: usize = 5;

/// Extract the numeric version from a migration file named
/// `<version>_<name>.<ext>` where `<ext>` is `sql` or `rs`.
///
/// Fails when the extension is not recognized, there is no `_` separator,
/// the prefix is not numeric, or the prefix is not strictly positive.
pub fn numeric_component(name: impl AsRef<Path>) -> Result<i64, Error> {
    let path = name.as_ref();
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Generic(format!("invalid migration file name: {}", path.display())))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext == SQL_EXT || ext == CODE_EXT => {}
        _ => return Err(Error::Generic("not a recognized migration file type".to_string())),
    }

    let idx = base
        .find('_')
        .ok_or_else(|| Error::Generic("no filename separator '_' found".to_string()))?;

    let n: i64 = base[..idx]
        .parse()
        .map_err(|_| Error::Generic(format!("invalid version prefix {:?}", &base[..idx])))?;
    if n <= 0 {
        return Err(Error::Generic("migration versions must be greater than zero".to_string()));
    }
    Ok(n)
}

/// Whether a version reads as a wall-clock timestamp.
///
/// A version is timestamp-style when its decimal digits parse as
/// `YYYYMMDDhhmmss` strictly after the Unix epoch. The heuristic is
/// approximate; repositories mixing both styles may see surprising
/// sequential allocation.
pub(crate) fn is_timestamp_version(version: i64) -> bool {
    match NaiveDateTime::parse_from_str(&version.to_string(), TIMESTAMP_FORMAT) {
        Ok(t) => t.and_utc().timestamp() > 0,
        Err(_) => false,
    }
}

/// Format the next sequential version given the highest existing one.
pub(crate) fn format_sequential(version: i64) -> String {
    format!("{:0width$}", version, width = SEQ_VERSION_WIDTH)
}

/// Format the current wall clock as a timestamp version.
pub(crate) fn timestamp_version() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Lower `snake_case` form used for file names.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.trim().chars() {
        if c == ' ' || c == '-' || c == '_' {
            if !matches!(prev, Some('_') | None) {
                out.push('_');
                prev = Some('_');
            }
            continue;
        }
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out.trim_end_matches('_').to_string()
}

/// Upper `CamelCase` form used in code-template substitutions.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c == '_' || c == ' ' || c == '-' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequential_and_timestamp_prefixes() {
        assert_eq!(numeric_component("00001_create_users.sql").unwrap(), 1);
        assert_eq!(numeric_component("20220310121530_add_index.sql").unwrap(), 20220310121530);
        assert_eq!(numeric_component("00042_backfill.rs").unwrap(), 42);
    }

    #[test]
    fn parses_the_basename_of_a_path() {
        assert_eq!(numeric_component("migrations/00007_seed.sql").unwrap(), 7);
    }

    #[test]
    fn round_trips_large_versions() {
        let name = format!("{}_max.sql", i64::MAX);
        assert_eq!(numeric_component(name).unwrap(), i64::MAX);
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(numeric_component("00001_notes.txt").is_err());
        assert!(numeric_component("00001_notes").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        let err = numeric_component("00001.sql").unwrap_err();
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn rejects_non_numeric_prefix() {
        assert!(numeric_component("abc_create.sql").is_err());
    }

    #[test]
    fn rejects_zero_and_negative_versions() {
        assert!(numeric_component("0_zero.sql").is_err());
        assert!(numeric_component("-1_negative.sql").is_err());
        assert!(numeric_component("00000_zero.sql").is_err());
    }

    #[test]
    fn timestamp_heuristic() {
        assert!(is_timestamp_version(20220310121530));
        assert!(is_timestamp_version(19700101000001));
        assert!(!is_timestamp_version(1));
        assert!(!is_timestamp_version(99999));
        // Parses as a date but lands before the epoch.
        assert!(!is_timestamp_version(19691231235959));
    }

    #[test]
    fn sequential_formatting_pads_to_five() {
        assert_eq!(format_sequential(1), "00001");
        assert_eq!(format_sequential(123), "00123");
        assert_eq!(format_sequential(123456), "123456");
    }

    #[test]
    fn snake_case_variants() {
        assert_eq!(snake_case("AddUsers"), "add_users");
        assert_eq!(snake_case("add users"), "add_users");
        assert_eq!(snake_case("add-users"), "add_users");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("HTTPServer"), "httpserver");
        assert_eq!(snake_case("  padded name "), "padded_name");
    }

    #[test]
    fn camel_case_variants() {
        assert_eq!(camel_case("add_users"), "AddUsers");
        assert_eq!(camel_case("add users"), "AddUsers");
        assert_eq!(camel_case("AlreadyCamel"), "AlreadyCamel");
    }
}
