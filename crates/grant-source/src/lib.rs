//! Reader for the sponsored-programs grant export.

use std::fs;
use std::path::{Path, PathBuf};

use grant_core::SourceRow;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "grant-source";

/// The export is pipe-delimited; investigator lists use commas inside a field.
pub const DEFAULT_DELIMITER: u8 = b'|';

pub const REQUIRED_COLUMNS: [&str; 12] = [
    "AwardID",
    "Title",
    "SponsorAwardID",
    "TotalAwarded",
    "DirectCosts",
    "DeptID",
    "SponsorID",
    "StartDate",
    "EndDate",
    "PI",
    "CoPI",
    "Inv",
];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} is missing columns: {}", path.display(), missing.join(", "))]
    MissingColumns {
        path: PathBuf,
        missing: Vec<&'static str>,
    },
}

/// Reads every row of a source file, in file order.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; the export
/// has historically carried stray Latin-1 characters in titles.
pub fn read_source_file(
    path: impl AsRef<Path>,
    delimiter: u8,
) -> Result<Vec<SourceRow>, SourceError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    parse_source(&text, delimiter).map_err(|err| match err {
        ParseFailure::Csv(source) => SourceError::Csv {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::MissingColumns(missing) => SourceError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        },
    })
}

#[derive(Debug)]
pub enum ParseFailure {
    Csv(csv::Error),
    MissingColumns(Vec<&'static str>),
}

impl From<csv::Error> for ParseFailure {
    fn from(err: csv::Error) -> Self {
        ParseFailure::Csv(err)
    }
}

pub fn parse_source(text: &str, delimiter: u8) -> Result<Vec<SourceRow>, ParseFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let missing: Vec<&'static str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(ParseFailure::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    for record in reader.deserialize::<SourceRow>() {
        rows.push(record?);
    }
    debug!(rows = rows.len(), "parsed source rows");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grant_core::RoleKind;
    use std::io::Write;

    const HEADER: &str =
        "AwardID|Title|SponsorAwardID|TotalAwarded|DirectCosts|DeptID|SponsorID|StartDate|EndDate|PI|CoPI|Inv";

    #[test]
    fn parses_pipe_delimited_rows_with_comma_lists() {
        let text = format!(
            "{HEADER}\nP001|Soil Carbon Study|NSF-1|1000|800|27010000|S100|07/01/2014|06/30/2016|11111111|22222222,33333333|\n"
        );
        let rows = parse_source(&text, DEFAULT_DELIMITER).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pcn(), "P001");
        assert_eq!(row.title, "Soil Carbon Study");
        assert_eq!(row.start_date, "07/01/2014");
        assert_eq!(
            row.investigator_ids(RoleKind::CoPrincipalInvestigator),
            vec!["22222222", "33333333"]
        );
        assert!(row.investigator_ids(RoleKind::KeyPersonnel).is_empty());
    }

    #[test]
    fn missing_columns_are_reported_by_name() {
        let text = "AwardID|Title\nP001|x\n";
        match parse_source(text, DEFAULT_DELIMITER) {
            Err(ParseFailure::MissingColumns(missing)) => {
                assert!(missing.contains(&"TotalAwarded"));
                assert!(missing.contains(&"Inv"));
                assert!(!missing.contains(&"AwardID"));
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(b"\nP009|Caf\xe9 Study||||||||||\n").unwrap();
        let rows = read_source_file(file.path(), DEFAULT_DELIMITER).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].title.starts_with("Caf"));
        assert!(rows[0].title.ends_with(" Study"));
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let err = read_source_file("/definitely/not/here.txt", DEFAULT_DELIMITER).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
