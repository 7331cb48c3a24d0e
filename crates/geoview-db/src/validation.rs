// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use csv::{ReaderBuilder, StringRecord, Trim};
use geoview_app::Point;

pub const COORDINATE_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    EmptyFile,
    MissingCoordinateHeader,
    NoFeatures,
    MissingCoordinates { line: usize },
    InvalidLongitude { line: usize },
    InvalidLatitude { line: usize },
    InvalidDelimiter,
    Malformed { line: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFile => f.write_str("file is empty"),
            Self::MissingCoordinateHeader => {
                f.write_str("header must start with longitude and latitude columns")
            }
            Self::NoFeatures => f.write_str("file has a header but no features"),
            Self::MissingCoordinates { line } => write!(f, "line {line}: missing coordinates"),
            Self::InvalidLongitude { line } => write!(f, "line {line}: invalid longitude"),
            Self::InvalidLatitude { line } => write!(f, "line {line}: invalid latitude"),
            Self::InvalidDelimiter => {
                f.write_str("delimiter must be a single ASCII character other than a quote")
            }
            Self::Malformed { line } => write!(f, "line {line}: malformed record"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// One parsed feature row. `values` is aligned with the attribute headers.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFeature {
    pub location: Point,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub features: Vec<CsvFeature>,
}

impl ParsedCsv {
    pub fn points(&self) -> Vec<Point> {
        self.features.iter().map(|feature| feature.location).collect()
    }
}

pub fn parse_delimiter(input: &str) -> ValidationResult<char> {
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some(delimiter), None) => delimiter_byte(delimiter).map(|_| delimiter),
        _ => Err(ValidationError::InvalidDelimiter),
    }
}

/// The csv reader splits on a single ASCII byte.
fn delimiter_byte(delimiter: char) -> ValidationResult<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(|&byte| byte.is_ascii() && !matches!(byte, b'\n' | b'\r' | b'"'))
        .ok_or(ValidationError::InvalidDelimiter)
}

/// Parses `lng<d>lat<d>attr...` text. The first record is the header; its
/// first two cells name the coordinate columns and are not attributes.
/// Quoted fields may contain the delimiter. Blank lines are skipped. Short
/// rows are padded with empty values and surplus cells are dropped so every
/// row matches the header.
pub fn parse_csv(contents: &str, delimiter: char) -> ValidationResult<ParsedCsv> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(contents.as_bytes());
    let mut records = reader
        .records()
        .filter(|record| !matches!(record, Ok(record) if record.iter().all(str::is_empty)));

    let header = records
        .next()
        .ok_or(ValidationError::EmptyFile)?
        .map_err(malformed)?;
    if header.len() < COORDINATE_COLUMNS {
        return Err(ValidationError::MissingCoordinateHeader);
    }
    let headers = header
        .iter()
        .skip(COORDINATE_COLUMNS)
        .map(str::to_owned)
        .collect::<Vec<_>>();

    let mut features = Vec::new();
    for record in records {
        let record = record.map_err(malformed)?;
        let line = record_line(&record);
        let (Some(lng), Some(lat)) = (record.get(0), record.get(1)) else {
            return Err(ValidationError::MissingCoordinates { line });
        };
        let lng = parse_coordinate(lng, 180.0).ok_or(ValidationError::InvalidLongitude { line })?;
        let lat = parse_coordinate(lat, 90.0).ok_or(ValidationError::InvalidLatitude { line })?;

        let mut values = record
            .iter()
            .skip(COORDINATE_COLUMNS)
            .take(headers.len())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        values.resize(headers.len(), String::new());
        features.push(CsvFeature {
            location: Point::new(lng, lat),
            values,
        });
    }

    if features.is_empty() {
        return Err(ValidationError::NoFeatures);
    }
    Ok(ParsedCsv { headers, features })
}

fn record_line(record: &StringRecord) -> usize {
    record
        .position()
        .map_or(0, |position| position.line() as usize)
}

fn malformed(error: csv::Error) -> ValidationError {
    let line = error
        .position()
        .map_or(0, |position| position.line() as usize);
    ValidationError::Malformed { line }
}

fn parse_coordinate(input: &str, limit: f64) -> Option<f64> {
    let value = input.trim().parse::<f64>().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

/// Numeric sort key for an attribute value; `None` sorts as text.
pub fn numeric_sort_key(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::{ValidationError, numeric_sort_key, parse_csv, parse_delimiter};
    use geoview_app::Point;

    #[test]
    fn header_skips_coordinate_columns() {
        let parsed = parse_csv("lng;lat;name;pop\n1.5;2.5;Springfield;300\n", ';')
            .expect("valid csv");
        assert_eq!(parsed.headers, vec!["name", "pop"]);
        assert_eq!(parsed.features[0].location, Point::new(1.5, 2.5));
        assert_eq!(parsed.features[0].values, vec!["Springfield", "300"]);
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters() {
        let parsed = parse_csv("lng;lat;name;pop\n1;2;\"Smith; Jones\";300\n", ';')
            .expect("valid csv");
        assert_eq!(parsed.features[0].values, vec!["Smith; Jones", "300"]);
    }

    #[test]
    fn quoted_header_cells_are_unquoted() {
        let parsed = parse_csv("lng,lat,\"town, name\"\n1,2,\"Sion\"\n", ',').expect("valid csv");
        assert_eq!(parsed.headers, vec!["town, name"]);
        assert_eq!(parsed.features[0].values, vec!["Sion"]);
    }

    #[test]
    fn ragged_rows_are_aligned_to_header() {
        let parsed = parse_csv("x;y;a;b\n0;0;only\n1;1;p;q;extra\n", ';').expect("valid csv");
        assert_eq!(parsed.features[0].values, vec!["only", ""]);
        assert_eq!(parsed.features[1].values, vec!["p", "q"]);
    }

    #[test]
    fn blank_lines_and_crlf_are_tolerated() {
        let parsed = parse_csv("x;y;a\r\n\r\n3;4;v\r\n\n", ';').expect("valid csv");
        assert_eq!(parsed.features.len(), 1);
        assert_eq!(parsed.features[0].values, vec!["v"]);
    }

    #[test]
    fn reports_line_numbers() {
        assert_eq!(
            parse_csv("x;y\n1;2\nabc;2\n", ';'),
            Err(ValidationError::InvalidLongitude { line: 3 })
        );
        assert_eq!(
            parse_csv("x;y\n1;95\n", ';'),
            Err(ValidationError::InvalidLatitude { line: 2 })
        );
        assert_eq!(
            parse_csv("x;y\n1\n", ';'),
            Err(ValidationError::MissingCoordinates { line: 2 })
        );
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(parse_csv("", ';'), Err(ValidationError::EmptyFile));
        assert_eq!(
            parse_csv("lng\n", ';'),
            Err(ValidationError::MissingCoordinateHeader)
        );
        assert_eq!(parse_csv("lng;lat\n", ';'), Err(ValidationError::NoFeatures));
    }

    #[test]
    fn delimiter_must_be_one_char() {
        assert_eq!(parse_delimiter(";"), Ok(';'));
        assert_eq!(parse_delimiter(","), Ok(','));
        assert_eq!(parse_delimiter(""), Err(ValidationError::InvalidDelimiter));
        assert_eq!(parse_delimiter(";;"), Err(ValidationError::InvalidDelimiter));
        assert_eq!(parse_delimiter("\""), Err(ValidationError::InvalidDelimiter));
        assert_eq!(parse_delimiter("§"), Err(ValidationError::InvalidDelimiter));
        assert_eq!(parse_csv("x§y\n1§2\n", '§'), Err(ValidationError::InvalidDelimiter));
    }

    #[test]
    fn numeric_keys() {
        assert_eq!(numeric_sort_key(" 42 "), Some(42.0));
        assert_eq!(numeric_sort_key("-1.5"), Some(-1.5));
        assert_eq!(numeric_sort_key("Springfield"), None);
        assert_eq!(numeric_sort_key(""), None);
        assert_eq!(numeric_sort_key("NaN"), None);
    }
}
