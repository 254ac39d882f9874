use crate::config::IngestLimits;
use crate::error::{OptimizerError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Daily closing prices for a fixed set of instruments.
///
/// Rectangular by construction: every day holds one finite, strictly
/// positive price per instrument. Built once by ingestion and read-only afterwards.
#[derive(Clone, Debug)]
pub struct PriceTable {
    instruments: Vec<String>,
    labels: Vec<String>,
    prices: Vec<Vec<f64>>, // [day][instrument]
}

impl PriceTable {
    /// Builds a table from per-day rows. `labels` holds the first input
    /// column (usually a date) and is never used in computation.
    pub fn new(instruments: Vec<String>, labels: Vec<String>, prices: Vec<Vec<f64>>) -> Result<Self> {
        if instruments.is_empty() {
            return Err(OptimizerError::format(1, "no instruments in header"));
        }
        if labels.len() != prices.len() {
            return Err(OptimizerError::invalid_config(format!(
                "{} day labels for {} price rows",
                labels.len(),
                prices.len()
            )));
        }
        for (day, row) in prices.iter().enumerate() {
            let line = day as u64 + 2;
            if row.len() != instruments.len() {
                return Err(OptimizerError::format(
                    line,
                    format!("expected {} prices, found {}", instruments.len(), row.len()),
                ));
            }
            if let Some(i) = row.iter().position(|p| !p.is_finite()) {
                return Err(OptimizerError::format(
                    line,
                    format!("non-finite price for {}", instruments[i]),
                ));
            }
            if let Some(instrument) = row.iter().position(|&p| p <= 0.0) {
                return Err(OptimizerError::NonPositivePrice { day, instrument });
            }
        }
        Ok(Self {
            instruments,
            labels,
            prices,
        })
    }

    #[cfg(test)]
    pub fn unlabeled(instruments: &[&str], prices: Vec<Vec<f64>>) -> Result<Self> {
        let labels = (0..prices.len()).map(|d| format!("day{}", d)).collect();
        Self::new(
            instruments.iter().map(|s| s.to_string()).collect(),
            labels,
            prices,
        )
    }

    pub fn num_days(&self) -> usize {
        self.prices.len()
    }

    pub fn num_instruments(&self) -> usize {
        self.instruments.len()
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.prices
    }

    /// First and last day as calendar dates, when the label column holds
    /// ISO dates.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let parse = |s: &String| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
        Some((parse(self.labels.first()?)?, parse(self.labels.last()?)?))
    }
}

/// Loads a price table from a CSV file on disk.
pub fn load_price_table(path: &Path, limits: &IngestLimits) -> Result<PriceTable> {
    let file = File::open(path).map_err(|e| OptimizerError::input(path, e))?;
    let table = read_price_table(file, limits)?;

    info!("Number of instruments detected: {}", table.num_instruments());
    match table.date_span() {
        Some((first, last)) => info!(
            "Read {} days of price data ({} to {})",
            table.num_days(),
            first,
            last
        ),
        None => info!("Read {} days of price data", table.num_days()),
    }
    Ok(table)
}

/// Parses `label,name_1,...,name_S` followed by one row per day.
pub fn read_price_table<R: Read>(reader: R, limits: &IngestLimits) -> Result<PriceTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(csv_error)?,
        None => return Err(OptimizerError::format(1, "empty input, expected a header row")),
    };
    let instruments = parse_header(&header, limits)?;
    debug!("Header instruments: {:?}", instruments);

    let mut labels = Vec::new();
    let mut prices = Vec::new();
    for record in records {
        let record = record.map_err(csv_error)?;
        let line = record_line(&record);

        if prices.len() == limits.max_days {
            return Err(OptimizerError::format(
                line,
                format!("more than {} days of data", limits.max_days),
            ));
        }
        if record.len() != instruments.len() + 1 {
            return Err(OptimizerError::format(
                line,
                format!("expected {} fields, found {}", instruments.len() + 1, record.len()),
            ));
        }

        let row = record
            .iter()
            .skip(1)
            .zip(instruments.iter())
            .map(|(field, name)| parse_price(field, name, line))
            .collect::<Result<Vec<f64>>>()?;

        labels.push(record.get(0).unwrap_or_default().to_string());
        prices.push(row);
    }

    PriceTable::new(instruments, labels, prices)
}

fn parse_header(header: &StringRecord, limits: &IngestLimits) -> Result<Vec<String>> {
    let line = record_line(header);
    let instruments: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    if instruments.is_empty() {
        return Err(OptimizerError::format(line, "header names no instruments"));
    }
    if instruments.len() > limits.max_instruments {
        return Err(OptimizerError::format(
            line,
            format!(
                "too many instruments in header ({}); maximum supported is {}",
                instruments.len(),
                limits.max_instruments
            ),
        ));
    }
    if let Some(col) = instruments.iter().position(|name| name.is_empty()) {
        return Err(OptimizerError::format(
            line,
            format!("empty instrument name in column {}", col + 2),
        ));
    }
    Ok(instruments)
}

fn parse_price(field: &str, instrument: &str, line: u64) -> Result<f64> {
    if field.is_empty() {
        return Err(OptimizerError::format(line, format!("missing price for {}", instrument)));
    }
    match field.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        Ok(price) if price.is_finite() => Err(OptimizerError::format(
            line,
            format!("non-positive price {} for {}", price, instrument),
        )),
        _ => Err(OptimizerError::format(
            line,
            format!("non-numeric price {:?} for {}", field, instrument),
        )),
    }
}

fn record_line(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn csv_error(err: csv::Error) -> OptimizerError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    OptimizerError::format(line, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(input: &str) -> Result<PriceTable> {
        read_price_table(input.as_bytes(), &IngestLimits::default())
    }

    #[test]
    fn test_reads_header_and_rows() {
        let table = read(
            "date,AAPL,MSFT\n2020-01-02,100.0,200.0\n2020-01-03,101.5,199.0\n2020-01-06, 102.0 ,201.25\n",
        )
        .unwrap();

        assert_eq!(table.instruments(), &["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(table.num_days(), 3);
        assert_eq!(table.rows()[2], vec![102.0, 201.25]);
        let (first, last) = table.date_span().expect("ISO dates should parse");
        assert_eq!(first, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2020, 1, 6).unwrap());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let table = read("date,A\n\nd1,1.0\n\nd2,2.0\n").unwrap();
        assert_eq!(table.num_days(), 2);
    }

    #[test]
    fn test_non_numeric_field_names_line() {
        let err = read("date,A,B\nd1,1.0,2.0\nd2,1.1,abc\n").unwrap_err();
        match err {
            OptimizerError::Format { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("abc"), "message should quote the field: {}", message);
            }
            other => panic!("expected Format error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_format_error() {
        let err = read("date,A,B\nd1,1.0\n").unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 2, .. }));

        let err = read("date,A,B\nd1,1.0,\n").unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 2, .. }));
    }

    #[test]
    fn test_instrument_cap_exceeded() {
        let limits = IngestLimits {
            max_instruments: 2,
            max_days: 10,
        };
        let err = read_price_table("date,A,B,C\nd1,1,2,3\n".as_bytes(), &limits).unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 1, .. }));
    }

    #[test]
    fn test_day_cap_exceeded_is_not_truncated() {
        let limits = IngestLimits {
            max_instruments: 2,
            max_days: 2,
        };
        let err = read_price_table("date,A\nd1,1\nd2,2\nd3,3\n".as_bytes(), &limits).unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 4, .. }));
    }

    #[test]
    fn test_empty_input_and_bare_header() {
        assert!(matches!(read(""), Err(OptimizerError::Format { line: 1, .. })));
        assert!(matches!(read("date\n"), Err(OptimizerError::Format { .. })));
    }

    #[test]
    fn test_header_only_yields_empty_table() {
        let table = read("date,A,B\n").unwrap();
        assert_eq!(table.num_days(), 0);
        assert_eq!(table.num_instruments(), 2);
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = load_price_table(
            Path::new("/definitely/not/here/prices.csv"),
            &IngestLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::Input { .. }));
    }

    #[test]
    fn test_non_positive_last_price_is_rejected() {
        let err = read("date,A,B\nd1,10,20\nd2,11,21\nd3,-5,22\n").unwrap_err();
        match err {
            OptimizerError::Format { line, message } => {
                assert_eq!(line, 4);
                assert!(message.contains("non-positive"), "unexpected message: {}", message);
            }
            other => panic!("expected Format error, got {:?}", other),
        }

        let err = read("date,A,B\nd1,10,20\nd2,0,21\n").unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 3, .. }));
    }

    #[test]
    fn test_new_rejects_non_positive_price() {
        let err = PriceTable::unlabeled(&["A", "B"], vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, OptimizerError::NonPositivePrice { day: 2, instrument: 1 }));
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = PriceTable::unlabeled(&["A", "B"], vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, OptimizerError::Format { line: 3, .. }));
    }
}
