use std::fmt;
use std::io::Error;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;

pub const MODEL_COLUMN: &str = "model";
pub const YEAR_COLUMN: &str = "year";
pub const PRICE_COLUMN: &str = "price";

/// Columns the dashboard can filter by, in the order the selectors are shown.
pub const FILTER_COLUMNS: [&str; 2] = [MODEL_COLUMN, YEAR_COLUMN];

/// Sentinel selection that disables filtering on a column.
pub const ALL: &str = "all";

pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 15;

pub const HELP_TEXT: &str = "\
Filters
  m / M      next / previous model
  y / Y      next / previous year

Pages
  ← / h      previous page
  → / l      next page
  + / -      grow / shrink page size

View
  c          toggle charts
  f          toggle fixed table height
  x          copy current page as CSV
  r          reload data (drop cache)
  ?          this help
  Esc        close popup
  q          quit";

#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    PolarsError(PolarsError),
    HttpError(reqwest::Error),
    SourceUnavailable(String),
    SchemaMismatch { column: String },
    LoadingFailed(String),
    Logging(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "io error: {e}"),
            DashError::PolarsError(e) => write!(f, "could not read data: {e}"),
            DashError::HttpError(e) => write!(f, "data source unavailable: {e}"),
            DashError::SourceUnavailable(reason) => write!(f, "data source unavailable: {reason}"),
            DashError::SchemaMismatch { column } => {
                write!(f, "column \"{column}\" is missing from the worksheet")
            }
            DashError::LoadingFailed(reason) => write!(f, "loading failed: {reason}"),
            DashError::Logging(reason) => write!(f, "could not set up logging: {reason}"),
            DashError::FileNotFound => write!(f, "file not found"),
            DashError::PermissionDenied => write!(f, "permission denied"),
            DashError::UnknownFileType => write!(f, "unknown file type"),
        }
    }
}

impl std::error::Error for DashError {}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<PolarsError> for DashError {
    fn from(err: PolarsError) -> Self {
        DashError::PolarsError(err)
    }
}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        DashError::HttpError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Quit,
    NextModel,
    PreviousModel,
    NextYear,
    PreviousYear,
    NextPage,
    PreviousPage,
    GrowPageSize,
    ShrinkPageSize,
    ToggleCharts,
    ToggleFixedLayout,
    CopyPage,
    Reload,
    Help,
    Exit,
}

/// Runtime settings, built from the command line in `main`.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DashConfig {
    pub page_size: usize,
    pub cache_ttl: Duration,
    pub header_height: usize,
    pub row_height: usize,
    pub max_height: usize,
    pub fixed_layout: bool,
    pub show_charts: bool,
    pub histogram_bins: usize,
    pub event_poll_time: u64,
    pub max_column_width: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            cache_ttl: Duration::from_secs(600),
            header_height: 3,
            row_height: 1,
            max_height: 20,
            fixed_layout: false,
            show_charts: false,
            histogram_bins: 10,
            event_poll_time: 100,
            max_column_width: 30,
        }
    }
}

impl DashConfig {
    pub fn clamp_page_size(size: usize) -> usize {
        size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_kept_in_bounds() {
        assert_eq!(DashConfig::clamp_page_size(0), 1);
        assert_eq!(DashConfig::clamp_page_size(7), 7);
        assert_eq!(DashConfig::clamp_page_size(99), 15);
    }

    #[test]
    fn setters_override_defaults() {
        let cfg = DashConfig::default()
            .with_page_size(5)
            .with_fixed_layout(true);
        assert_eq!(cfg.page_size, 5);
        assert!(cfg.fixed_layout);
        assert_eq!(cfg.histogram_bins, 10);
    }

    #[test]
    fn schema_mismatch_names_the_column() {
        let err = DashError::SchemaMismatch {
            column: "year".to_string(),
        };
        assert!(err.to_string().contains("\"year\""));
    }
}
