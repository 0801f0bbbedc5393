use polars::prelude::*;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::DashError;
use crate::table::Table;

pub const DEFAULT_SHEETS_URL: &str = "https://docs.google.com";
pub const DEFAULT_WORKSHEET: &str = "carros";
pub const SHEETS_TOKEN_ENV: &str = "CARVIEW_SHEETS_TOKEN";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocking "fetch all rows" provider.
pub trait TableSource {
    fn load_table(&self) -> Result<Table, DashError>;

    /// Short human readable origin, shown in the title bar.
    fn describe(&self) -> String;
}

impl<T: TableSource + ?Sized> TableSource for Box<T> {
    fn load_table(&self) -> Result<Table, DashError> {
        (**self).load_table()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
}

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Accepts `~` and environment variables in the path.
    pub fn new(path: &str) -> Result<Self, DashError> {
        let expanded = shellexpand::full(path)
            .map_err(|e| DashError::LoadingFailed(format!("cannot expand {path}: {e}")))?;
        Ok(Self {
            path: PathBuf::from(expanded.into_owned()),
        })
    }

    fn detect_file_type(path: &Path) -> Result<FileType, DashError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
            Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
            _ => Err(DashError::UnknownFileType),
        }
    }

    fn check_file(path: &Path) -> Result<u64, DashError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DashError::FileNotFound,
            ErrorKind::PermissionDenied => DashError::PermissionDenied,
            _ => DashError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(DashError::LoadingFailed("Not a file!".into()));
        }
        Ok(metadata.len())
    }

    fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .finish()
    }

    fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
    }

    fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_ipc(
            PlPath::Local(path.into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )
    }
}

impl TableSource for FileSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load_table(&self) -> Result<Table, DashError> {
        let file_size = Self::check_file(&self.path)?;
        let file_type = Self::detect_file_type(&self.path)?;
        debug!("Reading {file_type:?} file with {file_size} bytes");

        let frame = match file_type {
            FileType::CSV => Self::load_csv(&self.path)?,
            FileType::PARQUET => Self::load_parquet(&self.path)?,
            FileType::ARROW => Self::load_arrow(&self.path)?,
        };
        let df = frame.collect()?;
        Ok(Table::from_frame(self.describe(), &df)?)
    }

    fn describe(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string()
    }
}

/// A worksheet of a published spreadsheet, read through its CSV export.
pub struct SheetSource {
    export_url: reqwest::Url,
    sheet_id: String,
    worksheet: String,
    token: Option<String>,
    http: reqwest::blocking::Client,
}

impl SheetSource {
    pub fn new(
        base_url: &str,
        sheet_id: &str,
        worksheet: &str,
        token: Option<String>,
    ) -> Result<Self, DashError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        let export_url = reqwest::Url::parse_with_params(
            &format!(
                "{}/spreadsheets/d/{sheet_id}/gviz/tq",
                base_url.trim_end_matches('/')
            ),
            &[("tqx", "out:csv"), ("sheet", worksheet)],
        )
        .map_err(|e| DashError::LoadingFailed(format!("bad spreadsheet url {base_url}: {e}")))?;
        Ok(Self {
            export_url,
            sheet_id: sheet_id.to_string(),
            worksheet: worksheet.to_string(),
            token: token.filter(|t| !t.is_empty()),
            http,
        })
    }

    /// CSV export endpoint with the worksheet name form encoded.
    pub fn export_url(&self) -> &reqwest::Url {
        &self.export_url
    }

    fn fetch(&self) -> Result<Vec<u8>, DashError> {
        debug!("GET {}", self.export_url);
        let mut request = self.http.get(self.export_url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|e| DashError::SourceUnavailable(format!("cannot reach spreadsheet: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DashError::SourceUnavailable(format!(
                "spreadsheet answered {status} for worksheet \"{}\"",
                self.worksheet
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| DashError::SourceUnavailable(format!("incomplete response: {e}")))?;
        Ok(body.to_vec())
    }

    fn parse_csv(name: &str, body: Vec<u8>) -> Result<Table, DashError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            warn!("Worksheet {name} is empty");
            return Ok(Table::new(name, Vec::new(), Vec::new()));
        }
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(body))
            .finish()?;
        Ok(Table::from_frame(name, &df)?)
    }
}

impl TableSource for SheetSource {
    #[instrument(skip(self), fields(sheet = %self.sheet_id, worksheet = %self.worksheet))]
    fn load_table(&self) -> Result<Table, DashError> {
        let body = self.fetch()?;
        info!("Downloaded {} bytes", body.len());
        let table = Self::parse_csv(&self.worksheet, body)?;
        if table.is_empty() {
            warn!("Worksheet {} has no rows", self.worksheet);
        }
        Ok(table)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.sheet_id, self.worksheet)
    }
}
