use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::domain::{DashConfig, DashError, MODEL_COLUMN, PRICE_COLUMN};
use crate::filter::{FilterState, apply_filter};
use crate::pagination::{PageState, paginate, total_pages};
use crate::table::{Row, Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// Table height follows the rows on the current page.
    Fit,
    /// Table height is sized for a full page on every page.
    Fixed,
}

impl LayoutMode {
    pub fn toggled(self) -> Self {
        match self {
            LayoutMode::Fit => LayoutMode::Fixed,
            LayoutMode::Fixed => LayoutMode::Fit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    pub page_size: usize,
    pub layout: LayoutMode,
    pub header_height: usize,
    pub row_height: usize,
    pub max_height: usize,
    pub show_charts: bool,
    pub histogram_bins: usize,
}

impl DisplayOptions {
    pub fn from_config(cfg: &DashConfig) -> Self {
        Self {
            page_size: DashConfig::clamp_page_size(cfg.page_size),
            layout: if cfg.fixed_layout {
                LayoutMode::Fixed
            } else {
                LayoutMode::Fit
            },
            header_height: cfg.header_height,
            row_height: cfg.row_height,
            max_height: cfg.max_height,
            show_charts: cfg.show_charts,
            histogram_bins: cfg.histogram_bins,
        }
    }
}

pub fn display_height(rows_on_page: usize, display: &DisplayOptions) -> usize {
    let rows_shown = match display.layout {
        LayoutMode::Fit => rows_on_page,
        LayoutMode::Fixed => display.page_size,
    };
    std::cmp::min(
        display.max_height,
        display.header_height + rows_shown * display.row_height,
    )
}

/// Parses a price cell. Text may carry a currency prefix and use either
/// `,` or `.` as decimal separator ("50.000,00", "50,000.00"). When both
/// appear, the last one is the decimal separator and the other must group
/// digits by three.
pub fn parse_price(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::Float(_) | Value::Empty => None,
        Value::Text(s) => parse_decimal(s),
    }
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let (sign, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", cleaned.as_str()),
    };

    let decimal = match (digits.rfind(','), digits.rfind('.')) {
        (Some(comma), Some(dot)) => Some(if comma > dot { ',' } else { '.' }),
        (Some(_), None) if is_grouped(digits, ',') && digits.matches(',').count() > 1 => None,
        (Some(_), None) => Some(','),
        // a lone dot grouping: "50.000" is fifty thousand
        (None, Some(_)) if is_grouped(digits, '.') => None,
        (None, Some(_)) => Some('.'),
        (None, None) => None,
    };
    let grouping = match decimal {
        Some(',') => '.',
        Some(_) => ',',
        None if digits.contains('.') => '.',
        None => ',',
    };

    let (int_part, frac_part) = match decimal {
        Some(sep) => digits.rsplit_once(sep)?,
        None => (digits, ""),
    };
    if decimal.is_some() && !is_digits(frac_part) {
        return None;
    }
    let int_digits = if int_part.contains(grouping) {
        if !is_grouped(int_part, grouping) {
            return None;
        }
        int_part.replace(grouping, "")
    } else if is_digits(int_part) {
        int_part.to_string()
    } else {
        return None;
    };

    let normalized = if frac_part.is_empty() {
        format!("{sign}{int_digits}")
    } else {
        format!("{sign}{int_digits}.{frac_part}")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

// "50.000" or "1,250,000": the separator only splits groups of three digits
fn is_grouped(s: &str, separator: char) -> bool {
    let mut parts = s.split(separator);
    let Some(head) = parts.next() else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    !tail.is_empty()
        && (1..=3).contains(&head.len())
        && is_digits(head)
        && tail.iter().all(|p| p.len() == 3 && is_digits(p))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model: String,
    pub count: usize,
    pub mean_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub by_model: Vec<ModelSummary>,
    pub histogram: Vec<HistogramBin>,
    /// Rows whose price parsed.
    pub sample_size: usize,
    /// Rows excluded because the price did not parse.
    pub dropped: usize,
}

pub fn aggregate(rows: &[&Row], model_idx: usize, price_idx: usize, bins: usize) -> Aggregates {
    let mut groups: BTreeMap<String, (usize, f64, usize)> = BTreeMap::new();
    let mut prices = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for row in rows {
        let entry = groups.entry(row.get(model_idx).normalized()).or_default();
        entry.0 += 1;
        match parse_price(row.get(price_idx)) {
            Some(price) => {
                entry.1 += price;
                entry.2 += 1;
                prices.push(price);
            }
            None => {
                trace!("Dropping unparsable price {:?}", row.get(price_idx));
                dropped += 1;
            }
        }
    }

    let by_model = groups
        .into_iter()
        .map(|(model, (count, sum, priced))| ModelSummary {
            model,
            count,
            mean_price: (priced > 0).then(|| sum / priced as f64),
        })
        .collect();

    if dropped > 0 {
        debug!("{dropped} of {} prices could not be parsed", rows.len());
    }

    Aggregates {
        by_model,
        histogram: histogram(&prices, bins),
        sample_size: prices.len(),
        dropped,
    }
}

/// Equal-width bins spanning the observed range. All values equal gives a
/// single bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(min, f64::max);
    let bins = bins.max(1);
    let width = (max - min) / bins as f64;

    if width == 0.0 {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|b| HistogramBin {
            lower: min + b as f64 * width,
            upper: if b + 1 == bins {
                max
            } else {
                min + (b + 1) as f64 * width
            },
            count: 0,
        })
        .collect();
    for v in values {
        let idx = std::cmp::min(((v - min) / width) as usize, bins - 1);
        out[idx].count += 1;
    }
    out
}

/// Everything the UI needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub page_size: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub height: usize,
    pub can_previous: bool,
    pub can_next: bool,
    pub aggregates: Option<Aggregates>,
}

impl ViewModel {
    pub fn is_empty(&self) -> bool {
        self.filtered_rows == 0
    }

    /// The worksheet had no header row at all.
    pub fn is_blank(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One full pass: filter, paginate, size and summarize. A worksheet
/// without columns renders as a single empty page.
pub fn render(
    table: &Table,
    filter: &FilterState,
    page: &PageState,
    display: &DisplayOptions,
) -> Result<ViewModel, DashError> {
    let filtered = if table.columns().is_empty() {
        Vec::new()
    } else {
        apply_filter(table, filter)?
    };
    let page_size = display.page_size.max(1);
    let pages = total_pages(filtered.len(), page_size);
    let current_page = page.effective(pages);
    let rows: Vec<Row> = paginate(&filtered, page_size, page)
        .iter()
        .map(|r| (*r).clone())
        .collect();

    let aggregates = if display.show_charts {
        match (
            table.column_index(MODEL_COLUMN),
            table.column_index(PRICE_COLUMN),
        ) {
            (Some(model_idx), Some(price_idx)) => Some(aggregate(
                &filtered,
                model_idx,
                price_idx,
                display.histogram_bins,
            )),
            _ => None,
        }
    } else {
        None
    };

    Ok(ViewModel {
        name: table.name().to_string(),
        columns: table.columns().to_vec(),
        height: display_height(rows.len(), display),
        rows,
        total_rows: table.len(),
        filtered_rows: filtered.len(),
        page_size,
        current_page,
        total_pages: pages,
        can_previous: current_page > 1,
        can_next: current_page < pages,
        aggregates,
    })
}
