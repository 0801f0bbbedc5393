use arboard::Clipboard;
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

use crate::cache::CachedLoader;
use crate::domain::{
    DashConfig, DashError, FILTER_COLUMNS, MODEL_COLUMN, Message, YEAR_COLUMN,
};
use crate::filter::{FilterState, distinct_values};
use crate::pagination::PageState;
use crate::source::TableSource;
use crate::view::{DisplayOptions, ViewModel, render};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modus {
    DASHBOARD,
    POPUP,
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    loader: CachedLoader<Box<dyn TableSource>>,
    filter: FilterState,
    options: Vec<(String, Vec<String>)>,
    page: PageState,
    display: DisplayOptions,
    view: Option<ViewModel>,
    failure: Option<String>,
    clipboard: Option<Clipboard>,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &DashConfig, source: Box<dyn TableSource>) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::DASHBOARD,
            loader: CachedLoader::new(source, config.cache_ttl),
            filter: FilterState::default(),
            options: Vec::new(),
            page: PageState::default(),
            display: DisplayOptions::from_config(config),
            view: None,
            failure: None,
            clipboard: None,
            status_message: "Started carview!".to_string(),
            last_status_message_update: Instant::now(),
        };
        model.refresh(Instant::now());
        model
    }

    pub fn update(&mut self, message: Option<Message>) {
        if let Some(msg) = message {
            trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
            match self.modus {
                Modus::DASHBOARD => match msg {
                    Message::Quit => self.quit(),
                    Message::NextModel => self.cycle_filter(MODEL_COLUMN, true),
                    Message::PreviousModel => self.cycle_filter(MODEL_COLUMN, false),
                    Message::NextYear => self.cycle_filter(YEAR_COLUMN, true),
                    Message::PreviousYear => self.cycle_filter(YEAR_COLUMN, false),
                    Message::NextPage => self.next_page(),
                    Message::PreviousPage => self.previous_page(),
                    Message::GrowPageSize => self.resize_page(true),
                    Message::ShrinkPageSize => self.resize_page(false),
                    Message::ToggleCharts => {
                        self.display.show_charts = !self.display.show_charts;
                    }
                    Message::ToggleFixedLayout => {
                        self.display.layout = self.display.layout.toggled();
                    }
                    Message::CopyPage => self.copy_page(),
                    Message::Reload => self.reload(),
                    Message::Help => self.modus = Modus::POPUP,
                    Message::Exit => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.modus = Modus::DASHBOARD,
                    _ => (),
                },
            }
        }

        // Every interaction re-runs the whole pipeline.
        if self.status != Status::QUITTING {
            self.refresh(Instant::now());
        }
    }

    /// Loads (or reuses) the table and renders the current selections.
    /// Source and schema failures end the pass and are shown once.
    fn refresh(&mut self, now: Instant) {
        let fetching = self.loader.is_stale(now);
        let table = match self.loader.load(now) {
            Ok(table) => table,
            Err(e) => {
                error!("Loading {} failed: {e}", self.loader.describe());
                self.fail(e);
                return;
            }
        };

        if fetching {
            self.filter.retain_available(table);
            self.options = FILTER_COLUMNS
                .iter()
                .map(|c| (c.to_string(), distinct_values(table, c)))
                .collect();
        }

        let result = render(table, &self.filter, &self.page, &self.display);
        match result {
            Ok(view) => {
                self.page.clamp_to(view.total_pages);
                self.status = Status::READY;
                self.failure = None;
                if view.is_blank() {
                    warn!("{} has no columns", self.loader.describe());
                    self.set_status_message(format!("{} is empty", self.loader.describe()));
                } else if fetching {
                    self.set_status_message(format!(
                        "Loaded {} rows from {}",
                        view.total_rows,
                        self.loader.describe()
                    ));
                } else if view.is_empty() {
                    self.set_status_message("No records match the current filters");
                }
                self.view = Some(view);
            }
            Err(e) => {
                warn!("Render pass halted: {e}");
                self.fail(e);
            }
        }
    }

    fn fail(&mut self, e: DashError) {
        if self.status != Status::QUITTING {
            self.status = Status::EMPTY;
        }
        self.view = None;
        self.failure = Some(e.to_string());
        self.set_status_message(format!("Error: {e}"));
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn cycle_filter(&mut self, column: &str, forward: bool) {
        let options = self
            .options
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, o)| o.as_slice())
            .unwrap_or_default();
        self.filter.cycle(column, options, forward);
    }

    fn total_pages(&self) -> usize {
        self.view.as_ref().map_or(1, |v| v.total_pages)
    }

    fn next_page(&mut self) {
        if self.page.advance(self.total_pages()) {
            trace!("Moved to page {}", self.page.current());
        } else {
            trace!("Already on the last page");
        }
    }

    fn previous_page(&mut self) {
        if self.page.retreat() {
            trace!("Moved to page {}", self.page.current());
        } else {
            trace!("Already on the first page");
        }
    }

    fn resize_page(&mut self, grow: bool) {
        let size = if grow {
            self.display.page_size + 1
        } else {
            self.display.page_size.saturating_sub(1)
        };
        self.display.page_size = DashConfig::clamp_page_size(size);
    }

    fn reload(&mut self) {
        info!("Reload requested");
        self.loader.invalidate();
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',' || c == '"');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    /// The visible page as CSV, header first. Empty cells stay empty.
    pub fn page_as_csv(view: &ViewModel) -> String {
        let mut lines = Vec::with_capacity(view.rows.len() + 1);
        lines.push(
            view.columns
                .iter()
                .map(|c| Self::wrap_cell_content(c))
                .collect::<Vec<String>>()
                .join(","),
        );
        for row in view.rows.iter() {
            lines.push(
                row.cells()
                    .iter()
                    .map(|v| Self::wrap_cell_content(&v.normalized()))
                    .collect::<Vec<String>>()
                    .join(","),
            );
        }
        lines.join("\n")
    }

    fn copy_page(&mut self) {
        let Some(view) = &self.view else {
            return;
        };
        let content = Self::page_as_csv(view);
        let rows = view.rows.len();

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(cb) => self.clipboard = Some(cb),
                Err(e) => {
                    warn!("Clipboard not available: {e:?}");
                    self.set_status_message("Clipboard not available");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(content) {
                Ok(_) => self.set_status_message(format!("Copied {rows} rows to clipboard")),
                Err(e) => {
                    trace!("Error copying to clipboard: {:?}", e);
                    self.set_status_message("Copy to clipboard failed");
                }
            }
        }
    }

    // -------------------- Accessors for the ui ---------------------- //

    pub fn view(&self) -> Option<&ViewModel> {
        self.view.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn option_count(&self, column: &str) -> usize {
        self.options
            .iter()
            .find(|(c, _)| c == column)
            .map_or(0, |(_, o)| o.len())
    }

    pub fn display(&self) -> &DisplayOptions {
        &self.display
    }

    pub fn modus(&self) -> Modus {
        self.modus
    }

    pub fn source_name(&self) -> String {
        self.loader.describe()
    }

    /// Time since the cached table was fetched.
    pub fn data_age(&self) -> Option<Duration> {
        self.loader.fetched_at().map(|at| at.elapsed())
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Selection;
    use crate::table::tests::sample_table;
    use crate::table::{Row, Table, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeSource {
        table: Rc<RefCell<Result<Table, String>>>,
        calls: Rc<Cell<usize>>,
    }

    impl FakeSource {
        fn new(table: Table) -> Self {
            Self {
                table: Rc::new(RefCell::new(Ok(table))),
                calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl TableSource for FakeSource {
        fn load_table(&self) -> Result<Table, DashError> {
            self.calls.set(self.calls.get() + 1);
            self.table
                .borrow()
                .clone()
                .map_err(DashError::SourceUnavailable)
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    impl Model {
        fn page(&self) -> &PageState {
            &self.page
        }
    }

    fn model_with(source: &FakeSource, page_size: usize) -> Model {
        let cfg = DashConfig::default().with_page_size(page_size);
        Model::init(&cfg, Box::new(source.clone()))
    }

    #[test]
    fn initial_pass_shows_first_page() {
        let source = FakeSource::new(sample_table());
        let model = model_with(&source, 2);
        let view = model.view().unwrap();

        assert_eq!(model.status, Status::READY);
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.current_page, 1);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(model.option_count("model"), 2);
    }

    #[test]
    fn navigation_is_bounded() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 1);

        model.update(Some(Message::PreviousPage));
        assert_eq!(model.page().current(), 1);
        for _ in 0..5 {
            model.update(Some(Message::NextPage));
        }
        assert_eq!(model.page().current(), 3);
        let view = model.view().unwrap();
        assert!(!view.can_next);
        assert_eq!(view.rows[0].get(0), &Value::Text("Civic".into()));
    }

    #[test]
    fn filter_change_clamps_page() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 1);
        model.update(Some(Message::NextPage));
        model.update(Some(Message::NextPage));
        assert_eq!(model.page().current(), 3);

        // options are sorted, so the first model after "all" is Civic
        model.update(Some(Message::NextModel));
        assert_eq!(
            model.filter().get("model"),
            Some(&Selection::Value("Civic".into()))
        );
        assert_eq!(model.page().current(), 1);
        assert_eq!(model.view().unwrap().filtered_rows, 1);
    }

    #[test]
    fn shrinking_page_size_keeps_page_in_range() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 1);
        model.update(Some(Message::NextPage));
        model.update(Some(Message::NextPage));
        model.update(Some(Message::GrowPageSize));

        assert_eq!(model.display().page_size, 2);
        assert_eq!(model.page().current(), 2);
        assert_eq!(model.view().unwrap().rows.len(), 1);

        model.update(Some(Message::ShrinkPageSize));
        model.update(Some(Message::ShrinkPageSize));
        assert_eq!(model.display().page_size, 1);
    }

    #[test]
    fn reload_refetches_and_drops_vanished_selection() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 10);
        model.update(Some(Message::NextModel));
        assert_eq!(source.calls.get(), 1);

        *source.table.borrow_mut() = Ok(Table::new(
            "carros",
            vec!["model".into(), "year".into(), "price".into()],
            vec![Row::new(vec![
                Value::Text("Gol".into()),
                Value::Int(2020),
                Value::Text("1".into()),
            ])],
        ));
        model.update(Some(Message::Reload));

        assert_eq!(source.calls.get(), 2);
        assert_eq!(model.filter().get("model"), Some(&Selection::All));
        assert_eq!(model.view().unwrap().total_rows, 1);
    }

    #[test]
    fn source_failure_halts_the_pass() {
        let source = FakeSource::new(sample_table());
        *source.table.borrow_mut() = Err("bad credentials".into());
        let model = model_with(&source, 10);

        assert!(model.view().is_none());
        assert_eq!(model.status, Status::EMPTY);
        assert!(model.failure().unwrap().contains("bad credentials"));
    }

    #[test]
    fn failed_reload_leaves_ready_state() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 10);
        assert_eq!(model.status, Status::READY);
        assert!(model.data_age().is_some());

        *source.table.borrow_mut() = Err("offline".into());
        model.update(Some(Message::Reload));

        assert_eq!(model.status, Status::EMPTY);
        assert!(model.view().is_none());
        assert!(model.data_age().is_none());
        assert!(model.failure().unwrap().contains("offline"));
    }

    #[test]
    fn blank_worksheet_is_an_empty_notice() {
        let source = FakeSource::new(Table::new("carros", Vec::new(), Vec::new()));
        let model = model_with(&source, 10);

        assert!(model.failure().is_none());
        assert_eq!(model.status, Status::READY);
        let view = model.view().unwrap();
        assert!(view.is_blank());
        assert_eq!(model.status_message(), "fake is empty");
    }

    #[test]
    fn missing_column_is_reported() {
        let source = FakeSource::new(Table::new(
            "carros",
            vec!["model".into(), "price".into()],
            Vec::new(),
        ));
        let model = model_with(&source, 10);
        assert!(model.view().is_none());
        assert!(model.failure().unwrap().contains("\"year\""));
    }

    #[test]
    fn charts_toggle_adds_aggregates() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 10);
        assert!(model.view().unwrap().aggregates.is_none());
        model.update(Some(Message::ToggleCharts));
        assert!(model.view().unwrap().aggregates.is_some());
    }

    #[test]
    fn help_popup_swallows_navigation() {
        let source = FakeSource::new(sample_table());
        let mut model = model_with(&source, 1);
        model.update(Some(Message::Help));
        assert_eq!(model.modus(), Modus::POPUP);
        model.update(Some(Message::NextPage));
        assert_eq!(model.page().current(), 1);
        model.update(Some(Message::Exit));
        assert_eq!(model.modus(), Modus::DASHBOARD);
    }

    #[test]
    fn page_csv_quotes_where_needed() {
        let view = ViewModel {
            name: "t".into(),
            columns: vec!["model".into(), "price".into()],
            rows: vec![
                Row::new(vec![Value::Text("Gol G5".into()), Value::Text("50.000,00".into())]),
                Row::new(vec![Value::Text("say \"hi\"".into()), Value::Empty]),
            ],
            total_rows: 2,
            filtered_rows: 2,
            page_size: 10,
            current_page: 1,
            total_pages: 1,
            height: 5,
            can_previous: false,
            can_next: false,
            aggregates: None,
        };
        assert_eq!(
            Model::page_as_csv(&view),
            "model,price\n\"Gol G5\",\"50.000,00\"\n\"say \"\"hi\"\"\","
        );
    }
}
