use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::domain::DashError;
use crate::source::TableSource;
use crate::table::Table;

/// Wraps a source and reuses the last table until it is older than `ttl`
/// or someone calls `invalidate`.
pub struct CachedLoader<S: TableSource> {
    source: S,
    ttl: Duration,
    cached: Option<(Table, Instant)>,
}

impl<S: TableSource> CachedLoader<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: None,
        }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub fn invalidate(&mut self) {
        debug!("Cache invalidated");
        self.cached = None;
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match &self.cached {
            Some((_, fetched_at)) => now.saturating_duration_since(*fetched_at) > self.ttl,
            None => true,
        }
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.cached.as_ref().map(|(_, at)| *at)
    }

    /// Returns the cached table, fetching first when stale. Accepts `now` so
    /// expiry can be tested without sleeping. A failed fetch keeps the old
    /// entry out of use: the error is returned and the cache stays empty.
    #[instrument(skip(self), fields(source = %self.source.describe()))]
    pub fn load(&mut self, now: Instant) -> Result<&Table, DashError> {
        if self.is_stale(now) {
            self.cached = None;
            let start_time = Instant::now();
            let table = self.source.load_table()?;
            info!(
                "Fetched {} rows in {}ms",
                table.len(),
                start_time.elapsed().as_millis()
            );
            self.cached = Some((table, now));
        }
        match &self.cached {
            Some((table, _)) => Ok(table),
            None => Err(DashError::LoadingFailed("cache is empty".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::sample_table;
    use std::cell::Cell;

    struct CountingSource {
        calls: Cell<usize>,
        fail: Cell<bool>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                fail: Cell::new(false),
            }
        }
    }

    impl TableSource for &CountingSource {
        fn load_table(&self) -> Result<Table, DashError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                Err(DashError::SourceUnavailable("offline".into()))
            } else {
                Ok(sample_table())
            }
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn reuses_table_within_ttl() {
        let source = CountingSource::new();
        let mut loader = CachedLoader::new(&source, Duration::from_secs(60));
        let t0 = Instant::now();

        assert_eq!(loader.load(t0).unwrap().len(), 3);
        loader.load(t0 + Duration::from_secs(30)).unwrap();
        loader.load(t0 + Duration::from_secs(60)).unwrap();
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn refetches_after_ttl() {
        let source = CountingSource::new();
        let mut loader = CachedLoader::new(&source, Duration::from_secs(60));
        let t0 = Instant::now();

        loader.load(t0).unwrap();
        assert!(loader.is_stale(t0 + Duration::from_secs(61)));
        loader.load(t0 + Duration::from_secs(61)).unwrap();
        assert_eq!(source.calls.get(), 2);
        assert_eq!(loader.fetched_at(), Some(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn invalidate_forces_refetch() {
        let source = CountingSource::new();
        let mut loader = CachedLoader::new(&source, Duration::from_secs(60));
        let t0 = Instant::now();

        loader.load(t0).unwrap();
        loader.invalidate();
        loader.load(t0).unwrap();
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn failed_fetch_is_reported_and_not_cached() {
        let source = CountingSource::new();
        let mut loader = CachedLoader::new(&source, Duration::from_secs(60));
        let t0 = Instant::now();

        loader.load(t0).unwrap();
        source.fail.set(true);
        let later = t0 + Duration::from_secs(120);
        assert!(matches!(
            loader.load(later),
            Err(DashError::SourceUnavailable(_))
        ));
        assert!(loader.fetched_at().is_none());

        source.fail.set(false);
        loader.load(later).unwrap();
        assert_eq!(source.calls.get(), 3);
    }
}
