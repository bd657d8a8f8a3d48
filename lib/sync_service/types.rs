/// What happened to one dispatched identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Persisted,
    /// Fetched, but flagged dead or deleted upstream.
    SkippedNotLive,
    /// The upstream returned `null` for this id.
    Missing,
    FetchFailed,
    PersistFailed,
}

/// Per-worker counters, merged into an [`IngestSummary`] once the worker drains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerTally {
    pub received: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub missing: usize,
    pub fetch_failures: usize,
    pub persist_failures: usize,
}

impl WorkerTally {
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.received += 1;
        match outcome {
            ItemOutcome::Persisted => self.persisted += 1,
            ItemOutcome::SkippedNotLive => self.skipped += 1,
            ItemOutcome::Missing => self.missing += 1,
            ItemOutcome::FetchFailed => self.fetch_failures += 1,
            ItemOutcome::PersistFailed => self.persist_failures += 1,
        }
    }
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Ids accepted by a worker before the producer stopped.
    pub dispatched: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub missing: usize,
    pub fetch_failures: usize,
    pub persist_failures: usize,
    /// Ids handled by each worker, indexed by worker number.
    pub worker_loads: Vec<usize>,
    pub cancelled: bool,
}

impl IngestSummary {
    pub fn merge(&mut self, tally: &WorkerTally) {
        self.persisted += tally.persisted;
        self.skipped += tally.skipped;
        self.missing += tally.missing;
        self.fetch_failures += tally.fetch_failures;
        self.persist_failures += tally.persist_failures;
        self.worker_loads.push(tally.received);
    }

    pub fn processed(&self) -> usize {
        self.worker_loads.iter().sum()
    }

    pub fn failures(&self) -> usize {
        self.fetch_failures + self.persist_failures
    }
}
