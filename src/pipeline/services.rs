use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use time::Date;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::dto::{DayEvent, RowPhase, RowUpdate, SyncReport, SyncStatus};
use super::queue::{same_grams, InFlight, InFlightGuard, RowKey, RowPending, RowQueue};
use crate::diary::model::FoodEntry;
use crate::diary::quantity::{parse_quantity, QuantityError, RowEdit};
use crate::diary::scaling::scaling_for_row;
use crate::diary::totals::{DayTotals, TotalsAggregator};
use crate::nutrients::non_negative;
use crate::sync::dto::DiaryDay;
use crate::sync::{SyncClient, SyncOutcome};

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("no row {0} on this day")]
    UnknownRow(String),
    #[error("row {food_id}: {source}")]
    InvalidQuantity {
        food_id: String,
        #[source]
        source: QuantityError,
    },
}

/// Owns one day's rows and turns edits into totals and remote writes.
///
/// Edits are applied synchronously and answered with fresh totals straight
/// away; the remote write runs as a spawned task and reports back on the
/// event channel. Must be used from inside a tokio runtime.
pub struct EditPipeline {
    date: Date,
    rows: Vec<FoodEntry>,
    index: HashMap<String, usize>,
    aggregator: TotalsAggregator,
    sync: SyncClient,
    queues: HashMap<String, Arc<RowQueue>>,
    in_flight: Arc<InFlight>,
    events: mpsc::UnboundedSender<DayEvent>,
}

impl EditPipeline {
    pub fn new(
        date: Date,
        entries: Vec<FoodEntry>,
        sync: SyncClient,
        aggregator: TotalsAggregator,
    ) -> (Self, mpsc::UnboundedReceiver<DayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pipeline = Self {
            date,
            rows: Vec::with_capacity(entries.len()),
            index: HashMap::new(),
            aggregator,
            sync,
            queues: HashMap::new(),
            in_flight: Arc::new(InFlight::default()),
            events: tx,
        };
        for entry in entries {
            pipeline.push_row(entry);
        }
        (pipeline, rx)
    }

    fn push_row(&mut self, mut entry: FoodEntry) -> bool {
        if self.index.contains_key(&entry.id) {
            warn!(food_id = %entry.id, "duplicate row ignored");
            return false;
        }
        entry.clamp_edits();
        entry.cached = scaling_for_row(&entry);
        self.index.insert(entry.id.clone(), self.rows.len());
        self.rows.push(entry);
        true
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn entries(&self) -> &[FoodEntry] {
        &self.rows
    }

    pub fn entry(&self, food_id: &str) -> Option<&FoodEntry> {
        self.index.get(food_id).map(|i| &self.rows[*i])
    }

    pub fn totals(&self) -> DayTotals {
        self.aggregator.aggregate(&self.rows)
    }

    /// Saves issued and not yet finished, across all rows.
    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Waits until every issued save has finished.
    pub async fn settle(&self) {
        self.in_flight.settled().await
    }

    pub fn sync_status(&self, food_id: &str) -> Option<SyncStatus> {
        self.index.get(food_id)?;
        Some(
            self.queues
                .get(food_id)
                .map(|q| q.status())
                .unwrap_or(SyncStatus::Synced),
        )
    }

    pub fn row_phase(&self, food_id: &str) -> Option<RowPhase> {
        self.index.get(food_id)?;
        let phase = match self.queues.get(food_id) {
            Some(q) if q.pending() > 0 => RowPhase::Persisting,
            Some(q) => RowPhase::Idle {
                sync_failed: q.status().is_failed(),
            },
            None => RowPhase::Idle { sync_failed: false },
        };
        Some(phase)
    }

    pub fn apply_edit(&mut self, food_id: &str, edit: RowEdit) -> Result<RowUpdate, PipelineError> {
        self.apply(food_id, edit, false)
    }

    /// Applies quantity text as typed into a row. A count of servings replaces
    /// any gram override. Text that does not parse is rejected and the row is
    /// left as it was.
    pub fn apply_text(&mut self, food_id: &str, text: &str) -> Result<RowUpdate, PipelineError> {
        self.row_index(food_id)?;
        let edit = parse_quantity(text).map_err(|source| {
            warn!(food_id, error = %source, "quantity rejected; row unchanged");
            PipelineError::InvalidQuantity {
                food_id: food_id.to_string(),
                source,
            }
        })?;
        self.apply(food_id, edit, true)
    }

    /// Issues a save for the row's current grams, e.g. after a failed write.
    pub fn resync(&mut self, food_id: &str) -> Result<RowUpdate, PipelineError> {
        let idx = self.row_index(food_id)?;
        let grams = self.rows[idx].cached.grams;
        Ok(self.persist_and_notify(idx, grams))
    }

    fn row_index(&self, food_id: &str) -> Result<usize, PipelineError> {
        self.index
            .get(food_id)
            .copied()
            .ok_or_else(|| PipelineError::UnknownRow(food_id.to_string()))
    }

    fn apply(
        &mut self,
        food_id: &str,
        edit: RowEdit,
        servings_replace_override: bool,
    ) -> Result<RowUpdate, PipelineError> {
        let idx = self.row_index(food_id)?;
        let entry = &mut self.rows[idx];

        // Validating
        let clamped = match edit {
            RowEdit::Servings(s) => {
                if servings_replace_override {
                    entry.set_grams_override(None);
                }
                entry.set_servings_eaten(s)
            }
            RowEdit::Grams(g) => entry.set_grams_override(Some(g)),
            RowEdit::Clear => {
                entry.set_grams_override(None);
                entry.set_servings_eaten(0.0)
            }
        };
        if clamped | entry.clamp_edits() {
            debug!(food_id, ?edit, "edit clamped to zero");
        }

        // Computing
        let scaling = scaling_for_row(entry);
        entry.cached = scaling;

        Ok(self.persist_and_notify(idx, scaling.grams))
    }

    fn persist_and_notify(&mut self, idx: usize, grams: f64) -> RowUpdate {
        let food_id = self.rows[idx].id.clone();
        let seq = self.persist(&food_id, grams);

        let totals = self.aggregator.aggregate(&self.rows);
        let scaling = self.rows[idx].cached;
        let update = RowUpdate {
            food_id,
            seq,
            grams: scaling.grams,
            scale: scaling.scale,
            totals,
            sync: SyncStatus::Pending,
        };
        self.events.send(DayEvent::Totals(update.clone())).ok();
        update
    }

    fn queue_for(&mut self, food_id: &str) -> Arc<RowQueue> {
        let date = self.date;
        self.queues
            .entry(food_id.to_string())
            .or_insert_with(|| {
                Arc::new(RowQueue::new(
                    RowKey {
                        date,
                        food_id: food_id.to_string(),
                    },
                    None,
                ))
            })
            .clone()
    }

    fn persist(&mut self, food_id: &str, grams: f64) -> u64 {
        let queue = self.queue_for(food_id);
        let seq = queue.issue();
        queue.set_status(SyncStatus::Pending);
        let task = PersistTask {
            sync: self.sync.clone(),
            pending: queue.begin(),
            in_flight: self.in_flight.enter(),
            queue,
            seq,
            grams,
            events: self.events.clone(),
        };
        debug!(food_id, seq, grams, "save issued");
        tokio::spawn(task.run());
        seq
    }

    /// Seeds rows from the remote diary. Stored grams become servings of the
    /// matching library food; lines for foods outside the library become rows
    /// of one serving carrying the line's own nutrient amounts. The stored
    /// grams count as synced, so re-entering them makes no call.
    pub fn hydrate(&mut self, day: &DiaryDay) -> DayTotals {
        for line in &day.entries {
            let grams = non_negative(line.grams);
            match self.index.get(&line.food_id).copied() {
                Some(idx) => {
                    let entry = &mut self.rows[idx];
                    entry.set_grams_override(None);
                    entry.set_servings_eaten(grams / entry.serving_weight_grams());
                    entry.cached = scaling_for_row(entry);
                }
                None if grams > 0.0 => {
                    let entry = FoodEntry::new(
                        line.food_id.clone(),
                        line.description.clone().unwrap_or_default(),
                        line.nutrient_amounts(),
                        grams,
                    )
                    .with_servings(1.0);
                    self.push_row(entry);
                }
                None => continue,
            }

            match self.queues.get(&line.food_id) {
                Some(q) => match q.remote.try_lock() {
                    Ok(mut remote) => remote.last_synced = Some(grams),
                    Err(_) => debug!(
                        food_id = %line.food_id,
                        grams,
                        "save in flight; remote grams not recorded"
                    ),
                },
                None => {
                    let key = RowKey {
                        date: self.date,
                        food_id: line.food_id.clone(),
                    };
                    self.queues
                        .insert(line.food_id.clone(), Arc::new(RowQueue::new(key, Some(grams))));
                }
            }
        }
        info!(date = %self.date, lines = day.entries.len(), rows = self.rows.len(), "day hydrated");
        self.totals()
    }
}

struct PersistTask {
    sync: SyncClient,
    queue: Arc<RowQueue>,
    pending: RowPending,
    in_flight: InFlightGuard,
    seq: u64,
    grams: f64,
    events: mpsc::UnboundedSender<DayEvent>,
}

impl PersistTask {
    async fn run(self) {
        let PersistTask {
            sync,
            queue,
            pending,
            in_flight,
            seq,
            grams,
            events,
        } = self;
        let report = Self::persist(&sync, &queue, seq, grams).await;
        if let Some(report) = report {
            events.send(DayEvent::Sync(report)).ok();
        }
        drop(pending);
        drop(in_flight);
    }

    async fn persist(
        sync: &SyncClient,
        queue: &RowQueue,
        seq: u64,
        grams: f64,
    ) -> Option<SyncReport> {
        let food_id = queue.key.food_id.as_str();
        let mut remote = queue.remote.lock().await;
        if queue.is_superseded(seq) {
            debug!(food_id, seq, "save superseded before dispatch");
            return None;
        }

        let result = match remote.last_synced {
            Some(prev) if same_grams(prev, grams) => Ok(SyncOutcome::Unchanged),
            _ => sync.set_quantity(queue.key.date, food_id, grams).await,
        };
        remote.last_synced = match &result {
            Ok(_) => Some(grams),
            Err(_) => None,
        };
        drop(remote);

        if queue.is_superseded(seq) {
            debug!(food_id, seq, "stale save response discarded");
            return None;
        }

        let (outcome, status) = match result {
            Ok(outcome) => (Some(outcome), SyncStatus::Synced),
            Err(e) => {
                warn!(food_id, seq, error = %e, "row left unsynced");
                (
                    None,
                    SyncStatus::Failed {
                        message: e.to_string(),
                    },
                )
            }
        };
        queue.set_status(status.clone());
        Some(SyncReport {
            food_id: food_id.to_string(),
            seq,
            grams,
            outcome,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diary::totals::Budgets;
    use crate::nutrients::{Nutrient, NutrientMap};
    use crate::sync::dto::DiaryLine;
    use crate::sync::services::testing::{Op, ScriptedStore};
    use std::time::Duration;
    use time::macros::date;

    const DAY: Date = date!(2024 - 06 - 02);

    fn soup() -> FoodEntry {
        let mut per = NutrientMap::new();
        per.insert(Nutrient::Sodium, 600.0);
        per.insert(Nutrient::Calories, 120.0);
        FoodEntry::new("soup", "Miso soup", per, 50.0)
    }

    fn banana() -> FoodEntry {
        let mut per = NutrientMap::new();
        per.insert(Nutrient::Potassium, 422.0);
        FoodEntry::new("banana", "Banana", per, 118.0)
    }

    fn pipeline(
        store: &Arc<ScriptedStore>,
    ) -> (EditPipeline, mpsc::UnboundedReceiver<DayEvent>) {
        EditPipeline::new(
            DAY,
            vec![soup(), banana()],
            SyncClient::new(store.clone()),
            TotalsAggregator::new(Budgets::default()),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DayEvent>) -> Vec<DayEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    fn sync_reports(events: &[DayEvent]) -> Vec<SyncReport> {
        events
            .iter()
            .filter_map(|e| match e {
                DayEvent::Sync(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn servings_edit_updates_totals_then_persists() {
        let store = ScriptedStore::new();
        let (mut p, mut rx) = pipeline(&store);

        let update = p.apply_edit("soup", RowEdit::Servings(3.0)).unwrap();
        assert_eq!(update.grams, 150.0);
        assert_eq!(update.scale, 3.0);
        assert_eq!(update.totals.value(Nutrient::Sodium), 1800.0);
        assert_eq!(update.totals.total_grams, 150.0);
        assert_eq!(update.sync, SyncStatus::Pending);
        assert_eq!(p.entry("soup").unwrap().cached.grams, 150.0);

        p.settle().await;
        assert_eq!(p.in_flight(), 0);
        assert_eq!(store.inner.grams(DAY, "soup"), Some(150.0));
        assert_eq!(p.sync_status("soup"), Some(SyncStatus::Synced));

        let events = drain(&mut rx);
        assert!(matches!(events[0], DayEvent::Totals(_)));
        let reports = sync_reports(&events);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, Some(SyncOutcome::Created));
    }

    #[tokio::test]
    async fn gram_override_wins_over_servings() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);
        p.apply_edit("soup", RowEdit::Servings(3.0)).unwrap();
        let update = p.apply_edit("soup", RowEdit::Grams(200.0)).unwrap();
        assert_eq!(update.grams, 200.0);
        assert_eq!(update.scale, 4.0);
        assert_eq!(update.totals.value(Nutrient::Sodium), 2400.0);
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), Some(200.0));
    }

    #[tokio::test]
    async fn negative_servings_clamp_and_remove() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);

        let update = p.apply_edit("soup", RowEdit::Servings(-2.0)).unwrap();
        assert_eq!(p.entry("soup").unwrap().servings_eaten(), 0.0);
        assert_eq!(update.grams, 0.0);

        p.settle().await;
        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, Op::Remove);
        assert_eq!(calls[0].food_id, "soup");
    }

    #[tokio::test]
    async fn clearing_a_logged_row_removes_the_line() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);
        p.apply_edit("soup", RowEdit::Grams(80.0)).unwrap();
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), Some(80.0));

        let update = p.apply_edit("soup", RowEdit::Clear).unwrap();
        assert_eq!(update.grams, 0.0);
        assert_eq!(update.totals.value(Nutrient::Sodium), 0.0);
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), None);
        assert_eq!(store.count(Op::Remove), 1);
    }

    #[tokio::test]
    async fn rapid_edits_end_at_the_last_value() {
        let store = ScriptedStore::new();
        let (mut p, mut rx) = pipeline(&store);

        p.apply_edit("soup", RowEdit::Grams(100.0)).unwrap();
        p.apply_edit("soup", RowEdit::Grams(50.0)).unwrap();
        p.settle().await;

        assert_eq!(store.inner.grams(DAY, "soup"), Some(50.0));
        assert!(store.calls().iter().all(|c| c.grams != Some(100.0)));
        let reports = sync_reports(&drain(&mut rx));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].grams, 50.0);
    }

    #[tokio::test]
    async fn slow_older_save_cannot_overwrite_newer_edit() {
        let store = ScriptedStore::new();
        store.delay(100.0, Duration::from_millis(30));
        let (mut p, mut rx) = pipeline(&store);

        p.apply_edit("soup", RowEdit::Grams(100.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(p.row_phase("soup"), Some(RowPhase::Persisting));
        let newer = p.apply_edit("soup", RowEdit::Grams(50.0)).unwrap();
        assert_eq!(p.in_flight(), 2);
        p.settle().await;

        assert_eq!(store.inner.grams(DAY, "soup"), Some(50.0));
        let reports = sync_reports(&drain(&mut rx));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].seq, newer.seq);
        assert_eq!(reports[0].outcome, Some(SyncOutcome::Updated));
        assert_eq!(p.entry("soup").unwrap().cached.grams, 50.0);
        assert_eq!(p.row_phase("soup"), Some(RowPhase::Idle { sync_failed: false }));
    }

    #[tokio::test]
    async fn unchanged_grams_make_no_call() {
        let store = ScriptedStore::new();
        let (mut p, mut rx) = pipeline(&store);
        p.apply_edit("soup", RowEdit::Servings(2.0)).unwrap();
        p.settle().await;
        let before = store.calls().len();

        p.apply_edit("soup", RowEdit::Grams(100.0)).unwrap();
        p.settle().await;
        assert_eq!(store.calls().len(), before);
        let reports = sync_reports(&drain(&mut rx));
        assert_eq!(reports.last().unwrap().outcome, Some(SyncOutcome::Unchanged));
    }

    #[tokio::test]
    async fn failed_create_is_reported_and_row_stays_editable() {
        let store = ScriptedStore::new();
        store.fail(Op::Add, 1);
        let (mut p, mut rx) = pipeline(&store);

        let update = p.apply_edit("soup", RowEdit::Servings(1.0)).unwrap();
        p.settle().await;
        assert_eq!(store.count(Op::Qty), 1);
        assert_eq!(store.count(Op::Add), 1);
        assert!(p.sync_status("soup").unwrap().is_failed());
        assert_eq!(p.row_phase("soup"), Some(RowPhase::Idle { sync_failed: true }));
        assert_eq!(p.totals(), update.totals);

        let reports = sync_reports(&drain(&mut rx));
        assert_eq!(reports.len(), 1);
        assert!(reports[0].status.is_failed());

        p.resync("soup").unwrap();
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), Some(50.0));
        assert_eq!(p.sync_status("soup"), Some(SyncStatus::Synced));
    }

    #[tokio::test]
    async fn rows_persist_independently() {
        let store = ScriptedStore::new();
        store.delay(118.0, Duration::from_millis(20));
        let (mut p, _rx) = pipeline(&store);

        p.apply_edit("banana", RowEdit::Servings(1.0)).unwrap();
        let update = p.apply_edit("soup", RowEdit::Servings(1.0)).unwrap();
        assert_eq!(update.totals.value(Nutrient::Potassium), 422.0);
        assert_eq!(update.totals.value(Nutrient::Sodium), 600.0);
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "banana"), Some(118.0));
        assert_eq!(store.inner.grams(DAY, "soup"), Some(50.0));
        assert_eq!(p.in_flight(), 0);
    }

    #[tokio::test]
    async fn unknown_row_is_an_error() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);
        assert_eq!(
            p.apply_edit("nope", RowEdit::Servings(1.0)),
            Err(PipelineError::UnknownRow("nope".into()))
        );
        assert_eq!(p.sync_status("nope"), None);
        assert_eq!(p.in_flight(), 0);
    }

    #[tokio::test]
    async fn text_edits_parse_and_explicit_zero_clears() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);

        let u = p.apply_text("soup", "120g").unwrap();
        assert_eq!(u.grams, 120.0);
        let u = p.apply_text("soup", "//").unwrap();
        assert_eq!(u.grams, 100.0);
        assert_eq!(p.entry("soup").unwrap().grams_override(), None);
        let u = p.apply_text("soup", "1 cup").unwrap();
        assert_eq!(u.grams, 240.0);
        let u = p.apply_text("soup", "clear").unwrap();
        assert_eq!(u.grams, 0.0);
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), None);
    }

    #[tokio::test]
    async fn unparsable_text_leaves_logged_row_alone() {
        let store = ScriptedStore::new();
        let (mut p, mut rx) = pipeline(&store);
        p.apply_text("soup", "200g").unwrap();
        p.settle().await;
        drain(&mut rx);
        let before = store.calls().len();

        for text in ["1 handful", "", "-3"] {
            let err = p.apply_text("soup", text).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidQuantity { ref food_id, .. } if food_id == "soup"));
        }
        p.settle().await;

        assert_eq!(p.entry("soup").unwrap().cached.grams, 200.0);
        assert_eq!(p.totals().value(Nutrient::Sodium), 2400.0);
        assert_eq!(store.calls().len(), before);
        assert_eq!(store.inner.grams(DAY, "soup"), Some(200.0));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            p.apply_text("nope", "junk").unwrap_err(),
            PipelineError::UnknownRow("nope".into())
        );
    }

    #[tokio::test]
    async fn hydrate_during_a_save_keeps_the_row_consistent() {
        let store = ScriptedStore::new();
        store.delay(60.0, Duration::from_millis(20));
        let (mut p, _rx) = pipeline(&store);

        p.apply_edit("soup", RowEdit::Grams(60.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let day = DiaryDay {
            date: Some(DAY),
            entries: vec![DiaryLine {
                food_id: "soup".into(),
                description: None,
                grams: 60.0,
                nutrients: serde_json::Map::new(),
            }],
        };
        let totals = p.hydrate(&day);
        assert_eq!(totals.total_grams, 60.0);
        p.settle().await;
        assert_eq!(store.inner.grams(DAY, "soup"), Some(60.0));
        assert_eq!(p.sync_status("soup"), Some(SyncStatus::Synced));
    }

    #[tokio::test]
    async fn hydrate_restores_rows_and_skips_redundant_writes() {
        let store = ScriptedStore::new();
        let (mut p, _rx) = pipeline(&store);

        let mut extra = serde_json::Map::new();
        extra.insert("Sodium".into(), serde_json::json!(90.0));
        let day = DiaryDay {
            date: Some(DAY),
            entries: vec![
                DiaryLine {
                    food_id: "soup".into(),
                    description: None,
                    grams: 75.0,
                    nutrients: serde_json::Map::new(),
                },
                DiaryLine {
                    food_id: "crackers".into(),
                    description: Some("Crackers".into()),
                    grams: 12.0,
                    nutrients: extra,
                },
            ],
        };
        let totals = p.hydrate(&day);
        assert_eq!(p.entries().len(), 3);
        assert_eq!(p.entry("soup").unwrap().servings_eaten(), 1.5);
        assert_eq!(totals.value(Nutrient::Sodium), 900.0 + 90.0);
        assert_eq!(totals.total_grams, 87.0);

        p.apply_edit("soup", RowEdit::Grams(75.0)).unwrap();
        p.settle().await;
        assert!(store.calls().is_empty());
    }
}
