// src/pipeline/mod.rs
//
// normalize (parallel, order-preserving) → dedup (last wins) → filter.

use crate::error::{ConfigError, SourceError, ValidationError};
use crate::normalize::Normalizer;
use crate::record::{CanonicalRecord, SourceBatch};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Which records a run keeps, by identifier prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Prefix(String),
}

impl Scope {
    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        match self {
            Scope::All => true,
            Scope::Prefix(p) => record.identifier.starts_with(p.as_str()),
        }
    }
}

impl FromStr for Scope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "TODAS" | "ALL" => Ok(Scope::All),
            "OTRAS" => Ok(Scope::Prefix("OTRAS-".into())),
            "CONVE" => Ok(Scope::Prefix("CONVE-".into())),
            other => Err(ConfigError::InvalidValue {
                key: "scope".into(),
                value: other.to_string(),
            }),
        }
    }
}

/// Predicate keeping records whose status equals `status`, ignoring case.
pub fn status_is(status: &str) -> impl Fn(&CanonicalRecord) -> bool + Sync + '_ {
    move |r: &CanonicalRecord| r.status.trim().eq_ignore_ascii_case(status.trim())
}

/// Where a row came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOrigin {
    pub source_tag: String,
    pub position: usize,
}

impl From<&CanonicalRecord> for RowOrigin {
    fn from(r: &CanonicalRecord) -> Self {
        Self {
            source_tag: r.source_tag.clone(),
            position: r.position,
        }
    }
}

/// Two rows with the same identifier; `kept` replaced `replaced`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub identifier: String,
    pub replaced: RowOrigin,
    pub kept: RowOrigin,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Deduplicated, filtered records in arrival order.
    pub records: Vec<CanonicalRecord>,
    pub errors: Vec<ValidationError>,
    pub collisions: Vec<Collision>,
    /// Valid, deduplicated records the predicate rejected.
    pub filtered_out: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub produced: usize,
    pub skipped: usize,
    /// reason → count
    pub skipped_by_reason: BTreeMap<String, usize>,
    pub skipped_rows: Vec<RowOrigin>,
    pub filtered_out: usize,
    pub collisions: usize,
    pub field_warnings: usize,
    /// field → number of produced records where it is unset
    pub unset_fields: BTreeMap<String, usize>,
    pub indexed_amount_unavailable: usize,
}

impl BatchOutcome {
    pub fn summary(&self) -> BatchSummary {
        let mut s = BatchSummary {
            produced: self.records.len(),
            skipped: self.errors.len(),
            filtered_out: self.filtered_out,
            collisions: self.collisions.len(),
            ..BatchSummary::default()
        };
        for e in &self.errors {
            *s.skipped_by_reason.entry(e.reason().to_string()).or_default() += 1;
            s.skipped_rows.push(RowOrigin {
                source_tag: e.source_tag().to_string(),
                position: e.position(),
            });
        }
        for r in &self.records {
            s.field_warnings += r.warnings.len();
            if !r.indexed_amount_available() {
                s.indexed_amount_unavailable += 1;
            }
            for field in r.unset_fields() {
                *s.unset_fields.entry(field.to_string()).or_default() += 1;
            }
        }
        s
    }
}

/// Keep the last record per identifier, at the position of that last
/// occurrence. Returns the survivors in order plus one collision per overwrite.
fn dedup_last_wins(records: Vec<CanonicalRecord>) -> (Vec<CanonicalRecord>, Vec<Collision>) {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut collisions = Vec::new();

    for (idx, rec) in records.iter().enumerate() {
        if let Some(prev) = last_index.insert(rec.identifier.as_str(), idx) {
            let collision = Collision {
                identifier: rec.identifier.clone(),
                replaced: RowOrigin::from(&records[prev]),
                kept: RowOrigin::from(rec),
            };
            warn!(
                id = %collision.identifier,
                replaced_source = %collision.replaced.source_tag,
                replaced_row = collision.replaced.position,
                kept_source = %collision.kept.source_tag,
                kept_row = collision.kept.position,
                "duplicate identifier; later row wins"
            );
            collisions.push(collision);
        }
    }

    let keep: Vec<bool> = {
        let mut keep = vec![false; records.len()];
        for idx in last_index.into_values() {
            keep[idx] = true;
        }
        keep
    };
    let survivors = records
        .into_iter()
        .zip(keep)
        .filter_map(|(rec, k)| k.then_some(rec))
        .collect();
    (survivors, collisions)
}

pub struct Pipeline<'a> {
    normalizer: Normalizer<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(normalizer: Normalizer<'a>) -> Self {
        Self { normalizer }
    }

    /// Normalize every row of every batch (batches in the given order), then
    /// deduplicate and apply `predicate`.
    #[instrument(level = "info", skip_all, fields(batches = batches.len()))]
    pub fn run_batch<F>(&self, batches: &[SourceBatch], predicate: F) -> BatchOutcome
    where
        F: Fn(&CanonicalRecord) -> bool,
    {
        let mut normalized = Vec::new();
        let mut errors = Vec::new();

        for batch in batches {
            let results: Vec<Result<CanonicalRecord, ValidationError>> = batch
                .rows
                .par_iter()
                .map(|row| self.normalizer.normalize(row, &batch.tag))
                .collect();

            for result in results {
                match result {
                    Ok(rec) => normalized.push(rec),
                    Err(e) => {
                        warn!(source = e.source_tag(), row = e.position(), "skipping row: {}", e);
                        errors.push(e);
                    }
                }
            }
        }

        let (deduped, collisions) = dedup_last_wins(normalized);
        let before = deduped.len();
        let records: Vec<CanonicalRecord> = deduped.into_iter().filter(|r| predicate(r)).collect();
        let filtered_out = before - records.len();

        info!(
            produced = records.len(),
            skipped = errors.len(),
            collisions = collisions.len(),
            filtered_out,
            "batch normalized"
        );

        BatchOutcome {
            records,
            errors,
            collisions,
            filtered_out,
        }
    }

    /// Like `run_batch`, for reader results. Any unavailable source aborts the
    /// whole run and is returned as-is; nothing is normalized in that case.
    pub fn run_sources<F>(
        &self,
        sources: Vec<Result<SourceBatch, SourceError>>,
        predicate: F,
    ) -> Result<BatchOutcome, SourceError>
    where
        F: Fn(&CanonicalRecord) -> bool,
    {
        let batches = sources.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(self.run_batch(&batches, predicate))
    }
}
