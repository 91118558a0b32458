use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_core::{
    CategoryMatch, Money, PayeeMatch, RecurringMatch, SeriesId, TimeWindow, TransactionCandidate,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(Uuid);

impl RowId {
    pub fn new() -> Self {
        RowId(Uuid::new_v4())
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Pending,
    Accepted,
    Rejected,
    Edited,
}

impl RowStatus {
    pub fn is_commit_eligible(self) -> bool {
        matches!(self, RowStatus::Accepted | RowStatus::Edited)
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowStatus::Pending => "pending",
            RowStatus::Accepted => "accepted",
            RowStatus::Rejected => "rejected",
            RowStatus::Edited => "edited",
        };
        write!(f, "{s}")
    }
}

/// User corrections; each present field wins over every suggestion at commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowOverrides {
    pub counterparty: Option<String>,
    pub category: Option<String>,
    pub amount: Option<Money>,
    pub series_id: Option<SeriesId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub id: RowId,
    pub candidate: TransactionCandidate,
    pub category_match: CategoryMatch,
    pub payee_match: PayeeMatch,
    pub recurring_match: RecurringMatch,
    pub status: RowStatus,
    pub overrides: Option<RowOverrides>,
    /// SHA-256 of the source; see [`crate::fingerprint::fingerprint`].
    pub fingerprint: String,
    /// History entry already recorded from the same source, if any.
    pub duplicate_of: Option<i64>,
    /// Earlier row of this batch built from the same source, if any.
    pub repeat_of: Option<RowId>,
}

impl ReviewRow {
    pub fn new(
        candidate: TransactionCandidate,
        category_match: CategoryMatch,
        payee_match: PayeeMatch,
        recurring_match: RecurringMatch,
        fingerprint: String,
    ) -> Self {
        ReviewRow {
            id: RowId::new(),
            candidate,
            category_match,
            payee_match,
            recurring_match,
            status: RowStatus::Pending,
            overrides: None,
            fingerprint,
            duplicate_of: None,
            repeat_of: None,
        }
    }

    pub fn with_duplicate_of(mut self, entry_id: Option<i64>) -> Self {
        self.duplicate_of = entry_id;
        self
    }

    pub fn with_repeat_of(mut self, row: Option<RowId>) -> Self {
        self.repeat_of = row;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewError {
    #[error("No row with id {0}")]
    UnknownRow(RowId),
    #[error("Row {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: RowId,
        from: RowStatus,
        to: RowStatus,
    },
    #[error("Row {0} is not pending or not visible and cannot be selected")]
    NotSelectable(RowId),
    #[error("Edited amount must be greater than zero, got {0}")]
    InvalidAmount(Money),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCounts {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub edited: usize,
}

impl ReviewCounts {
    fn tally<'a>(rows: impl Iterator<Item = &'a ReviewRow>) -> Self {
        let mut counts = ReviewCounts::default();
        for row in rows {
            counts.total += 1;
            match row.status {
                RowStatus::Pending => counts.pending += 1,
                RowStatus::Accepted => counts.accepted += 1,
                RowStatus::Rejected => counts.rejected += 1,
                RowStatus::Edited => counts.edited += 1,
            }
        }
        counts
    }

    /// Rows that a commit would write.
    pub fn committable(&self) -> usize {
        self.accepted + self.edited
    }
}

/// Review session over one batch. The selection is always a subset of the
/// pending rows visible under the current time filter.
#[derive(Debug, Clone)]
pub struct ReviewState {
    rows: Vec<ReviewRow>,
    selection: HashSet<RowId>,
    filter: TimeWindow,
}

impl ReviewState {
    /// `today` decides the default year filter: the batch's only year, else
    /// today's year when the batch has rows in it, else no filter.
    pub fn new(rows: Vec<ReviewRow>, today: NaiveDate) -> Self {
        let mut seen = HashSet::new();
        let rows: Vec<ReviewRow> = rows.into_iter().filter(|r| seen.insert(r.id)).collect();

        let years: BTreeSet<i32> = rows.iter().map(|r| r.candidate.year()).collect();
        let filter = if years.len() == 1 {
            years.iter().next().map_or(TimeWindow::all(), |y| TimeWindow::year(*y))
        } else if years.contains(&today.year()) {
            TimeWindow::year(today.year())
        } else {
            TimeWindow::all()
        };
        debug!(rows = rows.len(), filter = %filter, "review batch opened");

        ReviewState {
            rows,
            selection: HashSet::new(),
            filter,
        }
    }

    pub fn from_rows(rows: Vec<ReviewRow>) -> Self {
        Self::new(rows, Local::now().date_naive())
    }

    pub fn rows(&self) -> &[ReviewRow] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&ReviewRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &ReviewRow> {
        let filter = self.filter;
        self.rows.iter().filter(move |r| filter.contains(r.candidate.timestamp()))
    }

    pub fn filter(&self) -> TimeWindow {
        self.filter
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // ── Single-row transitions ───────────────────────────────────────────────

    /// Accepting an already accepted or edited row changes nothing.
    pub fn accept(&mut self, id: RowId) -> Result<(), ReviewError> {
        let row = self.row_mut(id)?;
        match row.status {
            RowStatus::Pending => row.status = RowStatus::Accepted,
            RowStatus::Accepted | RowStatus::Edited => {}
            RowStatus::Rejected => {
                return Err(ReviewError::InvalidTransition {
                    id,
                    from: row.status,
                    to: RowStatus::Accepted,
                })
            }
        }
        self.selection.remove(&id);
        Ok(())
    }

    pub fn reject(&mut self, id: RowId) -> Result<(), ReviewError> {
        self.transition(id, RowStatus::Rejected)?;
        self.selection.remove(&id);
        Ok(())
    }

    pub fn save_edit(&mut self, id: RowId, overrides: RowOverrides) -> Result<(), ReviewError> {
        if let Some(amount) = overrides.amount.filter(|a| !a.is_positive()) {
            return Err(ReviewError::InvalidAmount(amount));
        }
        self.transition(id, RowStatus::Edited)?;
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.overrides = Some(overrides);
        }
        self.selection.remove(&id);
        Ok(())
    }

    fn transition(&mut self, id: RowId, to: RowStatus) -> Result<(), ReviewError> {
        let row = self.row_mut(id)?;
        if row.status != RowStatus::Pending {
            return Err(ReviewError::InvalidTransition {
                id,
                from: row.status,
                to,
            });
        }
        row.status = to;
        Ok(())
    }

    fn row_mut(&mut self, id: RowId) -> Result<&mut ReviewRow, ReviewError> {
        self.rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ReviewError::UnknownRow(id))
    }

    // ── Bulk transitions ─────────────────────────────────────────────────────

    /// Accepts every pending row in `ids`; others are skipped. Returns the
    /// number of rows changed and clears the selection.
    pub fn accept_many(&mut self, ids: &[RowId]) -> usize {
        self.apply_many(ids, RowStatus::Accepted)
    }

    pub fn reject_many(&mut self, ids: &[RowId]) -> usize {
        self.apply_many(ids, RowStatus::Rejected)
    }

    pub fn accept_selected(&mut self) -> usize {
        let ids = self.selected_ids();
        self.accept_many(&ids)
    }

    pub fn reject_selected(&mut self) -> usize {
        let ids = self.selected_ids();
        self.reject_many(&ids)
    }

    fn apply_many(&mut self, ids: &[RowId], to: RowStatus) -> usize {
        let targets: HashSet<RowId> = ids.iter().copied().collect();
        let mut changed = 0;
        for row in self.rows.iter_mut() {
            if row.status == RowStatus::Pending && targets.contains(&row.id) {
                row.status = to;
                changed += 1;
            }
        }
        self.selection.clear();
        debug!(requested = ids.len(), changed, to = %to, "bulk review action");
        changed
    }

    // ── Selection ────────────────────────────────────────────────────────────

    /// Selected ids in row order.
    pub fn selected_ids(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|r| self.selection.contains(&r.id))
            .map(|r| r.id)
            .collect()
    }

    pub fn is_selected(&self, id: RowId) -> bool {
        self.selection.contains(&id)
    }

    /// Returns whether the row is selected afterwards.
    pub fn toggle_selection(&mut self, id: RowId) -> Result<bool, ReviewError> {
        let row = self.row(id).ok_or(ReviewError::UnknownRow(id))?;
        if !self.is_selectable(row) {
            return Err(ReviewError::NotSelectable(id));
        }
        if self.selection.remove(&id) {
            Ok(false)
        } else {
            self.selection.insert(id);
            Ok(true)
        }
    }

    /// Selects every pending visible row; returns the selection size.
    pub fn select_all_visible(&mut self) -> usize {
        let ids: Vec<RowId> = self
            .rows
            .iter()
            .filter(|r| self.is_selectable(r))
            .map(|r| r.id)
            .collect();
        self.selection.extend(ids);
        self.selection.len()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    fn is_selectable(&self, row: &ReviewRow) -> bool {
        row.status == RowStatus::Pending && self.filter.contains(row.candidate.timestamp())
    }

    fn prune_selection(&mut self) {
        let keep: HashSet<RowId> = self
            .rows
            .iter()
            .filter(|r| self.selection.contains(&r.id) && self.is_selectable(r))
            .map(|r| r.id)
            .collect();
        self.selection = keep;
    }

    // ── Filtering ────────────────────────────────────────────────────────────

    /// Clears any month filter.
    pub fn set_year(&mut self, year: Option<i32>) {
        self.filter = year.map_or(TimeWindow::all(), TimeWindow::year);
        self.prune_selection();
    }

    /// Ignored while no year is selected.
    pub fn set_month(&mut self, month: Option<u32>) {
        let Some(year) = self.filter.year else {
            return;
        };
        self.filter = match month {
            Some(m) => TimeWindow::month(year, m),
            None => TimeWindow::year(year),
        };
        self.prune_selection();
    }

    /// Distinct years in the batch, ascending.
    pub fn available_years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.rows.iter().map(|r| r.candidate.year()).collect();
        years.into_iter().collect()
    }

    /// Distinct months with rows in `year`, ascending.
    pub fn months_in_year(&self, year: i32) -> Vec<u32> {
        let months: BTreeSet<u32> = self
            .rows
            .iter()
            .filter(|r| r.candidate.year() == year)
            .map(|r| r.candidate.month())
            .collect();
        months.into_iter().collect()
    }

    // ── Counts & lifecycle ───────────────────────────────────────────────────

    pub fn global_counts(&self) -> ReviewCounts {
        ReviewCounts::tally(self.rows.iter())
    }

    pub fn visible_counts(&self) -> ReviewCounts {
        ReviewCounts::tally(self.visible_rows())
    }

    /// Accepted and edited rows across the whole batch, in row order,
    /// regardless of the display filter.
    pub fn commit_candidates(&self) -> Vec<&ReviewRow> {
        self.rows
            .iter()
            .filter(|r| r.status.is_commit_eligible())
            .collect()
    }

    /// Abandons the batch; nothing is written.
    pub fn cancel(self) {
        debug!(rows = self.rows.len(), "review batch cancelled");
    }
}
