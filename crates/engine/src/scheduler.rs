use std::collections::{HashSet, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Where the scheduler stands within the current calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No universe snapshot for today yet.
    NewDay,
    Scanning,
    /// Every symbol of the pass has been dequeued; the next pop refills.
    Drained,
}

/// The day's universe snapshot and the queue still to be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanState {
    pub scan_date: NaiveDate,
    pub all_symbols: Vec<String>,
    pub remaining: VecDeque<String>,
}

impl ScanState {
    /// Snapshot `symbols` for `scan_date`. Duplicates are dropped, first
    /// occurrence wins.
    pub fn new(scan_date: NaiveDate, symbols: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let all_symbols: Vec<String> = symbols
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();
        Self {
            scan_date,
            remaining: all_symbols.iter().cloned().collect(),
            all_symbols,
        }
    }

    /// Pop up to `k` symbols off the front, refilling from the snapshot
    /// first when the queue is empty.
    pub fn next_chunk(&mut self, k: usize) -> Vec<String> {
        if self.remaining.is_empty() && !self.all_symbols.is_empty() {
            info!(
                symbols = self.all_symbols.len(),
                "Universe fully scanned, restarting pass"
            );
            self.remaining.extend(self.all_symbols.iter().cloned());
        }
        let take = k.min(self.remaining.len());
        self.remaining.drain(..take).collect()
    }

    /// Put `symbols` back at the front, keeping their order.
    pub fn requeue_front(&mut self, symbols: &[String]) {
        for symbol in symbols.iter().rev() {
            self.remaining.push_front(symbol.clone());
        }
    }
}

/// Resumable, chunked walk over the symbol universe.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    chunk_size: usize,
    state: Option<ScanState>,
}

impl ScanScheduler {
    /// `state` is typically whatever the store reloaded for today.
    pub fn new(chunk_size: usize, state: Option<ScanState>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            state,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn state(&self) -> Option<&ScanState> {
        self.state.as_ref()
    }

    pub fn phase(&self, today: NaiveDate) -> Phase {
        match &self.state {
            Some(state) if state.scan_date == today => {
                if state.remaining.is_empty() {
                    Phase::Drained
                } else {
                    Phase::Scanning
                }
            }
            _ => Phase::NewDay,
        }
    }

    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.phase(today) == Phase::NewDay
    }

    /// Start a new day with a fresh universe snapshot.
    pub fn reset(&mut self, today: NaiveDate, symbols: Vec<String>) {
        let state = ScanState::new(today, symbols);
        info!(date = %today, symbols = state.all_symbols.len(), "New scan day");
        self.state = Some(state);
    }

    /// Next chunk of at most `chunk_size` symbols. Empty only when there is
    /// no snapshot or the universe itself is empty.
    pub fn next_chunk(&mut self) -> Vec<String> {
        let k = self.chunk_size;
        self.state
            .as_mut()
            .map(|state| state.next_chunk(k))
            .unwrap_or_default()
    }

    pub fn requeue_front(&mut self, symbols: &[String]) {
        if let Some(state) = self.state.as_mut() {
            state.requeue_front(symbols);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn syms(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn three_symbols_in_chunks_of_two() {
        let mut scheduler = ScanScheduler::new(2, None);
        assert_eq!(scheduler.phase(day(4)), Phase::NewDay);
        scheduler.reset(day(4), syms(&["A", "B", "C"]));

        assert_eq!(scheduler.next_chunk(), syms(&["A", "B"]));
        assert_eq!(scheduler.state().unwrap().remaining, VecDeque::from(syms(&["C"])));

        assert_eq!(scheduler.next_chunk(), syms(&["C"]));
        assert!(scheduler.state().unwrap().remaining.is_empty());
        assert_eq!(scheduler.phase(day(4)), Phase::Drained);

        assert_eq!(scheduler.next_chunk(), syms(&["A", "B"]));
        assert_eq!(scheduler.phase(day(4)), Phase::Scanning);
    }

    #[test]
    fn refill_happens_only_after_every_symbol_is_dequeued() {
        let universe: Vec<String> = (0..23).map(|i| format!("S{i:02}")).collect();
        let k = 5;
        let mut scheduler = ScanScheduler::new(k, None);
        scheduler.reset(day(4), universe.clone());

        let mut seen = Vec::new();
        while seen.len() < universe.len() {
            let before = scheduler.state().unwrap().remaining.len();
            let chunk = scheduler.next_chunk();
            assert!(chunk.len() <= k);
            assert_eq!(scheduler.state().unwrap().remaining.len(), before - chunk.len());
            seen.extend(chunk);
        }
        assert_eq!(seen, universe);

        // Second pass resumes in the same relative order.
        let mut second = Vec::new();
        while second.len() < universe.len() {
            second.extend(scheduler.next_chunk());
        }
        assert_eq!(second, universe);
    }

    #[test]
    fn requeued_symbols_come_back_first_in_order() {
        let mut scheduler = ScanScheduler::new(3, None);
        scheduler.reset(day(4), syms(&["A", "B", "C", "D", "E"]));
        let chunk = scheduler.next_chunk();
        assert_eq!(chunk, syms(&["A", "B", "C"]));

        // Failed on B; B and C were never completed.
        scheduler.requeue_front(&chunk[1..]);
        assert_eq!(scheduler.next_chunk(), syms(&["B", "C", "D"]));
        assert_eq!(scheduler.next_chunk(), syms(&["E"]));
    }

    #[test]
    fn date_change_requires_reset() {
        let state = ScanState::new(day(4), syms(&["A"]));
        let scheduler = ScanScheduler::new(2, Some(state));
        assert!(!scheduler.needs_reset(day(4)));
        assert!(scheduler.needs_reset(day(5)));
    }

    #[test]
    fn duplicates_and_empty_universe() {
        let state = ScanState::new(day(4), syms(&["A", "B", "A"]));
        assert_eq!(state.all_symbols, syms(&["A", "B"]));

        let mut scheduler = ScanScheduler::new(2, None);
        assert!(scheduler.next_chunk().is_empty());
        scheduler.reset(day(4), Vec::new());
        assert!(scheduler.next_chunk().is_empty());
    }
}
