//! Track queue model
//!
//! Ordered playable items plus the current index, shuffle flag and repeat
//! mode. Shuffle and repeat only affect which index `next()`/`previous()`
//! select; stored order is never rearranged.
//!
//! Shuffle is a random walk over the indices not yet played in the current
//! cycle. The walk is recorded so `previous()` can retrace it, and a
//! `next()` after stepping back replays the recorded walk before drawing new
//! indices.

use playit_common::{RepeatMode, Track};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Shuffle cycle bookkeeping
#[derive(Debug, Default)]
struct ShuffleCycle {
    /// Indices in the order they were visited this cycle
    history: Vec<usize>,
    /// Position of the current index within `history`
    cursor: usize,
    /// Indices already visited this cycle
    played: HashSet<usize>,
}

impl ShuffleCycle {
    fn starting_at(index: Option<usize>) -> Self {
        let mut cycle = Self::default();
        if let Some(index) = index {
            cycle.history.push(index);
            cycle.played.insert(index);
        }
        cycle
    }

    /// Record a jump: forward history past the cursor is discarded
    fn record(&mut self, index: usize) {
        if !self.history.is_empty() {
            self.history.truncate(self.cursor + 1);
        }
        self.history.push(index);
        self.cursor = self.history.len() - 1;
        self.played.insert(index);
    }

    fn can_replay_forward(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    fn unplayed(&self, len: usize) -> Vec<usize> {
        (0..len).filter(|i| !self.played.contains(i)).collect()
    }
}

/// Play queue with current index, shuffle and repeat state
pub struct TrackQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
    shuffle_enabled: bool,
    repeat_mode: RepeatMode,
    cycle: ShuffleCycle,
    rng: StdRng,
}

impl std::fmt::Debug for TrackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackQueue")
            .field("len", &self.tracks.len())
            .field("current", &self.current)
            .field("shuffle_enabled", &self.shuffle_enabled)
            .field("repeat_mode", &self.repeat_mode)
            .finish()
    }
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty queue with a deterministic shuffle sequence
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::Off,
            cycle: ShuffleCycle::default(),
            rng,
        }
    }

    /// Replace the queue contents.
    ///
    /// Duplicate ids are dropped (first occurrence wins). An out-of-range
    /// `start_index` clamps to 0; an empty input leaves no current index.
    /// Shuffle and repeat settings carry over; the shuffle cycle restarts.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize) {
        let mut seen = HashSet::new();
        let offered = tracks.len();
        let deduped: Vec<Track> = tracks
            .into_iter()
            .filter(|track| seen.insert(track.id.clone()))
            .collect();

        if deduped.len() != offered {
            warn!(
                "Dropped {} duplicate track(s) from queue",
                offered - deduped.len()
            );
        }

        self.tracks = deduped;
        self.current = if self.tracks.is_empty() {
            None
        } else if start_index < self.tracks.len() {
            Some(start_index)
        } else {
            Some(0)
        };
        self.cycle = ShuffleCycle::starting_at(self.current);

        debug!(
            "Queue set: {} tracks, current={:?}",
            self.tracks.len(),
            self.current
        );
    }

    /// Remove all tracks
    pub fn clear(&mut self) {
        self.set_queue(Vec::new(), 0);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Index of the track with `id`, if queued
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Enable or disable shuffle. The current index never changes.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.shuffle_enabled == enabled {
            return;
        }
        self.shuffle_enabled = enabled;
        self.cycle = ShuffleCycle::starting_at(self.current);
    }

    /// Flip shuffle; returns the new flag
    pub fn toggle_shuffle(&mut self) -> bool {
        self.set_shuffle(!self.shuffle_enabled);
        self.shuffle_enabled
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Flip between repeat-one and repeat-off; returns the new mode
    pub fn toggle_repeat_one(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.toggled_one();
        self.repeat_mode
    }

    /// Jump to `index`. Returns false (and changes nothing) when invalid.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current = Some(index);
        if self.shuffle_enabled {
            self.cycle.record(index);
        }
        true
    }

    /// Whether `next()` would yield an index
    pub fn has_next(&self) -> bool {
        let Some(current) = self.current else {
            return false;
        };

        match self.repeat_mode {
            RepeatMode::One => true,
            RepeatMode::All => true,
            RepeatMode::Off if self.shuffle_enabled => {
                self.cycle.can_replay_forward()
                    || !self.cycle.unplayed(self.tracks.len()).is_empty()
            }
            RepeatMode::Off => current + 1 < self.tracks.len(),
        }
    }

    /// Whether `previous()` would yield an index
    pub fn has_previous(&self) -> bool {
        let Some(current) = self.current else {
            return false;
        };

        match self.repeat_mode {
            RepeatMode::One => true,
            _ if self.shuffle_enabled => self.cycle.cursor > 0,
            RepeatMode::All => true,
            RepeatMode::Off => current > 0,
        }
    }

    /// Move to and return the next index, or `None` when no move exists
    pub fn next(&mut self) -> Option<usize> {
        let current = self.current?;

        let next = match self.repeat_mode {
            RepeatMode::One => Some(current),
            _ if self.shuffle_enabled => self.next_shuffled(),
            RepeatMode::All => Some((current + 1) % self.tracks.len()),
            RepeatMode::Off => Some(current + 1).filter(|&i| i < self.tracks.len()),
        }?;

        self.current = Some(next);
        Some(next)
    }

    /// Move to and return the previous index, or `None` when no move exists
    pub fn previous(&mut self) -> Option<usize> {
        let current = self.current?;

        let previous = match self.repeat_mode {
            RepeatMode::One => Some(current),
            _ if self.shuffle_enabled => {
                if self.cycle.cursor == 0 {
                    None
                } else {
                    self.cycle.cursor -= 1;
                    Some(self.cycle.history[self.cycle.cursor])
                }
            }
            RepeatMode::All => Some(current.checked_sub(1).unwrap_or(self.tracks.len() - 1)),
            RepeatMode::Off => current.checked_sub(1),
        }?;

        self.current = Some(previous);
        Some(previous)
    }

    fn next_shuffled(&mut self) -> Option<usize> {
        if self.cycle.can_replay_forward() {
            self.cycle.cursor += 1;
            return Some(self.cycle.history[self.cycle.cursor]);
        }

        let unplayed = self.cycle.unplayed(self.tracks.len());
        if let Some(&pick) = unplayed.choose(&mut self.rng) {
            self.cycle.record(pick);
            return Some(pick);
        }

        if self.repeat_mode != RepeatMode::All {
            debug!("Shuffle cycle exhausted");
            return None;
        }

        // Fresh cycle; avoid replaying the track that just finished when
        // there is anything else to choose from
        let current = self.current;
        self.cycle = ShuffleCycle::starting_at(current);
        let candidates: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| self.tracks.len() == 1 || Some(i) != current)
            .collect();
        let pick = *candidates.choose(&mut self.rng)?;
        if Some(pick) == current {
            return Some(pick);
        }
        self.cycle.record(pick);
        Some(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::new(format!("t{}", i), format!("Title {}", i), "Artist"))
            .collect()
    }

    fn queue(n: usize, start: usize) -> TrackQueue {
        let mut queue = TrackQueue::with_seed(7);
        queue.set_queue(tracks(n), start);
        queue
    }

    #[test]
    fn test_set_queue_drops_duplicates_first_wins() {
        let mut list = tracks(3);
        let mut dup = Track::new("t1", "Other title", "Other artist");
        dup.is_favorite = true;
        list.push(dup);

        let mut queue = TrackQueue::new();
        queue.set_queue(list, 0);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get(1).unwrap().title, "Title 1");
    }

    #[test]
    fn test_set_queue_clamps_start_index() {
        let queue = queue(3, 10);
        assert_eq!(queue.current_index(), Some(0));

        let queue = self::queue(3, 2);
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_empty_queue_has_no_current_and_no_moves() {
        let mut queue = queue(0, 3);
        assert_eq!(queue.current_index(), None);
        assert!(queue.current_track().is_none());
        assert!(!queue.has_next());
        assert!(!queue.has_previous());
        assert_eq!(queue.next(), None);
        assert_eq!(queue.previous(), None);
    }

    #[test]
    fn test_sequential_next_stops_at_end() {
        let mut queue = queue(3, 1);
        assert!(queue.has_next());
        assert_eq!(queue.next(), Some(2));
        assert!(!queue.has_next());
        assert_eq!(queue.next(), None);
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_sequential_previous_stops_at_start() {
        let mut queue = queue(3, 1);
        assert_eq!(queue.previous(), Some(0));
        assert!(!queue.has_previous());
        assert_eq!(queue.previous(), None);
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_repeat_one_replays_current() {
        let mut queue = queue(3, 2);
        queue.set_repeat_mode(RepeatMode::One);
        assert_eq!(queue.next(), Some(2));
        assert_eq!(queue.previous(), Some(2));
        assert!(queue.has_next());
    }

    #[test]
    fn test_repeat_all_wraps_both_ways() {
        let mut queue = queue(3, 2);
        queue.set_repeat_mode(RepeatMode::All);
        assert_eq!(queue.next(), Some(0));
        assert_eq!(queue.previous(), Some(2));
    }

    #[test]
    fn test_toggle_repeat_one() {
        let mut queue = queue(2, 0);
        assert_eq!(queue.toggle_repeat_one(), RepeatMode::One);
        assert_eq!(queue.toggle_repeat_one(), RepeatMode::Off);

        queue.set_repeat_mode(RepeatMode::All);
        assert_eq!(queue.toggle_repeat_one(), RepeatMode::One);
    }

    #[test]
    fn test_set_current_rejects_invalid_index() {
        let mut queue = queue(3, 0);
        assert!(!queue.set_current(3));
        assert_eq!(queue.current_index(), Some(0));
        assert!(queue.set_current(2));
        assert_eq!(queue.current_track().unwrap().id, "t2");
    }

    #[test]
    fn test_toggling_modes_keeps_current_index() {
        let mut queue = queue(5, 3);
        queue.toggle_shuffle();
        assert_eq!(queue.current_index(), Some(3));
        queue.toggle_repeat_one();
        assert_eq!(queue.current_index(), Some(3));
        queue.toggle_shuffle();
        assert_eq!(queue.current_index(), Some(3));
    }

    #[test]
    fn test_shuffle_double_toggle_restores_sequential_order() {
        let mut queue = queue(4, 1);
        assert!(queue.toggle_shuffle());
        assert!(!queue.toggle_shuffle());

        assert_eq!(queue.next(), Some(2));
        assert_eq!(queue.next(), Some(3));
        let ids: Vec<&str> = queue.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3"]);
    }

    #[test]
    fn test_shuffle_visits_every_index_once_per_cycle() {
        let mut queue = queue(6, 0);
        queue.set_shuffle(true);

        let mut visited = vec![0];
        while let Some(index) = queue.next() {
            visited.push(index);
        }

        visited.sort_unstable();
        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);
        assert!(!queue.has_next());
    }

    #[test]
    fn test_shuffle_previous_walks_back_through_history() {
        let mut queue = queue(6, 0);
        queue.set_shuffle(true);

        let first = queue.next().unwrap();
        let second = queue.next().unwrap();

        assert_eq!(queue.previous(), Some(first));
        assert_eq!(queue.previous(), Some(0));
        assert_eq!(queue.previous(), None);

        // Walking forward again replays the same order
        assert_eq!(queue.next(), Some(first));
        assert_eq!(queue.next(), Some(second));
    }

    #[test]
    fn test_shuffle_repeat_all_starts_new_cycle() {
        let mut queue = queue(3, 0);
        queue.set_shuffle(true);
        queue.set_repeat_mode(RepeatMode::All);

        queue.next().unwrap();
        let last = queue.next().unwrap();
        let restarted = queue.next().unwrap();

        assert_ne!(restarted, last);
        assert!(queue.has_next());
    }

    #[test]
    fn test_shuffle_repeat_all_single_track() {
        let mut queue = queue(1, 0);
        queue.set_shuffle(true);
        queue.set_repeat_mode(RepeatMode::All);
        assert_eq!(queue.next(), Some(0));
        assert_eq!(queue.next(), Some(0));
    }

    #[test]
    fn test_position_of() {
        let queue = queue(3, 0);
        assert_eq!(queue.position_of("t2"), Some(2));
        assert_eq!(queue.position_of("missing"), None);
    }
}
