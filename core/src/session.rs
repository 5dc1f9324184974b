use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

use crate::*;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Memorizing,
    Countdown,
    Playing,
    Success,
    Failed,
}

impl Phase {
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    pub const fn is_running(self) -> bool {
        matches!(self, Self::Memorizing | Self::Countdown | Self::Playing)
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Delays driving the phase transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    pub memorize: Duration,
    pub countdown_ticks: u8,
    pub countdown_tick: Duration,
    pub hide: Duration,
    pub budget: Duration,
    pub poll: Duration,
    pub miss_revert: Duration,
}

impl Timings {
    pub const fn standard() -> Self {
        Self {
            memorize: Duration::from_millis(2000),
            countdown_ticks: 5,
            countdown_tick: Duration::from_millis(1000),
            hide: Duration::from_millis(1000),
            budget: Duration::from_millis(60_000),
            poll: Duration::from_millis(100),
            miss_revert: Duration::from_millis(1000),
        }
    }

    /// Time between `start` and the beginning of the playing phase.
    pub fn lead_in(&self) -> Duration {
        self.memorize + self.countdown_tick * u32::from(self.countdown_ticks) + self.hide
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::standard()
    }
}

/// Handle of a scheduled timer. Tokens are never reused within a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    MemorizeDone,
    CountdownTick,
    HideDone,
    Poll,
    RevertMiss(Coord2),
}

impl TimerKind {
    /// Phase timers are cancelled whenever their phase is left, revert timers only on reset.
    const fn is_phase_timer(self) -> bool {
        !matches!(self, Self::RevertMiss(_))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingTimer {
    pub kind: TimerKind,
    pub due: Instant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Countdown {
    Remaining(u8),
    Hide,
}

/// What the player should see for a cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellView {
    Hidden,
    Shown,
    Found,
    Missed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Cell(Coord2),
    Word(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Cell(Coord2),
    Word(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InteractionOutcome {
    Ignored,
    Found,
    Missed,
    Completed,
    TimedOut,
}

impl InteractionOutcome {
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

enum Guess {
    Repeat,
    Hit(Target),
    Miss,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub duration: Duration,
    pub found: usize,
    pub target_count: usize,
    pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Started { puzzle_id: String, difficulty: u8 },
    Completed(RunSummary),
    Failed(RunSummary),
    Repeated,
}

/// The single game session of a page: phases, timers and the per-cell state of one run.
///
/// Time never advances on its own. The driver fires the timers listed by
/// [`Session::pending_timers`] (or calls [`Session::advance_to`]) and passes the current instant
/// to every interaction.
#[derive(Clone, Debug)]
pub struct Session {
    variant: Variant,
    timings: Timings,
    phase: Phase,
    puzzle: Option<PuzzleInstance>,
    started_at: Option<Instant>,
    revealed: Array2<bool>,
    missed: BTreeSet<Coord2>,
    found: Vec<Target>,
    attempts: u32,
    completion: Option<Duration>,
    countdown: Option<Countdown>,
    time_left: Duration,
    timers: BTreeMap<TimerToken, PendingTimer>,
    next_token: u64,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(variant: Variant, timings: Timings) -> Self {
        Self {
            variant,
            timings,
            phase: Phase::Idle,
            puzzle: None,
            started_at: None,
            revealed: Array2::default((0, 0)),
            missed: BTreeSet::new(),
            found: Vec::new(),
            attempts: 0,
            completion: None,
            countdown: None,
            time_left: timings.budget,
            timers: BTreeMap::new(),
            next_token: 0,
            events: Vec::new(),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn puzzle(&self) -> Option<&PuzzleInstance> {
        self.puzzle.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts
    }

    pub fn found_targets(&self) -> &[Target] {
        &self.found
    }

    pub fn target_count(&self) -> usize {
        self.puzzle.as_ref().map_or(0, PuzzleInstance::target_count)
    }

    pub fn completion_duration(&self) -> Option<Duration> {
        self.completion
    }

    pub fn countdown(&self) -> Option<Countdown> {
        self.countdown
    }

    /// Remaining budget as of the last poll tick, never negative.
    pub fn time_left(&self) -> Duration {
        self.time_left
    }

    pub fn is_revealed(&self, coords: Coord2) -> bool {
        self.revealed
            .get(coords.to_nd_index())
            .copied()
            .unwrap_or(false)
    }

    pub fn cell_view(&self, coords: Coord2) -> CellView {
        let Some(puzzle) = &self.puzzle else {
            return CellView::Hidden;
        };

        // letters stay readable for the whole run, only grids are played from memory
        if matches!(puzzle.layout(), Layout::Letters) {
            return CellView::Shown;
        }

        match self.phase {
            Phase::Idle => CellView::Hidden,
            Phase::Memorizing | Phase::Countdown => CellView::Shown,
            Phase::Playing | Phase::Success | Phase::Failed => {
                if self.found.contains(&Target::Cell(coords)) {
                    CellView::Found
                } else if self.missed.contains(&coords) {
                    CellView::Missed
                } else if self.phase.is_finished() && puzzle.is_target_cell(coords) {
                    CellView::Shown
                } else {
                    CellView::Hidden
                }
            }
        }
    }

    pub fn pending_timers(&self) -> impl Iterator<Item = (TimerToken, PendingTimer)> + '_ {
        self.timers.iter().map(|(&token, &timer)| (token, timer))
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn next_due(&self) -> Option<(TimerToken, Instant)> {
        self.timers
            .iter()
            .min_by_key(|&(&token, timer)| (timer.due, token))
            .map(|(&token, timer)| (token, timer.due))
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        core::mem::take(&mut self.events)
    }

    /// `Idle -> Memorizing` with a freshly materialized puzzle.
    pub fn start(&mut self, puzzle: PuzzleInstance, now: Instant) -> Result<()> {
        match self.phase {
            Phase::Idle => {}
            phase if phase.is_running() => return Err(GameError::SessionActive),
            _ => return Err(GameError::AlreadyEnded),
        }

        log::debug!("session start: variant {} puzzle {}", self.variant, puzzle.id());
        self.events.push(SessionEvent::Started {
            puzzle_id: puzzle.id().to_string(),
            difficulty: puzzle.difficulty(),
        });
        self.revealed = Array2::default(puzzle.size().to_nd_index());
        self.puzzle = Some(puzzle);
        self.missed.clear();
        self.found.clear();
        self.attempts = 0;
        self.completion = None;
        self.started_at = None;
        self.time_left = self.timings.budget;
        self.phase = Phase::Memorizing;
        self.schedule(TimerKind::MemorizeDone, now + self.timings.memorize);
        Ok(())
    }

    /// Fires a scheduled timer. Unknown or cancelled tokens are ignored.
    pub fn fire(&mut self, token: TimerToken, now: Instant) -> bool {
        let Some(timer) = self.timers.remove(&token) else {
            log::trace!("ignoring stale timer {:?}", token);
            return false;
        };

        match (timer.kind, self.phase) {
            (TimerKind::MemorizeDone, Phase::Memorizing) => {
                self.phase = Phase::Countdown;
                self.countdown_step(self.timings.countdown_ticks, now);
                true
            }
            (TimerKind::CountdownTick, Phase::Countdown) => {
                let remaining = match self.countdown {
                    Some(Countdown::Remaining(remaining)) => remaining.saturating_sub(1),
                    _ => 0,
                };
                self.countdown_step(remaining, now);
                true
            }
            (TimerKind::HideDone, Phase::Countdown) => {
                self.enter_playing(now);
                true
            }
            (TimerKind::Poll, Phase::Playing) => {
                if !self.check_timeout(now) {
                    self.time_left = self.timings.budget.saturating_sub(self.elapsed(now));
                    self.schedule(TimerKind::Poll, now + self.timings.poll);
                }
                true
            }
            (TimerKind::RevertMiss(coords), _) => {
                if self.missed.remove(&coords) {
                    if let Some(cell) = self.revealed.get_mut(coords.to_nd_index()) {
                        *cell = false;
                    }
                    true
                } else {
                    false
                }
            }
            (kind, phase) => {
                log::warn!("timer {:?} fired in unexpected phase {:?}", kind, phase);
                false
            }
        }
    }

    /// Fires every timer due at or before `now`, in due order, each at its own due instant.
    pub fn advance_to(&mut self, now: Instant) -> bool {
        let mut updated = false;
        while let Some((token, due)) = self.next_due() {
            if due > now {
                break;
            }
            updated |= self.fire(token, due);
        }
        updated
    }

    pub fn interact(&mut self, interaction: Interaction, now: Instant) -> Result<InteractionOutcome> {
        if !matches!(self.phase, Phase::Playing) {
            return Err(GameError::NotPlaying);
        }

        if self.check_timeout(now) {
            return Ok(InteractionOutcome::TimedOut);
        }

        let layout = self
            .puzzle
            .as_ref()
            .map(PuzzleInstance::layout)
            .ok_or(GameError::NotPlaying)?;

        let guess = match (interaction, layout) {
            (Interaction::Cell(coords), Layout::Grid { .. }) => self.reveal_cell(coords, now)?,
            (Interaction::Word(word), Layout::Letters) => self.guess_word(&word),
            _ => return Err(GameError::UnsupportedInteraction),
        };

        let target = match guess {
            Guess::Repeat => return Ok(InteractionOutcome::Ignored),
            Guess::Miss => {
                log::debug!("miss, attempts: {}", self.attempts);
                return Ok(InteractionOutcome::Missed);
            }
            Guess::Hit(target) => target,
        };

        self.found.push(target);
        log::debug!("found {}/{}", self.found.len(), self.target_count());

        if self.found.len() >= self.target_count() {
            let duration = self.elapsed(now);
            self.finish(Phase::Success, duration);
            Ok(InteractionOutcome::Completed)
        } else {
            Ok(InteractionOutcome::Found)
        }
    }

    /// `Success | Failed -> Idle`. Drops the puzzle and cancels every pending timer.
    pub fn reset(&mut self, repeat: bool) -> Result<()> {
        if self.phase.is_running() {
            return Err(GameError::SessionActive);
        }

        log::debug!("session reset (repeat: {})", repeat);
        let events = core::mem::take(&mut self.events);
        *self = Self {
            next_token: self.next_token,
            events,
            ..Self::new(self.variant, self.timings)
        };
        if repeat {
            self.events.push(SessionEvent::Repeated);
        }
        Ok(())
    }

    fn reveal_cell(&mut self, coords: Coord2, now: Instant) -> Result<Guess> {
        let (coords, is_target) = {
            let puzzle = self.puzzle.as_ref().ok_or(GameError::NotPlaying)?;
            let coords = puzzle.validate_coords(coords)?;
            (coords, puzzle.is_target_cell(coords))
        };

        if self.revealed[coords.to_nd_index()] {
            return Ok(Guess::Repeat);
        }
        self.attempts = self.attempts.saturating_add(1);
        self.revealed[coords.to_nd_index()] = true;

        if is_target {
            Ok(Guess::Hit(Target::Cell(coords)))
        } else {
            self.missed.insert(coords);
            self.schedule(TimerKind::RevertMiss(coords), now + self.timings.miss_revert);
            Ok(Guess::Miss)
        }
    }

    fn guess_word(&mut self, word: &str) -> Guess {
        let word = normalize_word(word);
        if word.is_empty() || self.found.contains(&Target::Word(word.clone())) {
            return Guess::Repeat;
        }
        self.attempts = self.attempts.saturating_add(1);

        match self.puzzle.as_ref().and_then(|puzzle| puzzle.target_word(&word)) {
            Some(word) => Guess::Hit(Target::Word(word)),
            None => Guess::Miss,
        }
    }

    fn countdown_step(&mut self, remaining: u8, now: Instant) {
        if remaining > 0 {
            self.countdown = Some(Countdown::Remaining(remaining));
            self.schedule(TimerKind::CountdownTick, now + self.timings.countdown_tick);
        } else {
            self.countdown = Some(Countdown::Hide);
            self.schedule(TimerKind::HideDone, now + self.timings.hide);
        }
    }

    fn enter_playing(&mut self, now: Instant) {
        self.cancel_phase_timers();
        self.phase = Phase::Playing;
        self.countdown = None;
        self.started_at = Some(now);
        self.revealed.fill(false);
        self.missed.clear();
        self.time_left = self.timings.budget;
        self.schedule(TimerKind::Poll, now + self.timings.poll);
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |started_at| now.saturating_duration_since(started_at))
    }

    fn check_timeout(&mut self, now: Instant) -> bool {
        if matches!(self.phase, Phase::Playing) && self.elapsed(now) >= self.timings.budget {
            self.finish(Phase::Failed, self.timings.budget);
            true
        } else {
            false
        }
    }

    fn finish(&mut self, phase: Phase, duration: Duration) {
        if self.phase.is_finished() {
            return;
        }

        self.cancel_phase_timers();
        self.phase = phase;
        self.completion = Some(duration);
        self.time_left = self.timings.budget.saturating_sub(duration);

        let summary = RunSummary {
            duration,
            found: self.found.len(),
            target_count: self.target_count(),
            attempts: self.attempts,
        };
        log::debug!("session finished: {:?} {:?}", phase, summary);
        self.events.push(match phase {
            Phase::Success => SessionEvent::Completed(summary),
            _ => SessionEvent::Failed(summary),
        });
    }

    fn schedule(&mut self, kind: TimerKind, due: Instant) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.timers.insert(token, PendingTimer { kind, due });
        token
    }

    fn cancel_phase_timers(&mut self) {
        self.timers.retain(|_, timer| !timer.kind.is_phase_timer());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn grid_puzzle() -> PuzzleInstance {
        PuzzleDefinition::grid(
            "T1",
            (5, 5),
            &[(0, 1), (2, 3), (4, 0), (1, 4)],
            &["a", "b", "c"],
            3,
            4,
        )
        .unwrap()
        .materialize(&mut SmallRng::seed_from_u64(0))
        .unwrap()
    }

    fn word_puzzle() -> PuzzleInstance {
        PuzzleDefinition::letters("W1", &["C", "O", "D", "E", "R", "U", "N", "S"], &["CODE", "RUNS"], 3, 2)
            .unwrap()
            .materialize(&mut SmallRng::seed_from_u64(0))
            .unwrap()
    }

    /// Starts a grid session and runs it up to the first instant of `Playing`.
    fn playing(t0: Instant) -> (Session, Instant) {
        let mut session = Session::new(Variant::A, Timings::standard());
        session.start(grid_puzzle(), t0).unwrap();
        let play_start = t0 + Timings::standard().lead_in();
        session.advance_to(play_start);
        (session, play_start)
    }

    #[test]
    fn phases_follow_memorize_countdown_hide() {
        let t0 = Instant::now();
        let mut session = Session::new(Variant::A, Timings::standard());
        session.start(grid_puzzle(), t0).unwrap();
        assert_eq!(session.phase(), Phase::Memorizing);
        assert_eq!(session.cell_view((0, 0)), CellView::Shown);

        session.advance_to(t0 + ms(1999));
        assert_eq!(session.phase(), Phase::Memorizing);

        session.advance_to(t0 + ms(2000));
        assert_eq!(session.phase(), Phase::Countdown);
        assert_eq!(session.countdown(), Some(Countdown::Remaining(5)));

        session.advance_to(t0 + ms(3000));
        assert_eq!(session.countdown(), Some(Countdown::Remaining(4)));

        session.advance_to(t0 + ms(7000));
        assert_eq!(session.countdown(), Some(Countdown::Hide));
        assert_eq!(session.phase(), Phase::Countdown);

        session.advance_to(t0 + ms(8000));
        assert_eq!(session.phase(), Phase::Playing);
        assert_eq!(session.countdown(), None);
        assert_eq!(session.started_at(), Some(t0 + ms(8000)));
        assert_eq!(session.cell_view((0, 1)), CellView::Hidden);
    }

    #[test]
    fn interactions_are_rejected_outside_playing() {
        let t0 = Instant::now();
        let mut session = Session::new(Variant::A, Timings::standard());
        assert_eq!(
            session.interact(Interaction::Cell((0, 1)), t0),
            Err(GameError::NotPlaying)
        );

        session.start(grid_puzzle(), t0).unwrap();
        assert_eq!(
            session.interact(Interaction::Cell((0, 1)), t0 + ms(10)),
            Err(GameError::NotPlaying)
        );
        assert_eq!(session.attempt_count(), 0);
    }

    #[test]
    fn start_is_only_valid_from_idle() {
        let t0 = Instant::now();
        let (mut session, _) = playing(t0);
        assert_eq!(session.start(grid_puzzle(), t0), Err(GameError::SessionActive));
    }

    #[test]
    fn finding_every_target_succeeds() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);

        let targets = [(0, 1), (2, 3), (4, 0), (1, 4)];
        for (i, &coords) in targets.iter().enumerate() {
            let now = start + ms(1000 * (i as u64 + 1));
            let outcome = session.interact(Interaction::Cell(coords), now).unwrap();
            if i + 1 < targets.len() {
                assert_eq!(outcome, InteractionOutcome::Found);
            } else {
                assert_eq!(outcome, InteractionOutcome::Completed);
            }
        }

        assert_eq!(session.phase(), Phase::Success);
        assert_eq!(session.attempt_count(), 4);
        assert_eq!(session.completion_duration(), Some(ms(4000)));
        assert_eq!(session.found_targets().len(), 4);
        assert!(!session.pending_timers().any(|(_, t)| t.kind == TimerKind::Poll));
    }

    #[test]
    fn revealed_cell_is_ignored() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);

        session.interact(Interaction::Cell((0, 1)), start + ms(10)).unwrap();
        let outcome = session.interact(Interaction::Cell((0, 1)), start + ms(20)).unwrap();

        assert_eq!(outcome, InteractionOutcome::Ignored);
        assert_eq!(session.attempt_count(), 1);
        assert_eq!(session.found_targets().len(), 1);
    }

    #[test]
    fn miss_reverts_after_delay_without_touching_counters() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);

        let outcome = session.interact(Interaction::Cell((0, 0)), start + ms(100)).unwrap();
        assert_eq!(outcome, InteractionOutcome::Missed);
        assert_eq!(session.cell_view((0, 0)), CellView::Missed);
        assert!(session.is_revealed((0, 0)));

        // clicking the miss again before it flips back is a no-op
        let again = session.interact(Interaction::Cell((0, 0)), start + ms(500)).unwrap();
        assert_eq!(again, InteractionOutcome::Ignored);

        session.advance_to(start + ms(1100));
        assert_eq!(session.cell_view((0, 0)), CellView::Hidden);
        assert!(!session.is_revealed((0, 0)));
        assert_eq!(session.attempt_count(), 1);
        assert!(session.found_targets().is_empty());

        let retry = session.interact(Interaction::Cell((0, 0)), start + ms(1200)).unwrap();
        assert_eq!(retry, InteractionOutcome::Missed);
        assert_eq!(session.attempt_count(), 2);
    }

    #[test]
    fn budget_elapsing_fails_with_partial_progress() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);

        session.interact(Interaction::Cell((0, 1)), start + ms(1000)).unwrap();
        session.interact(Interaction::Cell((2, 3)), start + ms(2000)).unwrap();

        session.advance_to(start + ms(59_950));
        assert_eq!(session.phase(), Phase::Playing);
        assert!(session.time_left() > Duration::ZERO);

        session.advance_to(start + ms(60_000));
        assert_eq!(session.phase(), Phase::Failed);
        assert_eq!(session.found_targets().len(), 2);
        assert_eq!(session.completion_duration(), Some(ms(60_000)));
        assert_eq!(session.time_left(), Duration::ZERO);
        assert!(!session.has_pending_timers());
    }

    #[test]
    fn late_interaction_applies_timeout_first() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);
        for coords in [(0, 1), (2, 3), (4, 0)] {
            session.interact(Interaction::Cell(coords), start + ms(10)).unwrap();
        }

        let outcome = session.interact(Interaction::Cell((1, 4)), start + ms(60_020)).unwrap();

        assert_eq!(outcome, InteractionOutcome::TimedOut);
        assert_eq!(session.phase(), Phase::Failed);
        assert_eq!(session.completion_duration(), Some(ms(60_000)));
        assert_eq!(session.found_targets().len(), 3);
    }

    #[test]
    fn found_targets_never_decrease_or_exceed_count() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);
        let mut previous = 0;

        for (i, coords) in iter_coords((5, 5)).enumerate() {
            let now = start + ms(50 * i as u64);
            session.advance_to(now);
            let _ = session.interact(Interaction::Cell(coords), now);
            let found = session.found_targets().len();
            assert!(found >= previous);
            assert!(found <= session.target_count());
            previous = found;
        }
        assert_eq!(session.phase(), Phase::Success);
    }

    #[test]
    fn reset_returns_to_idle_without_timers() {
        let t0 = Instant::now();
        let (mut failed, start) = playing(t0);
        failed.interact(Interaction::Cell((0, 1)), start + ms(10)).unwrap();
        failed.advance_to(start + ms(60_000));
        assert_eq!(failed.phase(), Phase::Failed);

        // a miss right before the winning click leaves its revert timer pending
        let (mut won, start) = playing(t0);
        won.interact(Interaction::Cell((0, 0)), start + ms(10)).unwrap();
        for coords in [(0, 1), (2, 3), (4, 0), (1, 4)] {
            won.interact(Interaction::Cell(coords), start + ms(20)).unwrap();
        }
        assert_eq!(won.phase(), Phase::Success);
        assert!(won.has_pending_timers());

        for session in [&mut failed, &mut won] {
            session.reset(true).unwrap();
            assert_eq!(session.phase(), Phase::Idle);
            assert!(session.found_targets().is_empty());
            assert_eq!(session.attempt_count(), 0);
            assert!(session.puzzle().is_none());
            assert!(!session.has_pending_timers());
            assert_eq!(session.completion_duration(), None);
            assert_eq!(session.drain_events().last(), Some(&SessionEvent::Repeated));
        }
    }

    #[test]
    fn reset_mid_run_is_rejected() {
        let t0 = Instant::now();
        let (mut session, _) = playing(t0);
        assert_eq!(session.reset(false), Err(GameError::SessionActive));
        assert_eq!(session.phase(), Phase::Playing);
    }

    #[test]
    fn stale_tokens_are_ignored_after_reset() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);
        session.interact(Interaction::Cell((0, 0)), start).unwrap();
        for coords in [(0, 1), (2, 3), (4, 0), (1, 4)] {
            session.interact(Interaction::Cell(coords), start).unwrap();
        }
        let stale: Vec<_> = session.pending_timers().map(|(token, _)| token).collect();
        assert_eq!(stale.len(), 1);

        session.reset(false).unwrap();
        for token in stale {
            assert!(!session.fire(token, start + ms(5000)));
        }
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_revealed((0, 0)));
    }

    #[test]
    fn events_track_the_run() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);
        session.advance_to(start + ms(60_000));

        let events = session.drain_events();
        assert_eq!(
            events,
            vec![
                SessionEvent::Started {
                    puzzle_id: "T1".to_string(),
                    difficulty: 3,
                },
                SessionEvent::Failed(RunSummary {
                    duration: ms(60_000),
                    found: 0,
                    target_count: 4,
                    attempts: 0,
                }),
            ]
        );
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn word_puzzles_accept_word_guesses() {
        let t0 = Instant::now();
        let mut session = Session::new(Variant::A, Timings::standard());
        session.start(word_puzzle(), t0).unwrap();
        let start = t0 + Timings::standard().lead_in();
        session.advance_to(start);

        assert_eq!(
            session.interact(Interaction::Cell((0, 0)), start),
            Err(GameError::UnsupportedInteraction)
        );
        let miss = session.interact(Interaction::Word("DOCE".to_string()), start + ms(10));
        assert_eq!(miss, Ok(InteractionOutcome::Missed));
        let hit = session.interact(Interaction::Word("code".to_string()), start + ms(20));
        assert_eq!(hit, Ok(InteractionOutcome::Found));
        let dup = session.interact(Interaction::Word("CODE".to_string()), start + ms(30));
        assert_eq!(dup, Ok(InteractionOutcome::Ignored));
        let last = session.interact(Interaction::Word("runs".to_string()), start + ms(40));
        assert_eq!(last, Ok(InteractionOutcome::Completed));

        assert_eq!(session.attempt_count(), 3);
        assert_eq!(session.completion_duration(), Some(ms(40)));
        assert_eq!(session.cell_view((0, 0)), CellView::Shown);
    }

    #[test]
    fn poll_updates_time_left() {
        let t0 = Instant::now();
        let (mut session, start) = playing(t0);
        session.advance_to(start + ms(15_000));
        assert_eq!(session.time_left(), ms(45_000));
    }
}
