use rand::prelude::*;
use serde_json::json;
use web_time::{Duration, Instant};

use crate::*;

/// What the start screen shows about the upcoming puzzle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PuzzlePreview {
    pub id: String,
    pub difficulty: u8,
    pub target_count: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    pub summary: RunSummary,
    pub is_personal_best: bool,
}

/// Owns the session of one page and reacts to its terminal phases.
///
/// Can only be built from a [`Resolved`] variant, so no session ever starts without one.
pub struct Simulator<S, A> {
    resolved: Resolved,
    catalog: Catalog,
    session: Session,
    next_puzzle: PuzzleDefinition,
    storage: S,
    personal_best: PersonalBestCache<S>,
    reporter: EventReporter<A>,
    rng: SmallRng,
    game_session_id: Option<String>,
    last_result: Option<RunResult>,
    leaderboard_stale: bool,
}

impl<S: KeyValueStore + Clone, A: AnalyticsTransport> Simulator<S, A> {
    pub fn new(
        resolved: Resolved,
        catalog: Catalog,
        timings: Timings,
        storage: S,
        transport: A,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let variant = resolved.variant();
        let next_puzzle = catalog.select_puzzle(variant, &mut rng)?.clone();

        Ok(Self {
            session: Session::new(variant, timings),
            personal_best: PersonalBestCache::new(storage.clone()),
            reporter: EventReporter::new(transport),
            resolved,
            catalog,
            next_puzzle,
            storage,
            rng,
            game_session_id: None,
            last_result: None,
            leaderboard_stale: true,
        })
    }

    pub fn variant(&self) -> Variant {
        self.resolved.variant()
    }

    pub fn identity(&self) -> &Identity {
        self.resolved.identity()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn game_session_id(&self) -> Option<&str> {
        self.game_session_id.as_deref()
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }

    pub fn personal_best(&self) -> Option<Duration> {
        self.personal_best.cached(self.variant())
    }

    pub fn preview(&self) -> PuzzlePreview {
        PuzzlePreview {
            id: self.next_puzzle.id().to_string(),
            difficulty: self.next_puzzle.difficulty(),
            target_count: self.next_puzzle.target_count(),
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<()> {
        let puzzle = self.next_puzzle.materialize(&mut self.rng)?;
        self.session.start(puzzle, now)?;
        self.game_session_id = Some(generate_game_session_id(&mut self.rng));
        self.last_result = None;
        self.dispatch_events();
        Ok(())
    }

    pub fn interact(&mut self, interaction: Interaction, now: Instant) -> Result<InteractionOutcome> {
        let outcome = self.session.interact(interaction, now);
        self.dispatch_events();
        outcome
    }

    pub fn fire(&mut self, token: TimerToken, now: Instant) -> bool {
        let updated = self.session.fire(token, now);
        self.dispatch_events();
        updated
    }

    pub fn advance_to(&mut self, now: Instant) -> bool {
        let updated = self.session.advance_to(now);
        self.dispatch_events();
        updated
    }

    /// Back to `Idle` with a newly selected puzzle.
    pub fn reset(&mut self, repeat: bool) -> Result<()> {
        self.session.reset(repeat)?;
        self.dispatch_events();

        self.next_puzzle = self
            .catalog
            .select_puzzle(self.variant(), &mut self.rng)?
            .clone();
        self.game_session_id = None;
        self.last_result = None;
        Ok(())
    }

    /// Folds a remote personal best into the local cache.
    pub fn prime_personal_best(&mut self, remote: Remote<Option<RemoteBest>>) -> Remote<Option<Duration>> {
        let variant = self.variant();
        self.personal_best.prime(variant, remote)
    }

    /// Whether the leaderboard should be fetched again. Clears the flag.
    pub fn take_leaderboard_refresh(&mut self) -> bool {
        core::mem::take(&mut self.leaderboard_stale)
    }

    fn context(&self) -> EventContext {
        EventContext::from_storage(
            &self.storage,
            self.game_session_id.as_deref(),
            Some(self.resolved.flag_response()),
        )
    }

    fn dispatch_events(&mut self) {
        for event in self.session.drain_events() {
            let context = self.context();
            let mut extra = Properties::new();

            let name = match event {
                SessionEvent::Started {
                    puzzle_id,
                    difficulty,
                } => {
                    extra.insert("difficulty".into(), json!(difficulty));
                    extra.insert("puzzle_id".into(), json!(puzzle_id));
                    EventName::PuzzleStarted
                }
                SessionEvent::Completed(summary) => {
                    let is_personal_best = self
                        .personal_best
                        .record_completion(self.resolved.variant(), summary.duration);
                    self.last_result = Some(RunResult {
                        success: true,
                        summary,
                        is_personal_best,
                    });
                    self.leaderboard_stale = true;

                    extra.insert(
                        "completion_time_seconds".into(),
                        json!(seconds_3dp(summary.duration)),
                    );
                    extra.insert("correct_words_count".into(), json!(summary.found));
                    extra.insert("total_guesses_count".into(), json!(summary.attempts));
                    EventName::PuzzleCompleted
                }
                SessionEvent::Failed(summary) => {
                    self.last_result = Some(RunResult {
                        success: false,
                        summary,
                        is_personal_best: false,
                    });

                    extra.insert("correct_words_count".into(), json!(summary.found));
                    extra.insert("total_guesses_count".into(), json!(summary.attempts));
                    EventName::PuzzleFailed
                }
                SessionEvent::Repeated => EventName::PuzzleRepeated,
            };

            self.reporter.emit(name, &context, extra);
        }
    }
}
