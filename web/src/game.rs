use std::collections::HashMap;
use std::rc::Rc;

use clap::{Args, ValueEnum};
use gloo::timers::callback::Timeout;
use memsim_core as sim;
use sim::{InteractionOutcome, LeaderboardState, Phase, TimerToken};
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use web_time::{Duration, Instant};
use yew::prelude::*;

use crate::leaderboard::LeaderboardPanel;
use crate::posthog::{hook_flags, FlagsListener, PostHog, PostHogEvents};
use crate::supabase::SupabaseBoard;
use crate::utils::*;

type GameSimulator = sim::Simulator<BrowserStorage, PostHogEvents>;

#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CatalogChoice {
    /// Find the pineapples on a 5×5 fruit grid
    #[default]
    Grid,
    /// Spot the hidden words in a row of letters
    Words,
}

impl From<CatalogChoice> for sim::CatalogKind {
    fn from(choice: CatalogChoice) -> Self {
        match choice {
            CatalogChoice::Grid => Self::MemoryGrid,
            CatalogChoice::Words => Self::WordSearch,
        }
    }
}

#[derive(Args, Properties, Debug, Clone, PartialEq)]
pub(crate) struct GameProps {
    /// Force a seed instead of random
    #[arg(short, long)]
    pub seed: Option<String>,

    /// Puzzle catalog to play
    #[arg(short, long, value_enum, default_value_t)]
    pub catalog: CatalogChoice,

    /// Supabase project URL, defaults to the one baked in at build time
    #[arg(long)]
    pub supabase_url: Option<String>,

    /// Supabase anon key, defaults to the one baked in at build time
    #[arg(long)]
    pub supabase_key: Option<String>,
}

pub trait HasUpdate {
    fn has_update(self) -> bool;
}

impl<E: std::fmt::Display> HasUpdate for Result<InteractionOutcome, E> {
    fn has_update(self) -> bool {
        match self {
            Ok(outcome) => outcome.has_update(),
            Err(err) => {
                log::debug!("interaction rejected: {}", err);
                false
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Msg {
    FlagsLoaded,
    RetryResolve,
    Start,
    Cell(sim::Coord2),
    WordInput(String),
    SubmitWord,
    TimerFired(TimerToken),
    Reset { repeat: bool },
    PersonalBestFetched(sim::Remote<Option<sim::RemoteBest>>),
    LeaderboardLoaded(LeaderboardState),
}

#[derive(Properties, Clone, PartialEq)]
struct CellProps {
    coords: sim::Coord2,
    symbol: AttrValue,
    view: sim::CellView,
    #[prop_or_default]
    locked: bool,
    callback: Callback<sim::Coord2>,
}

#[function_component(CellTile)]
fn cell_component(props: &CellProps) -> Html {
    use sim::CellView::*;

    let CellProps {
        coords,
        symbol,
        view,
        locked,
        callback,
    } = props.clone();

    let mut class = classes!(
        "cell",
        match view {
            Hidden => classes!(),
            Shown => classes!("open"),
            Found => classes!("open", "found"),
            Missed => classes!("open", "miss"),
        }
    );
    if locked {
        class.push("locked");
    }

    let onclick = Callback::from(move |_: MouseEvent| {
        log::trace!("{:?} clicked", coords);
        callback.emit(coords);
    });

    html! {
        <td {class} {onclick}>
            if !matches!(view, Hidden) {
                {symbol}
            }
        </td>
    }
}

pub(crate) struct GameView {
    storage: BrowserStorage,
    posthog: Option<PostHog>,
    board: Rc<SupabaseBoard>,
    resolver: sim::VariantResolver,
    simulator: Option<GameSimulator>,
    setup_error: Option<String>,
    leaderboard: LeaderboardState,
    word_input: String,
    seed: u64,
    timers: HashMap<TimerToken, Timeout>,
    _retry: Option<Timeout>,
    _flags_listener: Option<FlagsListener>,
    _init_settings: GameProps,
}

impl GameView {
    fn resolve(&mut self, ctx: &Context<Self>) -> bool {
        use sim::ResolveStep::*;

        match self.resolver.attempt(self.posthog.as_ref(), &self.storage) {
            Resolved(resolved) => {
                if self.simulator.is_some() {
                    return false;
                }
                let catalog = sim::Catalog::builtin(self._init_settings.catalog.into());
                match sim::Simulator::new(
                    resolved,
                    catalog,
                    sim::Timings::standard(),
                    self.storage,
                    PostHogEvents::new(self.posthog),
                    self.seed,
                ) {
                    Ok(simulator) => {
                        self.simulator = Some(simulator);
                        self.fetch_personal_best(ctx);
                    }
                    Err(err) => {
                        log::error!("could not set up the puzzle: {}", err);
                        self.setup_error = Some(err.to_string());
                    }
                }
            }
            RetryAfter(delay) => {
                let link = ctx.link().clone();
                self._retry = Some(Timeout::new(millis(delay), move || {
                    link.send_message(Msg::RetryResolve)
                }));
            }
            Failed(err) => {
                self.setup_error = Some(err.to_string());
            }
        }
        true
    }

    fn fetch_personal_best(&self, ctx: &Context<Self>) {
        let Some(simulator) = &self.simulator else {
            return;
        };
        let board = Rc::clone(&self.board);
        let variant = simulator.variant();
        let username = simulator.identity().username.clone();
        let link = ctx.link().clone();
        spawn_local(async move {
            let remote = sim::fetch_personal_best(board.as_ref(), variant, &username).await;
            link.send_message(Msg::PersonalBestFetched(remote));
        });
    }

    fn refresh_leaderboard(&mut self, ctx: &Context<Self>) {
        let Some(simulator) = &mut self.simulator else {
            return;
        };
        if !simulator.take_leaderboard_refresh() {
            return;
        }
        let board = Rc::clone(&self.board);
        let variant = simulator.variant();
        let username = simulator.identity().username.clone();
        let link = ctx.link().clone();
        spawn_local(async move {
            let state = sim::refresh_leaderboard(board.as_ref(), variant, Some(&username)).await;
            link.send_message(Msg::LeaderboardLoaded(state));
        });
    }

    /// Mirrors the session's pending timers with browser timeouts.
    fn sync_timers(&mut self, ctx: &Context<Self>) {
        let Some(simulator) = &self.simulator else {
            self.timers.clear();
            return;
        };

        let now = Instant::now();
        let pending: HashMap<_, _> = simulator.session().pending_timers().collect();
        // dropping a Timeout cancels it
        self.timers.retain(|token, _| pending.contains_key(token));

        for (token, timer) in pending {
            self.timers.entry(token).or_insert_with(|| {
                let link = ctx.link().clone();
                let delay = timer.due.saturating_duration_since(now);
                Timeout::new(millis(delay), move || link.send_message(Msg::TimerFired(token)))
            });
        }
    }

    fn phase(&self) -> Phase {
        self.simulator
            .as_ref()
            .map_or(Phase::Idle, |simulator| simulator.session().phase())
    }

    fn view_variant_card(&self) -> Html {
        let Some(simulator) = &self.simulator else {
            let (variant, username, difficulty) = if self.setup_error.is_some() {
                ("Error", "Feature flag failed", "Check PostHog config")
            } else {
                ("Loading...", "Loading...", "")
            };
            return html! {
                <header class="variant-card">
                    <span>{variant}</span>
                    <span>{username}</span>
                    <span>{difficulty}</span>
                    <span>{"0"}</span>
                </header>
            };
        };

        let preview = simulator.preview();
        html! {
            <header class="variant-card">
                <span>{format!("Variant {} | {}", simulator.variant(), preview.id)}</span>
                <span>{simulator.identity().username.clone()}</span>
                <span>{format!("Difficulty: {}/10", preview.difficulty)}</span>
                <span>{preview.target_count}</span>
            </header>
        }
    }

    fn view_status(&self, simulator: &GameSimulator) -> Html {
        let session = simulator.session();
        let countdown = match session.countdown() {
            Some(sim::Countdown::Remaining(remaining)) if session.phase() == Phase::Countdown => {
                remaining.to_string()
            }
            Some(sim::Countdown::Hide) if session.phase() == Phase::Countdown => "HIDE".to_string(),
            _ => String::new(),
        };

        html! {
            <nav class="status">
                <aside class="timer">{format_time(session.time_left())}</aside>
                <span class="countdown">{countdown}</span>
                <aside class="found">
                    {format!("{}/{}", session.found_targets().len(), session.target_count())}
                </aside>
            </nav>
        }
    }

    fn view_board(&self, ctx: &Context<Self>, simulator: &GameSimulator) -> Html {
        let session = simulator.session();
        let Some(puzzle) = session.puzzle() else {
            return html! {};
        };

        let (rows, cols) = puzzle.size();
        let locked = session.phase() != Phase::Playing;
        let callback = ctx.link().callback(Msg::Cell);

        let grid = html! {
            <table class={classes!(matches!(puzzle.layout(), sim::Layout::Letters).then_some("letters"))}>
                {
                    for (0..rows).map(|row| html! {
                        <tr>
                            {
                                for (0..cols).map(|col| {
                                    let coords = (row, col);
                                    let symbol = AttrValue::from(puzzle.symbol_at(coords).to_string());
                                    let view = session.cell_view(coords);
                                    let callback = callback.clone();
                                    html! {
                                        <CellTile {coords} {symbol} {view} {locked} {callback}/>
                                    }
                                })
                            }
                        </tr>
                    })
                }
            </table>
        };

        if !matches!(puzzle.layout(), sim::Layout::Letters) {
            return grid;
        }

        let oninput = ctx.link().callback(|e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            Msg::WordInput(input.value())
        });
        let onkeydown = ctx.link().batch_callback(|e: KeyboardEvent| {
            (e.key() == "Enter").then_some(Msg::SubmitWord)
        });
        let onclick = ctx.link().callback(|_: MouseEvent| Msg::SubmitWord);
        let found = session
            .found_targets()
            .iter()
            .filter_map(|target| match target {
                sim::Target::Word(word) => Some(word.clone()),
                sim::Target::Cell(_) => None,
            })
            .collect::<Vec<_>>()
            .join(", ");

        html! {
            <>
                {grid}
                <div class="word-entry">
                    <input
                        type="text"
                        value={self.word_input.clone()}
                        disabled={locked}
                        {oninput}
                        {onkeydown}
                    />
                    <button disabled={locked} {onclick}>{"Guess"}</button>
                </div>
                <p class="found-words">{found}</p>
            </>
        }
    }

    fn view_result(&self, ctx: &Context<Self>, simulator: &GameSimulator) -> Html {
        let Some(result) = simulator.last_result() else {
            return html! {};
        };

        let (emoji, title, time, guesses, message) = if result.success {
            let message = if result.is_personal_best {
                "🏆 Personal Best!"
            } else {
                "✓ Complete!"
            };
            (
                "🎉",
                "Challenge Complete",
                format_time(result.summary.duration),
                result.summary.attempts.to_string(),
                message,
            )
        } else {
            (
                "😞",
                "Challenge Failed",
                format_time(simulator.session().timings().budget),
                format!("{}/{}", result.summary.found, result.summary.target_count),
                "⏰ Time's up!",
            )
        };

        let onclick = ctx.link().callback(|_: MouseEvent| Msg::Reset { repeat: true });
        html! {
            <article class={classes!("result", result.success.then_some("success"))}>
                <h2><span>{emoji}</span>{" "}{title}</h2>
                <dl>
                    <dt>{"Time"}</dt><dd>{time}</dd>
                    <dt>{"Guesses"}</dt><dd>{guesses}</dd>
                </dl>
                <p>{message}</p>
                <button {onclick}>{"Try Again"}</button>
            </article>
        }
    }
}

fn millis(duration: Duration) -> u32 {
    duration.as_millis().try_into().unwrap_or(u32::MAX)
}

impl Component for GameView {
    type Message = Msg;
    type Properties = GameProps;

    fn create(ctx: &Context<Self>) -> Self {
        let props = ctx.props().clone();
        let seed = seed_or_random(props.seed.as_deref());
        let link = ctx.link().clone();
        let (posthog, flags_listener) = hook_flags(PostHog::detect(), |posthog| {
            posthog.on_flags_loaded(move || link.send_message(Msg::FlagsLoaded))
        })
        .unzip();
        if posthog.is_none() {
            ctx.link().send_message(Msg::FlagsLoaded);
        }

        Self {
            storage: BrowserStorage,
            posthog,
            board: Rc::new(SupabaseBoard::new(
                props.supabase_url.clone(),
                props.supabase_key.clone(),
            )),
            resolver: sim::VariantResolver::new(seed),
            simulator: None,
            setup_error: None,
            leaderboard: LeaderboardState::default(),
            word_input: String::new(),
            seed,
            timers: HashMap::new(),
            _retry: None,
            _flags_listener: flags_listener,
            _init_settings: props,
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        use Msg::*;

        let now = Instant::now();
        let updated = match msg {
            FlagsLoaded | RetryResolve => self.resolve(ctx),
            Start => match self.simulator.as_mut().map(|simulator| simulator.start(now)) {
                Some(Ok(())) => true,
                Some(Err(err)) => {
                    log::warn!("cannot start: {}", err);
                    false
                }
                None => false,
            },
            Cell(coords) => self.simulator.as_mut().is_some_and(|simulator| {
                simulator
                    .interact(sim::Interaction::Cell(coords), now)
                    .has_update()
            }),
            WordInput(value) => {
                self.word_input = value;
                true
            }
            SubmitWord => {
                let word = std::mem::take(&mut self.word_input);
                if let Some(simulator) = &mut self.simulator {
                    if let Err(err) = simulator.interact(sim::Interaction::Word(word), now) {
                        log::debug!("word rejected: {}", err);
                    }
                }
                // the input was cleared
                true
            }
            TimerFired(token) => {
                self.timers.remove(&token);
                self.simulator
                    .as_mut()
                    .is_some_and(|simulator| simulator.fire(token, now))
            }
            Reset { repeat } => {
                self.word_input.clear();
                match self.simulator.as_mut().map(|simulator| simulator.reset(repeat)) {
                    Some(Ok(())) => true,
                    Some(Err(err)) => {
                        log::warn!("cannot reset: {}", err);
                        false
                    }
                    None => false,
                }
            }
            PersonalBestFetched(remote) => {
                if let Some(simulator) = &mut self.simulator {
                    let best = simulator.prime_personal_best(remote);
                    log::debug!("personal best: {:?}", best);
                }
                true
            }
            LeaderboardLoaded(state) => {
                let updated = self.leaderboard != state;
                self.leaderboard = state;
                updated
            }
        };

        self.refresh_leaderboard(ctx);
        self.sync_timers(ctx);
        updated
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        let phase = self.phase();
        let can_start = self.simulator.is_some() && phase.is_idle();
        let start_label = if self.setup_error.is_some() {
            "Feature Flag Error"
        } else {
            "Start Challenge"
        };
        let cb_start = ctx.link().callback(|_: MouseEvent| Msg::Start);

        let error = self.setup_error.as_ref().map(|err| {
            html! {
                <div class="error">
                    <h3>{"⚠️ PostHog Feature Flag Error"}</h3>
                    <p>{format!("Feature flag \"{}\" failed to load. Check PostHog configuration.", sim::FEATURE_FLAG_KEY)}</p>
                    <small>{err.clone()}</small>
                </div>
            }
        });

        let personal_best = self
            .simulator
            .as_ref()
            .and_then(|simulator| simulator.personal_best())
            .map_or_else(|| "--".to_string(), format_time);

        html! {
            <div class="memsim">
                {self.view_variant_card()}
                {for error}
                if let Some(simulator) = &self.simulator {
                    {self.view_status(simulator)}
                    {self.view_board(ctx, simulator)}
                    {self.view_result(ctx, simulator)}
                }
                <button class="start" disabled={!can_start} onclick={cb_start}>{start_label}</button>
                <p class="personal-best">{"Personal best: "}{personal_best}</p>
                <LeaderboardPanel state={self.leaderboard.clone()}/>
            </div>
        }
    }
}
