use memsim_core::{LeaderboardState, Standing};
use yew::prelude::*;

use crate::utils::format_seconds;

fn medal(rank: usize) -> &'static str {
    match rank {
        1 => "🥇",
        2 => "🥈",
        3 => "🥉",
        _ => "🏅",
    }
}

#[derive(Properties, Clone, PartialEq)]
pub(crate) struct LeaderboardProps {
    pub state: LeaderboardState,
}

#[derive(Properties, Clone, PartialEq)]
struct RowProps {
    standing: Standing,
    #[prop_or_default]
    card: bool,
}

#[function_component(LeaderboardRow)]
fn leaderboard_row(props: &RowProps) -> Html {
    let Standing {
        rank,
        username,
        best_time_secs,
        is_current_user,
    } = props.standing.clone();

    let class = classes!(
        "entry",
        is_current_user.then_some("current-user"),
        props.card.then_some("user-card")
    );
    let badge = if props.card {
        format!("{}.", rank)
    } else {
        medal(rank).to_string()
    };

    html! {
        <li {class}>
            <span class="player">
                <span class="rank">{badge}</span>
                {" "}{username}
                if is_current_user {
                    {" 🌟"}
                }
            </span>
            <span class="time">{format_seconds(best_time_secs)}</span>
        </li>
    }
}

#[function_component(LeaderboardPanel)]
pub(crate) fn leaderboard_panel(props: &LeaderboardProps) -> Html {
    let body = match &props.state {
        LeaderboardState::Loading | LeaderboardState::Unavailable => html! {
            <p class="placeholder">{"Loading..."}</p>
        },
        LeaderboardState::Empty => html! {
            <p class="placeholder">{"Complete to rank"}</p>
        },
        LeaderboardState::Ranked(standings) => html! {
            <>
                <ol>
                    {
                        for standings.rows.iter().map(|standing| html! {
                            <LeaderboardRow standing={standing.clone()}/>
                        })
                    }
                </ol>
                if let Some(standing) = &standings.user_card {
                    <ol class="your-rank">
                        <LeaderboardRow standing={standing.clone()} card=true/>
                    </ol>
                }
            </>
        },
    };

    html! {
        <section class="leaderboard">
            <h3>{"Leaderboard"}</h3>
            {body}
        </section>
    }
}
