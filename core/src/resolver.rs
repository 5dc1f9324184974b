use rand::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

use crate::*;

/// Feature flag deciding the experiment arm.
pub const FEATURE_FLAG_KEY: &str = "word_search_difficulty_v2";

/// Delay before the single retry of an unresolved flag.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

const ID_ALPHABET_RADIX: u32 = 36;
const USER_ID_LEN: usize = 9;
const SESSION_ID_LEN: usize = 12;
const MAX_PLAYER_NUMBER: u32 = 1000;

/// Feature-flag and identity provider.
pub trait FlagEvaluator {
    /// Current value of the flag `name`, `None` while unknown.
    fn feature_flag(&self, name: &str) -> Option<String>;
    fn identify(&self, username: &str);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Successful resolution: the only way to obtain a variant a session may run with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    variant: Variant,
    identity: Identity,
    flag_response: String,
}

impl Resolved {
    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Raw flag value the variant was derived from.
    pub fn flag_response(&self) -> &str {
        &self.flag_response
    }

    #[cfg(test)]
    pub(crate) fn for_tests(variant: Variant) -> Self {
        let flag_response = match variant {
            Variant::A => "control",
            Variant::B => "4-words",
        };
        Self {
            variant,
            identity: Identity {
                user_id: "user_test00000".to_string(),
                username: "Player 1".to_string(),
            },
            flag_response: flag_response.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved { variant: Variant, response: String },
    Unresolved { response: Option<String> },
}

impl Resolution {
    pub fn from_response(response: Option<String>) -> Self {
        match response.as_deref().and_then(Variant::from_flag_value) {
            Some(variant) => Self::Resolved {
                variant,
                response: response.unwrap_or_default(),
            },
            None => Self::Unresolved { response },
        }
    }
}

/// Reads the experiment flag and maps it to a variant.
pub fn resolve_variant<F: FlagEvaluator + ?Sized>(flags: &F) -> Resolution {
    Resolution::from_response(flags.feature_flag(FEATURE_FLAG_KEY))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Feature flag service is not available")]
    EvaluatorMissing,
    #[error("Could not determine experiment variant (flag value {response:?})")]
    Unresolved { response: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveStep {
    Resolved(Resolved),
    /// Try again after the given delay.
    RetryAfter(Duration),
    Failed(ResolveError),
}

#[derive(Clone, Debug)]
enum ResolverState {
    Fresh,
    RetryPending,
    Resolved(Resolved),
    Failed(ResolveError),
}

/// Resolves the variant once, allowing a single delayed retry.
///
/// After the retry fails the resolver stays failed; a page reload is the only way out.
#[derive(Clone, Debug)]
pub struct VariantResolver {
    rng: SmallRng,
    state: ResolverState,
}

impl VariantResolver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            state: ResolverState::Fresh,
        }
    }

    pub fn resolved(&self) -> Option<&Resolved> {
        match &self.state {
            ResolverState::Resolved(resolved) => Some(resolved),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ResolveError> {
        match &self.state {
            ResolverState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_retry_pending(&self) -> bool {
        matches!(self.state, ResolverState::RetryPending)
    }

    pub fn attempt<F, S>(&mut self, flags: Option<&F>, storage: &S) -> ResolveStep
    where
        F: FlagEvaluator + ?Sized,
        S: KeyValueStore + ?Sized,
    {
        match &self.state {
            ResolverState::Resolved(resolved) => return ResolveStep::Resolved(resolved.clone()),
            ResolverState::Failed(err) => return ResolveStep::Failed(err.clone()),
            ResolverState::Fresh | ResolverState::RetryPending => {}
        }

        let Some(flags) = flags else {
            log::error!("no feature flag evaluator, cannot pick a variant");
            return self.fail(ResolveError::EvaluatorMissing);
        };

        match resolve_variant(flags) {
            Resolution::Resolved { variant, response } => {
                let identity = self.persist(variant, flags, storage);
                log::info!("resolved variant {} for {}", variant, identity.username);
                let resolved = Resolved {
                    variant,
                    identity,
                    flag_response: response,
                };
                self.state = ResolverState::Resolved(resolved.clone());
                ResolveStep::Resolved(resolved)
            }
            Resolution::Unresolved { response } => match self.state {
                ResolverState::Fresh => {
                    log::warn!("flag {} unresolved ({:?}), retrying", FEATURE_FLAG_KEY, response);
                    self.state = ResolverState::RetryPending;
                    ResolveStep::RetryAfter(RETRY_DELAY)
                }
                _ => {
                    log::error!("flag {} still unresolved ({:?})", FEATURE_FLAG_KEY, response);
                    self.fail(ResolveError::Unresolved { response })
                }
            },
        }
    }

    fn fail(&mut self, err: ResolveError) -> ResolveStep {
        self.state = ResolverState::Failed(err.clone());
        ResolveStep::Failed(err)
    }

    fn persist<F, S>(&mut self, variant: Variant, flags: &F, storage: &S) -> Identity
    where
        F: FlagEvaluator + ?Sized,
        S: KeyValueStore + ?Sized,
    {
        storage.set(VARIANT_KEY, variant.as_str());

        let user_id = generate_user_id(&mut self.rng);
        storage.set(USER_ID_KEY, &user_id);

        let username = match storage.get(USERNAME_KEY).filter(|name| !name.is_empty()) {
            Some(username) => username,
            None => {
                let username = generate_username(&mut self.rng);
                storage.set(USERNAME_KEY, &username);
                flags.identify(&username);
                username
            }
        };

        Identity { user_id, username }
    }
}

/// Random lowercase base-36 string of `len` characters.
pub fn random_id(rng: &mut SmallRng, len: usize) -> String {
    (0..len)
        .filter_map(|_| char::from_digit(rng.random_range(0..ID_ALPHABET_RADIX), ID_ALPHABET_RADIX))
        .collect()
}

pub fn generate_user_id(rng: &mut SmallRng) -> String {
    format!("user_{}", random_id(rng, USER_ID_LEN))
}

pub fn generate_username(rng: &mut SmallRng) -> String {
    format!("Player {}", rng.random_range(0..MAX_PLAYER_NUMBER))
}

pub fn generate_game_session_id(rng: &mut SmallRng) -> String {
    random_id(rng, SESSION_ID_LEN)
}
