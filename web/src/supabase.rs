use gloo::net::http::{Request, Response};
use memsim_core::{LeaderboardEntry, RemoteBest, RemoteError, ScoreBoard, Variant};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) const DEFAULT_URL: Option<&str> = option_env!("PUBLIC_SUPABASE_URL");
pub(crate) const DEFAULT_ANON_KEY: Option<&str> = option_env!("PUBLIC_SUPABASE_ANON_KEY");

#[derive(Serialize)]
struct LeaderboardParams<'a> {
    p_variant: &'a str,
    p_limit: usize,
}

#[derive(Serialize)]
struct PersonalBestParams<'a> {
    p_variant: &'a str,
    p_username: &'a str,
}

/// Supabase REST client for the leaderboard RPCs.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SupabaseBoard {
    url: Option<String>,
    anon_key: Option<String>,
}

impl SupabaseBoard {
    pub(crate) fn new(url: Option<String>, anon_key: Option<String>) -> Self {
        let url = url
            .or_else(|| DEFAULT_URL.map(str::to_string))
            .filter(|url| !url.is_empty());
        let anon_key = anon_key
            .or_else(|| DEFAULT_ANON_KEY.map(str::to_string))
            .filter(|key| !key.is_empty());
        if url.is_none() || anon_key.is_none() {
            log::warn!("Supabase is not configured, leaderboard disabled");
        }
        Self { url, anon_key }
    }

    fn rpc_url(&self, function: &str) -> Result<(String, &str), RemoteError> {
        match (&self.url, &self.anon_key) {
            (Some(url), Some(key)) => Ok((
                format!("{}/rest/v1/rpc/{}", url.trim_end_matches('/'), function),
                key.as_str(),
            )),
            _ => Err(RemoteError::NotConfigured),
        }
    }

    async fn rpc<P: Serialize, T: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<T, RemoteError> {
        let (url, key) = self.rpc_url(function)?;
        log::trace!("rpc {}", function);

        let response = Request::post(&url)
            .header("apikey", key)
            .header("Authorization", &format!("Bearer {}", key))
            .json(params)
            .map_err(|err| RemoteError::Transport(err.to_string()))?
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        if !response.ok() {
            return Err(RemoteError::Status(response.status()));
        }
        response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

impl ScoreBoard for SupabaseBoard {
    async fn leaderboard(
        &self,
        variant: Variant,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, RemoteError> {
        let params = LeaderboardParams {
            p_variant: variant.as_str(),
            p_limit: limit,
        };
        self.rpc("get_leaderboard", &params).await
    }

    async fn personal_best(
        &self,
        variant: Variant,
        username: &str,
    ) -> Result<Option<RemoteBest>, RemoteError> {
        let params = PersonalBestParams {
            p_variant: variant.as_str(),
            p_username: username,
        };
        // the RPC answers with a set of rows, empty when the player never finished
        let rows: Vec<RemoteBest> = self.rpc("get_personal_best", &params).await?;
        Ok(rows.into_iter().next())
    }
}
