use memsim_core::{AnalyticsTransport, FlagEvaluator, Properties, ReportError};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = posthog, js_name = getFeatureFlag, catch)]
    fn get_feature_flag(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = posthog, catch)]
    fn identify(distinct_id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = posthog, catch)]
    fn capture(event: &str, properties: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = posthog, js_name = onFeatureFlags, catch)]
    fn on_feature_flags(callback: &JsValue) -> Result<JsValue, JsValue>;
}

/// Handle to the `posthog` global loaded by the page.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct PostHog {
    _private: (),
}

impl PostHog {
    /// `None` when the PostHog snippet did not load (blocked or unconfigured).
    pub(crate) fn detect() -> Option<Self> {
        let global = js_sys::global();
        let loaded = js_sys::Reflect::get(&global, &JsValue::from_str("posthog"))
            .is_ok_and(|posthog| posthog.is_object());
        if loaded {
            Some(Self { _private: () })
        } else {
            log::error!("PostHog not initialized. Check environment variables.");
            None
        }
    }

    /// Runs `callback` on every flag (re)load for as long as the returned listener lives.
    pub(crate) fn on_flags_loaded(self, callback: impl FnMut() + 'static) -> Result<FlagsListener, JsValue> {
        let listener = Closure::<dyn FnMut()>::new(callback);
        on_feature_flags(listener.as_ref())?;
        Ok(listener)
    }
}

pub(crate) type FlagsListener = Closure<dyn FnMut()>;

/// Keeps `posthog` only when `hook` could register for flag loads; otherwise it counts as missing.
pub(crate) fn hook_flags<T, E: std::fmt::Debug>(
    posthog: Option<PostHog>,
    hook: impl FnOnce(PostHog) -> Result<T, E>,
) -> Option<(PostHog, T)> {
    let posthog = posthog?;
    match hook(posthog) {
        Ok(listener) => Some((posthog, listener)),
        Err(err) => {
            log::error!("posthog.onFeatureFlags failed: {:?}", err);
            None
        }
    }
}

impl FlagEvaluator for PostHog {
    fn feature_flag(&self, name: &str) -> Option<String> {
        match get_feature_flag(name) {
            Ok(value) => value.as_string(),
            Err(err) => {
                log::error!("posthog.getFeatureFlag({}) failed: {:?}", name, err);
                None
            }
        }
    }

    fn identify(&self, username: &str) {
        if let Err(err) = identify(username) {
            log::error!("posthog.identify failed: {:?}", err);
        }
    }
}

/// Event sink; works without the snippet and reports [`ReportError::Unavailable`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct PostHogEvents {
    posthog: Option<PostHog>,
}

impl PostHogEvents {
    pub(crate) fn new(posthog: Option<PostHog>) -> Self {
        Self { posthog }
    }
}

impl AnalyticsTransport for PostHogEvents {
    fn capture(&self, event: &str, properties: &Properties) -> Result<(), ReportError> {
        if self.posthog.is_none() {
            return Err(ReportError::Unavailable);
        }

        let json = serde_json::to_string(properties)
            .map_err(|err| ReportError::Rejected(err.to_string()))?;
        let properties = js_sys::JSON::parse(&json)
            .map_err(|err| ReportError::Rejected(format!("{:?}", err)))?;
        capture(event, &properties).map_err(|err| ReportError::Rejected(format!("{:?}", err)))
    }
}
