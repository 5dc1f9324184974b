use gloo::storage::{LocalStorage, Storage};
use memsim_core::KeyValueStore;
use web_time::Duration;

/// Helper function to use JavaScript's Math.random
pub(crate) fn js_random_seed() -> u64 {
    use js_sys::Math::random;
    u64::from_be_bytes([
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
        (256. * random()) as u8,
    ])
}

/// Parses a seed forced through the location hash, falling back to a random one.
pub(crate) fn seed_or_random(seed: Option<&str>) -> u64 {
    match seed.map(|seed| seed.trim().parse::<u64>()) {
        Some(Ok(seed)) => seed,
        Some(Err(err)) => {
            log::warn!("ignoring seed {:?}: {}", seed, err);
            js_random_seed()
        }
        None => js_random_seed(),
    }
}

/// `localStorage` behind the [`KeyValueStore`] seam.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct BrowserStorage;

impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        match LocalStorage::raw().get_item(key) {
            Ok(value) => value,
            Err(err) => {
                log::error!("Could not read {} from local storage: {:?}", key, err);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(err) = LocalStorage::raw().set_item(key, value) {
            log::error!("Could not save {} to local storage: {:?}", key, err);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(err) = LocalStorage::raw().remove_item(key) {
            log::error!("Could not remove {} from local storage: {:?}", key, err);
        }
    }
}

/// `MM:SS:CC` with centiseconds, as shown on the timer and result card.
pub(crate) fn format_time(duration: Duration) -> String {
    let centis = duration.as_millis() / 10;
    let minutes = centis / 6000;
    let seconds = (centis / 100) % 60;
    format!("{:02}:{:02}:{:02}", minutes, seconds, centis % 100)
}

/// Leaderboard seconds with two decimals.
pub(crate) fn format_seconds(secs: f64) -> String {
    format!("{:.2}s", secs)
}
