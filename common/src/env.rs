use std::str::FromStr;

/// Reads an environment variable used as a runtime tuning knob. Panics if it is set but does not parse.
pub fn get_env<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .map(|v| {
            v.parse::<T>()
                .unwrap_or_else(|_| panic!("{} must be a valid {}", key, std::any::type_name::<T>()))
        })
        .ok()
}

pub fn get_env_usize(key: &str) -> Option<usize> {
    get_env::<usize>(key)
}
