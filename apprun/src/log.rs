use std::{env::var_os, sync::OnceLock};

pub const LOG_ENV: &str = "APPRUN_LOG";

/// Diagnostics are on in debug builds, or when `APPRUN_LOG` is set to anything but `0`.
pub fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        cfg!(debug_assertions) || var_os(LOG_ENV).is_some_and(|value| !value.is_empty() && value != "0")
    })
}

/// Print to stderr when diagnostics are enabled. Expands to a `()` expression.
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        if $crate::log::enabled() {
            eprintln!("apprun: {}", format_args!($($arg)*));
        }
    }}
}

#[cfg(test)]
mod tests {
    #[test]
    fn usable_as_match_arm() {
        let mut kept = Vec::new();
        for outcome in [Ok(1), Err("denied"), Ok(3)] {
            match outcome {
                Ok(value) => kept.push(value),
                Err(e) => debug_log!("skipping: {}", e),
            }
        }
        assert_eq!(kept, [1, 3]);
    }
}
