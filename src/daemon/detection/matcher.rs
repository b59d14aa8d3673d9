use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

/// Matches `cmp=pkg/proc` and `comp=pkg/proc`. The leading `c` or `co` may be cut off by the
/// log prefix, leaving `mp=`. The component may be wrapped in braces, e.g. `cmp={com.a/.Main}`.
static COMPONENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:co?)?mp=\{?([^/]+)/([^ \t}]+)").expect("component pattern should compile")
});

/// Matches `flg=0x...` and `flags=0x...`.
///
/// Only the digits 0-9 are captured even though the value is read as hexadecimal, so a mask
/// written with the letters a-f never matches and the line counts as having unknown flags.
static FLAGS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfl(?:g|ags)=0x([0-9]+)\b").expect("flags pattern should compile")
});

/// Identity of the component a log line is starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCandidate {
    /// Everything up to the first `/`, for example `com.example.app`
    pub package_name: Arc<str>,
    /// Activity class, for example `com.example.app.MainActivity` or `.MainActivity`
    pub process_name: Arc<str>,
}

/// Finds the started component anywhere in the line.
pub fn extract_component(line: &str) -> Option<LaunchCandidate> {
    let captures = COMPONENT_PATTERN.captures(line)?;
    let package_name = captures.get(1)?.as_str();
    let process_name = captures.get(2)?.as_str();
    Some(LaunchCandidate {
        package_name: package_name.into(),
        process_name: process_name.into(),
    })
}

/// Finds the intent flags anywhere in the line. [None] means the flags are unknown, either
/// because there is no marker or because the value doesn't fit into 32 bits.
pub fn extract_flags(line: &str) -> Option<u32> {
    let captures = FLAGS_PATTERN.captures(line)?;
    let digits = captures.get(1)?.as_str();
    match u32::from_str_radix(digits, 16) {
        Ok(flags) => Some(flags),
        Err(e) => {
            debug!("Ignoring flags 0x{digits}: {e}");
            None
        }
    }
}
