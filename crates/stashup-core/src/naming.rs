//! Remote file naming helpers.

use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

pub const FILE_NAMESPACE: &str = "File:";

const SUFFIX_MIN: u32 = 10000;
const SUFFIX_MAX: u32 = 99999;

static EXTENSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.*)(\..+?)$").ok());

/// `Foo.jpg` -> `File:Foo.jpg`. Names already carrying the prefix are kept.
pub fn file_page_title(filename: &str) -> String {
    if filename.starts_with(FILE_NAMESPACE) {
        filename.to_string()
    } else {
        format!("{}{}", FILE_NAMESPACE, filename)
    }
}

/// Inserts ` (<suffix>)` before the extension, or appends it when there is none.
pub fn disambiguate(original: &str, suffix: u32) -> String {
    if original.contains('.') {
        if let Some(caps) = EXTENSION_RE.as_ref().and_then(|re| re.captures(original)) {
            return format!("{} ({}){}", &caps[1], suffix, &caps[2]);
        }
    }
    format!("{} ({})", original, suffix)
}

/// A fresh candidate built from `original` with a random 5-digit suffix.
pub fn random_candidate(original: &str) -> String {
    let suffix = rand::rng().random_range(SUFFIX_MIN..=SUFFIX_MAX);
    disambiguate(original, suffix)
}
