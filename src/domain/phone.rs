use crate::error::Error;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

const COUNTRY_PREFIX: &str = "254";
const MOBILE_PATTERN: &str = r"^(?:\+?254|0)7\d{8}$";

static MOBILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MOBILE_PATTERN).expect("mobile number pattern is valid"));

/// A Kenyan mobile number in canonical international form (`2547XXXXXXXX`).
///
/// The only way to build one is [`PhoneNumber::parse`], so every value held by
/// a `RepaymentRequest` has already been validated and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Accepts `07XXXXXXXX`, `2547XXXXXXXX` and `+2547XXXXXXXX`, ignoring
    /// spaces and dashes.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let compact: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();

        if !MOBILE_REGEX.is_match(&compact) {
            return Err(Error::ValidationError(
                "Please enter a valid Kenyan phone number".to_string(),
            ));
        }

        let digits = compact.trim_start_matches('+');
        let normalized = match digits.strip_prefix('0') {
            Some(local) => format!("{COUNTRY_PREFIX}{local}"),
            None => digits.to_string(),
        };

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
