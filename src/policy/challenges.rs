//! Challenge type configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Domain-control challenge types the policy authority knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "tls-sni-01")]
    TlsSni01,
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::TlsSni01 => "tls-sni-01",
            ChallengeType::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = ChallengeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(ChallengeType::Http01),
            "tls-sni-01" => Ok(ChallengeType::TlsSni01),
            "dns-01" => Ok(ChallengeType::Dns01),
            other => Err(ChallengeConfigError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeConfigError {
    #[error("empty challenges map is not allowed")]
    Empty,
    #[error("invalid challenge in PA config: {0}")]
    Unknown(String),
}

/// Check a challenge map for internal consistency.
pub fn check_challenges(challenges: &BTreeMap<String, bool>) -> Result<(), ChallengeConfigError> {
    if challenges.is_empty() {
        return Err(ChallengeConfigError::Empty);
    }
    for name in challenges.keys() {
        name.parse::<ChallengeType>()?;
    }
    Ok(())
}

/// The enabled challenge types of a validated map, in a stable order.
pub fn enabled_challenges(
    challenges: &BTreeMap<String, bool>,
) -> Result<Vec<ChallengeType>, ChallengeConfigError> {
    check_challenges(challenges)?;
    let mut enabled = challenges
        .iter()
        .filter(|(_, on)| **on)
        .map(|(name, _)| name.parse())
        .collect::<Result<Vec<ChallengeType>, _>>()?;
    enabled.sort();
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn empty_map_rejected() {
        assert_eq!(check_challenges(&BTreeMap::new()), Err(ChallengeConfigError::Empty));
    }

    #[test]
    fn unknown_challenge_rejected() {
        let err = check_challenges(&map(&[("http-01", true), ("carrier-pigeon-01", true)]))
            .unwrap_err();
        assert_eq!(err, ChallengeConfigError::Unknown("carrier-pigeon-01".into()));
    }

    #[test]
    fn disabled_challenges_are_still_checked_but_not_enabled() {
        let enabled =
            enabled_challenges(&map(&[("dns-01", true), ("tls-sni-01", false), ("http-01", true)]))
                .unwrap();
        assert_eq!(enabled, vec![ChallengeType::Http01, ChallengeType::Dns01]);
    }
}
