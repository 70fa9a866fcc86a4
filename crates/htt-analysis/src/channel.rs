//! Analysis channels (final states of the di-tau decay).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use htt_core::Error;

/// Di-tau final state being analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Electron + hadronic tau.
    #[default]
    Et,
    /// Muon + hadronic tau.
    Mt,
    /// Electron + muon.
    Em,
    /// Electron + hadronic tau, MET-triggered.
    Etmet,
    /// Muon + hadronic tau, MET-triggered.
    Mtmet,
}

impl Channel {
    /// Whether the second leg is a hadronic tau.
    pub fn has_hadronic_tau(self) -> bool {
        self != Channel::Em
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Et => "et",
            Channel::Mt => "mt",
            Channel::Em => "em",
            Channel::Etmet => "etmet",
            Channel::Mtmet => "mtmet",
        };
        f.write_str(s)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "et" => Ok(Channel::Et),
            "mt" => Ok(Channel::Mt),
            "em" => Ok(Channel::Em),
            "etmet" => Ok(Channel::Etmet),
            "mtmet" => Ok(Channel::Mtmet),
            other => Err(Error::Config(format!("unknown channel '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_and_display() {
        for c in [Channel::Et, Channel::Mt, Channel::Em, Channel::Etmet, Channel::Mtmet] {
            assert_eq!(c.to_string().parse::<Channel>().unwrap(), c);
        }
        assert_eq!("MT".parse::<Channel>().unwrap(), Channel::Mt);
        assert!("tt".parse::<Channel>().is_err());
        assert!(!Channel::Em.has_hadronic_tau());
        assert!(Channel::Mtmet.has_hadronic_tau());
    }
}
