// chain-client/src/evm.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EVM ruleset, ordered by activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EvmVersion {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
}

impl EvmVersion {
    pub const ALL: [EvmVersion; 12] = [
        EvmVersion::Homestead,
        EvmVersion::TangerineWhistle,
        EvmVersion::SpuriousDragon,
        EvmVersion::Byzantium,
        EvmVersion::Constantinople,
        EvmVersion::Petersburg,
        EvmVersion::Istanbul,
        EvmVersion::Berlin,
        EvmVersion::London,
        EvmVersion::Paris,
        EvmVersion::Shanghai,
        EvmVersion::Cancun,
    ];

    /// Name as used by solc's `evmVersion` setting
    pub fn name(&self) -> &'static str {
        match self {
            EvmVersion::Homestead => "homestead",
            EvmVersion::TangerineWhistle => "tangerineWhistle",
            EvmVersion::SpuriousDragon => "spuriousDragon",
            EvmVersion::Byzantium => "byzantium",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
            EvmVersion::London => "london",
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
            EvmVersion::Cancun => "cancun",
        }
    }

    /// Detect the ruleset from a client version string.
    ///
    /// Accepts strings such as `DevChain/v0.1.0/istanbul` or
    /// `Ganache/v7.9.1 evm=byzantium`. Returns `None` when no segment names
    /// a known ruleset.
    pub fn from_client_version(version: &str) -> Option<Self> {
        version
            .split(|c: char| c == '/' || c == '=' || c == ',' || c == ';' || c.is_whitespace())
            .find_map(|segment| segment.parse().ok())
    }

    /// Detect the ruleset from node launch arguments (`-k <fork>` or
    /// `--hardfork <fork>`, optionally joined with `=`).
    pub fn from_launch_args<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let mut iter = args.iter().map(|a| a.as_ref());
        while let Some(arg) = iter.next() {
            if let Some((flag, value)) = arg.split_once('=') {
                if flag == "-k" || flag == "--hardfork" {
                    return value.parse().ok();
                }
                continue;
            }
            if arg == "-k" || arg == "--hardfork" {
                return iter.next().and_then(|value| value.parse().ok());
            }
        }
        None
    }
}

impl FromStr for EvmVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect();

        let version = match normalized.as_str() {
            "muirglacier" => EvmVersion::Istanbul,
            "arrowglacier" | "grayglacier" => EvmVersion::London,
            "merge" => EvmVersion::Paris,
            other => EvmVersion::ALL
                .iter()
                .copied()
                .find(|v| v.name().to_lowercase() == other)
                .ok_or_else(|| format!("Unknown EVM version: {}", s))?,
        };
        Ok(version)
    }
}

impl fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for EvmVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvmVersion> for String {
    fn from(version: EvmVersion) -> Self {
        version.name().to_string()
    }
}
