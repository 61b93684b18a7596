// deployer/src/settings.rs

use crate::{DeployError, DeployResult};
use ethers_core::types::U256;
use ethers_core::utils::parse_units;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Value of a `gas_price` / `gas_limit` network setting.
///
/// `Fixed(0)` is a real value and stays distinct from `Auto` and `Unset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GasSetting {
    /// Use this value
    Fixed(U256),
    /// Ask the node (`true`, `false` or `"auto"` in configuration)
    Auto,
    /// Nothing configured, behaves like `Auto`
    #[default]
    Unset,
}

impl GasSetting {
    pub fn fixed(value: impl Into<U256>) -> Self {
        GasSetting::Fixed(value.into())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, GasSetting::Unset)
    }

    /// Configured value, if any
    pub fn value(&self) -> Option<U256> {
        match self {
            GasSetting::Fixed(value) => Some(*value),
            GasSetting::Auto | GasSetting::Unset => None,
        }
    }

    /// Parse an amount: decimal, `0x` hex, or with a unit (`"10 gwei"`)
    pub fn parse_amount(text: &str) -> DeployResult<U256> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x") {
            return U256::from_str_radix(hex, 16)
                .map_err(|e| DeployError::InvalidSetting(format!("{}: {}", text, e)));
        }
        if let Ok(value) = U256::from_dec_str(text) {
            return Ok(value);
        }

        let mut parts = text.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(amount), Some(unit), None) => parse_units(amount, unit.to_lowercase().as_str())
                .map(U256::from)
                .map_err(|e| DeployError::InvalidSetting(format!("{}: {}", text, e))),
            _ => Err(DeployError::InvalidSetting(format!(
                "Expected a number, a number with a unit, or \"auto\": {}",
                text
            ))),
        }
    }
}

impl FromStr for GasSetting {
    type Err = DeployError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_lowercase().as_str() {
            "auto" | "true" | "false" => Ok(GasSetting::Auto),
            "" | "null" | "none" => Ok(GasSetting::Unset),
            _ => Self::parse_amount(text).map(GasSetting::Fixed),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSetting {
    Flag(bool),
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for GasSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<RawSetting>::deserialize(deserializer)? {
            None => Ok(GasSetting::Unset),
            Some(RawSetting::Flag(_)) => Ok(GasSetting::Auto),
            Some(RawSetting::Number(value)) => Ok(GasSetting::Fixed(U256::from(value))),
            Some(RawSetting::Text(text)) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for GasSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GasSetting::Fixed(value) if *value <= U256::from(u64::MAX) => {
                serializer.serialize_u64(value.as_u64())
            }
            GasSetting::Fixed(value) => serializer.serialize_str(&value.to_string()),
            GasSetting::Auto => serializer.serialize_str("auto"),
            GasSetting::Unset => serializer.serialize_none(),
        }
    }
}

/// Gas limit used when estimation fails because the transaction reverts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevertingGasLimit {
    /// Surface the estimation failure
    #[default]
    Disabled,
    /// Use the block gas limit
    Max,
    Fixed(U256),
}

impl<'de> Deserialize<'de> for RevertingGasLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<RawSetting>::deserialize(deserializer)? {
            None | Some(RawSetting::Flag(false)) => Ok(RevertingGasLimit::Disabled),
            Some(RawSetting::Flag(true)) => Ok(RevertingGasLimit::Max),
            Some(RawSetting::Number(value)) => Ok(RevertingGasLimit::Fixed(U256::from(value))),
            Some(RawSetting::Text(text)) => match text.trim().to_lowercase().as_str() {
                "max" => Ok(RevertingGasLimit::Max),
                "false" | "none" => Ok(RevertingGasLimit::Disabled),
                _ => GasSetting::parse_amount(&text)
                    .map(RevertingGasLimit::Fixed)
                    .map_err(serde::de::Error::custom),
            },
        }
    }
}

impl Serialize for RevertingGasLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RevertingGasLimit::Disabled => serializer.serialize_bool(false),
            RevertingGasLimit::Max => serializer.serialize_str("max"),
            RevertingGasLimit::Fixed(value) => GasSetting::Fixed(*value).serialize(serializer),
        }
    }
}

/// Per-network gas policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    #[serde(skip_serializing_if = "GasSetting::is_unset")]
    pub gas_price: GasSetting,
    #[serde(skip_serializing_if = "GasSetting::is_unset")]
    pub gas_limit: GasSetting,
    pub reverting_tx_gas_limit: RevertingGasLimit,
}

impl NetworkSettings {
    /// Defaults for a local development chain: reverting transactions are
    /// still broadcast so they produce a receipt
    pub fn development() -> Self {
        Self {
            reverting_tx_gas_limit: RevertingGasLimit::Max,
            ..Default::default()
        }
    }
}

/// Process-wide settings of the active network, mutable at runtime
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<NetworkSettings>>,
}

impl SharedSettings {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings
    pub async fn get(&self) -> NetworkSettings {
        self.inner.read().await.clone()
    }

    pub async fn set_gas_price(&self, setting: GasSetting) {
        self.inner.write().await.gas_price = setting;
        tracing::debug!("gas_price setting now {:?}", setting);
    }

    pub async fn set_gas_limit(&self, setting: GasSetting) {
        self.inner.write().await.gas_limit = setting;
        tracing::debug!("gas_limit setting now {:?}", setting);
    }

    pub async fn update(&self, f: impl FnOnce(&mut NetworkSettings)) {
        f(&mut *self.inner.write().await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(json: serde_json::Value) -> GasSetting {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_sentinels_map_to_auto() {
        assert_eq!(setting(serde_json::json!(true)), GasSetting::Auto);
        assert_eq!(setting(serde_json::json!(false)), GasSetting::Auto);
        assert_eq!(setting(serde_json::json!("auto")), GasSetting::Auto);
        assert_eq!(setting(serde_json::json!("AUTO")), GasSetting::Auto);
        assert_eq!(setting(serde_json::json!(null)), GasSetting::Unset);
    }

    #[test]
    fn test_zero_is_fixed() {
        assert_eq!(setting(serde_json::json!(0)), GasSetting::fixed(0));
        assert_eq!(setting(serde_json::json!("0")), GasSetting::fixed(0));
        assert_ne!(setting(serde_json::json!(0)), GasSetting::Unset);
    }

    #[test]
    fn test_amounts_with_units() {
        assert_eq!(
            setting(serde_json::json!("10 gwei")),
            GasSetting::fixed(10_000_000_000u64)
        );
        assert_eq!(setting(serde_json::json!("0x32")), GasSetting::fixed(50));
        assert_eq!(setting(serde_json::json!(5_000_000)), GasSetting::fixed(5_000_000));
        assert!(serde_json::from_value::<GasSetting>(serde_json::json!("lots")).is_err());
    }

    #[test]
    fn test_absent_keys_are_unset() {
        let settings: NetworkSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(settings, NetworkSettings::default());
        assert!(settings.gas_price.is_unset());
        assert_eq!(settings.reverting_tx_gas_limit, RevertingGasLimit::Disabled);
    }

    #[test]
    fn test_reverting_gas_limit_values() {
        let parse = |json| serde_json::from_value::<RevertingGasLimit>(json).unwrap();

        assert_eq!(parse(serde_json::json!("max")), RevertingGasLimit::Max);
        assert_eq!(parse(serde_json::json!(false)), RevertingGasLimit::Disabled);
        assert_eq!(
            parse(serde_json::json!(6_000_000)),
            RevertingGasLimit::Fixed(U256::from(6_000_000))
        );
    }

    #[test]
    fn test_settings_serialize_round_trip() {
        let settings = NetworkSettings {
            gas_price: GasSetting::fixed(0),
            gas_limit: GasSetting::Auto,
            reverting_tx_gas_limit: RevertingGasLimit::Max,
        };
        let json = serde_json::to_value(&settings).unwrap();

        assert_eq!(json["gas_price"], 0);
        assert_eq!(json["gas_limit"], "auto");
        assert_eq!(serde_json::from_value::<NetworkSettings>(json).unwrap(), settings);
    }

    #[tokio::test]
    async fn test_shared_settings_are_shared() {
        let settings = SharedSettings::new(NetworkSettings::development());
        let view = settings.clone();

        settings.set_gas_price(GasSetting::fixed(50)).await;
        assert_eq!(view.get().await.gas_price, GasSetting::fixed(50));

        view.update(|s| s.gas_limit = GasSetting::Auto).await;
        assert_eq!(settings.get().await.gas_limit, GasSetting::Auto);
    }
}
