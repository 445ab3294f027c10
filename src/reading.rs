use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ALERT", alias = "ALERTA")]
    Alert,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Alert => write!(f, "ALERT"),
        }
    }
}

/// A single reading of one sensor. Display fields are kept as the strings
/// they are shown with; nothing does arithmetic on them after acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: u32,
    #[serde(deserialize_with = "display_string")]
    pub temperature: String,
    #[serde(deserialize_with = "display_string")]
    pub humidity: String,
    pub location: String,
    pub status: Status,
    pub last_updated: String,
    #[serde(deserialize_with = "display_string")]
    pub battery: String,
    #[serde(deserialize_with = "display_string")]
    pub co2: String,
}

// Accepts a JSON number where a display string is expected and keeps its
// literal text, so `22.50` stays `"22.50"`.
fn display_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    let text = raw.get().trim();

    if text.starts_with('"') {
        return serde_json::from_str::<String>(text).map_err(serde::de::Error::custom);
    }
    if serde_json::from_str::<serde_json::Number>(text).is_ok() {
        return Ok(text.to_string());
    }
    Err(serde::de::Error::custom(format!(
        "expected string or number, got {text}"
    )))
}
