use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A flat parameter, metadata or extension value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl Scalar {
    /// Re-types evaluated text: booleans, integers and floats are recognized, anything else stays a string.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            Scalar::Boolean(true)
        } else if trimmed.eq_ignore_ascii_case("false") {
            Scalar::Boolean(false)
        } else if let Ok(value) = trimmed.parse::<i64>() {
            Scalar::Integer(value)
        } else if let Ok(value) = trimmed.parse::<f64>() {
            Scalar::Float(value)
        } else {
            Scalar::String(text.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(value) => Some(*value),
            Scalar::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Scalar::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(value) => Some(*value),
            Scalar::Integer(value) => Some(*value as f64),
            Scalar::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(value) => Some(*value),
            Scalar::String(value) => {
                let value = value.trim();
                if value.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if value.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Integers and floats are seconds; strings may also use `hh:mm:ss` or `d.hh:mm:ss`.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Scalar::Integer(value) if *value >= 0 => Some(Duration::from_secs(*value as u64)),
            Scalar::Float(value) if *value >= 0.0 => Duration::try_from_secs_f64(*value).ok(),
            Scalar::String(value) => parse_duration(value),
            _ => None,
        }
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let (days, clock) = match text.split_once('.') {
        Some((days, rest)) if rest.contains(':') && !days.contains(':') => {
            (days.parse::<u64>().ok()?, rest)
        }
        _ => (0, text),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: u64 = parts[0].parse().ok()?;
    let minutes: u64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Boolean(value) => write!(f, "{}", value),
            Scalar::Integer(value) => write!(f, "{}", value),
            Scalar::Float(value) => write!(f, "{}", value),
            Scalar::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Scalar::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(value as i64)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::Integer(value as i64)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Scalar::Timestamp(value)
    }
}

/// String-keyed map of scalars with case-insensitive lookups.
///
/// The spelling of a key is kept from its first insertion; iteration order is
/// sorted on the case-folded key so it is stable across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: BTreeMap<String, (String, Scalar)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.entries.get(&fold(key)).map(|(_, value)| value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&fold(&key)) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, value)),
            None => {
                self.entries.insert(fold(&key), (key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Scalar> {
        self.entries.remove(&fold(key)).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Scalar)> {
        self.entries
            .values_mut()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(key, _)| key.as_str())
    }

    /// Adds entries from `other` only where the key is absent here.
    pub fn merge_missing(&mut self, other: &ParameterMap) {
        for (key, value) in other.iter() {
            if !self.contains_key(key) {
                self.insert(key, value.clone());
            }
        }
    }

    /// Adds every entry from `other`, overwriting values on key collision.
    pub fn merge_override(&mut self, other: &ParameterMap) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| value.to_string())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Scalar::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Scalar::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Scalar::as_f64)
    }

    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        self.get(key).and_then(Scalar::as_duration)
    }
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for ParameterMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = ParameterMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for ParameterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for ParameterMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, Scalar> = BTreeMap::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}
