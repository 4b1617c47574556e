//! Domain types shared across the switcher.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps request logs sortable.
///
/// # Example
///
/// ```
/// use switcher_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID, e.g. one propagated by a caller.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical deployment environment name such as `prod` or `staging`.
///
/// Opaque apart from being non-empty.
///
/// # Example
///
/// ```
/// use switcher_core::EnvName;
///
/// assert!(EnvName::new("prod").is_some());
/// assert!(EnvName::new("").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvName(String);

impl EnvName {
    /// Creates an environment name, returning `None` when `name` is empty.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EnvName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EnvName {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("environment name must not be empty")
    }
}

impl From<EnvName> for String {
    fn from(name: EnvName) -> Self {
        name.0
    }
}

/// A validated, absolute artifact URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactUrl(url::Url);

impl ArtifactUrl {
    /// Parses an absolute URL.
    ///
    /// # Example
    ///
    /// ```
    /// use switcher_core::ArtifactUrl;
    ///
    /// let url = ArtifactUrl::parse("https://example.com/a.html").unwrap();
    /// assert_eq!(url.as_str(), "https://example.com/a.html");
    /// assert!(ArtifactUrl::parse("a.html").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        url::Url::parse(raw).map(Self)
    }

    /// Returns the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the parsed URL.
    #[must_use]
    pub fn as_url(&self) -> &url::Url {
        &self.0
    }
}

impl fmt::Display for ArtifactUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// The single URL currently bound to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// The environment being bound.
    pub env: EnvName,
    /// The raw URL string as persisted.
    pub url: String,
}

/// How a delivery route turns a resolved URL into a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Resolve only; attach the URL for a downstream stage.
    Defer,
    /// Pipe the upstream body to the client as it arrives.
    #[default]
    Stream,
    /// Serve from the in-process content cache, filling it on miss.
    Cache,
    /// Fetch, substitute the hydration marker, and send.
    Hydrate,
}

impl DeliveryMode {
    /// Returns the lowercase mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Defer => "defer",
            Self::Stream => "stream",
            Self::Cache => "cache",
            Self::Hydrate => "hydrate",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "defer" => Ok(Self::Defer),
            "stream" => Ok(Self::Stream),
            "cache" => Ok(Self::Cache),
            "hydrate" => Ok(Self::Hydrate),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// Caller-supplied key/value data substituted into fetched artifacts.
///
/// Backed by a `BTreeMap` so serialization order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HydrationPayload(BTreeMap<String, String>);

impl HydrationPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, returning the payload for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes the payload as a JSON object with keys in sorted order.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A map of strings to strings always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl<K, V> FromIterator<(K, V)> for HydrationPayload
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
