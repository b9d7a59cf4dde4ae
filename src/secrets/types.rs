//! Redacting wrapper for provider tokens.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "[REDACTED]";

/// Number of trailing characters [`SecretString::hint`] reveals.
const HINT_CHARS: usize = 4;

/// A token that never prints itself.
///
/// `Debug`, `Display` and `Serialize` all emit `[REDACTED]`. Records that must
/// persist the real value opt in field by field with [`serialize_exposed`].
/// The buffer is zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw token. Only for request headers and storage.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last few characters, masked, for telling tokens apart in logs.
    /// Tokens too short to mask safely are fully redacted.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= HINT_CHARS * 2 {
            return REDACTED.to_string();
        }
        let tail: String = chars[chars.len() - HINT_CHARS..].iter().collect();
        format!("****{}", tail)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretString").field(&format_args!("{}", REDACTED)).finish()
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// `serialize_with` hook writing the real value. Host storage encrypts
/// records at rest; response types must never use this.
pub fn serialize_exposed<S: Serializer>(
    secret: &SecretString,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_never_prints() {
        let token = SecretString::new("root-api-token");

        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"[REDACTED]\"");
    }

    #[test]
    fn test_serialize_exposed_writes_real_value() {
        #[derive(Serialize)]
        struct Stored {
            #[serde(serialize_with = "serialize_exposed")]
            token: SecretString,
        }

        let json = serde_json::to_string(&Stored { token: SecretString::new("T1") }).unwrap();
        assert_eq!(json, r#"{"token":"T1"}"#);
    }

    #[test]
    fn test_deserialize_keeps_value() {
        let token: SecretString = serde_json::from_str("\"packet-token\"").unwrap();
        assert_eq!(token.expose_secret(), "packet-token");
    }

    #[test]
    fn test_hint() {
        assert_eq!(SecretString::new("abcdefghijklmnop").hint(), "****mnop");
        assert_eq!(SecretString::new("short").hint(), "[REDACTED]");
        assert_eq!(SecretString::new("").hint(), "[REDACTED]");
    }
}
