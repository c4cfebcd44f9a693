//! Social platforms a post can be published to.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A supported publishing destination.
///
/// Stored and serialized in lowercase (`youtube`, `tiktok`, ...).
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Youtube,
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }

    /// Instagram and Facebook pull the video from a public URL instead of
    /// receiving the bytes.
    pub fn needs_public_url(&self) -> bool {
        matches!(self, Platform::Instagram | Platform::Facebook)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlatform(pub String);

impl fmt::Display for UnknownPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported platform `{}`", self.0)
    }
}

impl std::error::Error for UnknownPlatform {}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("YouTube".parse::<Platform>(), Ok(Platform::Youtube));
        assert_eq!(" tiktok ".parse::<Platform>(), Ok(Platform::Tiktok));
        assert_eq!("FACEBOOK".parse::<Platform>(), Ok(Platform::Facebook));
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported platform `myspace`");
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&[Platform::Instagram, Platform::Youtube]).unwrap();
        assert_eq!(json, r#"["instagram","youtube"]"#);
    }
}
