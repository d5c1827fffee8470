//! Juju-style version numbers
//!
//! Agent versions look like `2.8.1`, `2.8.1.3` (with a build number) or
//! `2.8-beta5.6` (tagged pre-release with a build number). Backup metadata
//! stores them either as a plain string or, in older archives, as an
//! object with `Major`/`Minor`/`Tag`/`Patch`/`Build` fields; both forms
//! deserialize to the same `Version`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use super::errors::{CoreResult, Error};

/// A Juju agent version number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    /// Pre-release tag, empty for release versions.
    pub tag: String,
    pub patch: u32,
    pub build: u32,
}

impl Version {
    /// Returns the same version with the build number cleared.
    ///
    /// Compatibility comparisons ignore the build component: `2.8.1.3`
    /// and `2.8.1` refer to the same agent binaries.
    pub fn without_build(&self) -> Version {
        Version {
            build: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        } else {
            write!(f, "{}.{}-{}{}", self.major, self.minor, self.tag, self.patch)?;
        }
        if self.build > 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> CoreResult<Version> {
        let invalid = || Error::InvalidVersion(s.to_string());
        let parts: Vec<&str> = s.split('.').collect();

        let major = parts
            .first()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;

        let second = parts.get(1).ok_or_else(invalid)?;
        let (minor, tag, patch, rest) = match second.split_once('-') {
            Some((minor_str, tagged)) => {
                // The tag is the alphabetic prefix, the patch number follows
                // immediately: "8-beta5" is minor 8, tag "beta", patch 5.
                let minor = minor_str.parse().map_err(|_| invalid())?;
                let digits = tagged.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
                if digits == 0 {
                    return Err(invalid());
                }
                let tag = tagged[..digits].to_string();
                let patch = tagged[digits..].parse().map_err(|_| invalid())?;
                (minor, tag, patch, &parts[2..])
            }
            None => {
                let minor = second.parse().map_err(|_| invalid())?;
                let patch = parts
                    .get(2)
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(invalid)?;
                (minor, String::new(), patch, &parts[3..])
            }
        };

        let build = match rest {
            [] => 0,
            [b] => b.parse().map_err(|_| invalid())?,
            _ => return Err(invalid()),
        };

        Ok(Version {
            major,
            minor,
            tag,
            patch,
            build,
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| compare_tags(&self.tag, &other.tag))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| self.build.cmp(&other.build))
    }
}

// A tagged version precedes the release of the same major.minor:
// 2.8-beta5 < 2.8.0.
fn compare_tags(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Parts {
                #[serde(rename = "Major", default)]
                major: u32,
                #[serde(rename = "Minor", default)]
                minor: u32,
                #[serde(rename = "Tag", default)]
                tag: String,
                #[serde(rename = "Patch", default)]
                patch: u32,
                #[serde(rename = "Build", default)]
                build: u32,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Parts {
                major,
                minor,
                tag,
                patch,
                build,
            } => Ok(Version {
                major,
                minor,
                tag,
                patch,
                build,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(
            parse("2.8.1"),
            Version {
                major: 2,
                minor: 8,
                tag: String::new(),
                patch: 1,
                build: 0
            }
        );
    }

    #[test]
    fn test_parse_with_build() {
        assert_eq!(
            parse("2.7.6.3"),
            Version {
                major: 2,
                minor: 7,
                tag: String::new(),
                patch: 6,
                build: 3
            }
        );
    }

    #[test]
    fn test_parse_tagged() {
        assert_eq!(
            parse("2.8-beta5.6"),
            Version {
                major: 2,
                minor: 8,
                tag: "beta".to_string(),
                patch: 5,
                build: 6
            }
        );
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "2", "2.x.1", "2.8-5", "2.8-beta", "2.8.1.2.3"] {
            assert!(bad.parse::<Version>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["2.8.1", "2.7.6.3", "2.8-beta5.6", "2.8-beta1", "2.9.0"] {
            assert_eq!(parse(text).to_string(), text);
        }
    }

    #[test]
    fn test_without_build() {
        assert_eq!(parse("2.7.6.3").without_build(), parse("2.7.6"));
        assert_eq!(parse("2.8-beta5.6").without_build(), parse("2.8-beta5"));
    }

    #[test]
    fn test_ordering() {
        assert!(parse("2.7.6") < parse("2.8.0"));
        assert!(parse("2.8-beta5") < parse("2.8.0"));
        assert!(parse("2.8-alpha1") < parse("2.8-beta1"));
        assert!(parse("2.8.1") < parse("2.8.1.2"));
        assert_eq!(
            parse("2.7.6.3").without_build(),
            parse("2.7.6.9").without_build()
        );
    }

    #[test]
    fn test_deserialize_string_form() {
        let v: Version = serde_json::from_str(r#""2.8-beta1.1""#).unwrap();
        assert_eq!(v, parse("2.8-beta1.1"));
    }

    #[test]
    fn test_deserialize_object_form() {
        let v: Version =
            serde_json::from_str(r#"{"Major":2,"Minor":8,"Tag":"beta","Patch":1,"Build":1}"#)
                .unwrap();
        assert_eq!(v, parse("2.8-beta1.1"));
    }
}
