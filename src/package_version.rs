// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling.

Implements parsing and ordering of Debian package versions with the semantics
of `dpkg --compare-versions`, as defined at
<https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
*/

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// The concise format is `[epoch:]upstream_version[-debian_revision]` and
/// each component has rules about what characters are allowed. Ordering
/// follows Debian policy: the epoch is compared numerically, then the
/// upstream version and Debian revision are compared with the alternating
/// non-digit/digit algorithm implemented by [compare_segment()].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // The epoch is everything up to the first colon, if any. The Debian
        // revision is everything after the last hyphen, if any.
        let (epoch, remainder) = match s.find(':') {
            Some(pos) => (Some(&s[0..pos]), &s[pos + 1..]),
            None => (None, s),
        };

        let (upstream, revision) = match remainder.rfind('-') {
            Some(pos) => (&remainder[0..pos], Some(&remainder[pos + 1..])),
            None => (remainder, None),
        };

        let epoch = match epoch {
            Some(epoch) => {
                if !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(VersionError::EpochNonNumeric(s.to_string()));
                }

                Some(u32::from_str(epoch)?)
            }
            None => None,
        };

        // The upstream version may contain only alphanumerics and the
        // characters . + ~, plus hyphens when a Debian revision is present.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => revision.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        let debian_revision = match revision {
            Some(revision) => {
                if !revision.chars().all(|c| match c {
                    c if c.is_ascii_alphanumeric() => true,
                    '.' | '+' | '~' => true,
                    _ => false,
                }) {
                    return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
                }

                Some(revision.to_string())
            }
            None => None,
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision,
        })
    }

    /// The `epoch` component of the version string.
    ///
    /// Only `Some` if defined explicitly.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// Effective value of the `epoch` component, defaulting to `0`.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// `upstream_version` component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    ///
    /// Local forks of a package mark themselves here.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.upstream_version)?;

        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}

impl PartialOrd<Self> for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_segment(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                // A missing Debian revision is equivalent to `0`.
                compare_segment(
                    self.debian_revision.as_deref().unwrap_or("0"),
                    other.debian_revision.as_deref().unwrap_or("0"),
                )
            })
    }
}

/// Compare two version strings under Debian ordering rules.
///
/// Convenience wrapper for call sites that hold raw version strings. Parse
/// failures surface as [VersionError] so callers can decide whether a
/// malformed version is fatal or merely means "cannot compare".
pub fn compare_version_strings(a: &str, b: &str) -> Result<Ordering> {
    Ok(PackageVersion::parse(a)?.cmp(&PackageVersion::parse(b)?))
}

/// Extract the Debian revision from a raw version string.
///
/// Returns the substring after the last `-`, or the empty string for native
/// package versions that have no revision. Unlike
/// [PackageVersion::debian_revision()] this performs no validation and never
/// fails, which makes it suitable for scanning version strings of unknown
/// quality.
pub fn version_revision(version: &str) -> &str {
    match version.rfind('-') {
        Some(pos) => &version[pos + 1..],
        None => "",
    }
}

/// Sort weight of a character in the modified lexical ordering.
///
/// All letters sort before all non-letters and a tilde sorts before
/// anything, even the end of a segment (weight 0 for a missing character).
fn char_weight(c: Option<char>) -> i64 {
    match c {
        None => 0,
        Some('~') => -1,
        Some(c) if c.is_ascii_alphabetic() => c as i64,
        Some(c) => c as i64 + 0x100,
    }
}

fn compare_nondigits(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        let (a_char, b_char) = (a_chars.next(), b_chars.next());

        if a_char.is_none() && b_char.is_none() {
            return Ordering::Equal;
        }

        match char_weight(a_char).cmp(&char_weight(b_char)) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }
    }
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    // Compare numerically without parsing to a machine integer, since
    // nothing bounds the length of a digit run in a version string. With
    // leading zeroes stripped, a longer run is a larger number and
    // equal-length runs compare lexically.
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');

    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn split_leading<F>(s: &str, pred: F) -> (&str, &str)
where
    F: Fn(char) -> bool,
{
    match s.chars().position(|c| !pred(c)) {
        Some(pos) => (&s[0..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Compare one version segment (upstream version or Debian revision).
///
/// Both inputs are repeatedly split into a leading non-digit run, compared
/// with the modified lexical ordering, and a leading digit run, compared
/// numerically, until a difference is found or both are exhausted.
fn compare_segment(a: &str, b: &str) -> Ordering {
    let mut a_remaining = a;
    let mut b_remaining = b;

    loop {
        let (a_nondigits, a_rest) = split_leading(a_remaining, |c| !c.is_ascii_digit());
        let (b_nondigits, b_rest) = split_leading(b_remaining, |c| !c.is_ascii_digit());

        match compare_nondigits(a_nondigits, b_nondigits) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        let (a_digits, a_rest) = split_leading(a_rest, |c| c.is_ascii_digit());
        let (b_digits, b_rest) = split_leading(b_rest, |c| c.is_ascii_digit());

        match compare_digits(a_digits, b_digits) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        if a_rest.is_empty() && b_rest.is_empty() {
            return Ordering::Equal;
        }

        a_remaining = a_rest;
        b_remaining = b_rest;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        assert_eq!(
            PackageVersion::parse("1:4.7.0+dfsg1-2")?,
            PackageVersion {
                epoch: Some(1),
                upstream_version: "4.7.0+dfsg1".into(),
                debian_revision: Some("2".into()),
            }
        );
        assert_eq!(
            PackageVersion::parse("3.3.2.final~github")?,
            PackageVersion {
                epoch: None,
                upstream_version: "3.3.2.final~github".into(),
                debian_revision: None,
            }
        );
        assert_eq!(
            PackageVersion::parse("0.18.0+dfsg-2+b1")?,
            PackageVersion {
                epoch: None,
                upstream_version: "0.18.0+dfsg".into(),
                debian_revision: Some("2+b1".into()),
            }
        );

        assert!(matches!(
            PackageVersion::parse("abc:1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0_1"),
            Err(VersionError::UpstreamVersionIllegalChar(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0-1_0"),
            Err(VersionError::DebianRevisionIllegalChar(_))
        ));

        Ok(())
    }

    #[test]
    fn format_roundtrip() -> Result<()> {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~github", "0.18.0+dfsg-2+b1"] {
            assert_eq!(format!("{}", PackageVersion::parse(s)?), s);
        }

        Ok(())
    }

    #[test]
    fn tilde_sorts_before_everything() {
        assert_eq!(
            compare_segment("1.0~beta1~svn1245", "1.0~beta1"),
            Ordering::Less
        );
        assert_eq!(compare_segment("1.0~beta1", "1.0"), Ordering::Less);
        assert_eq!(compare_segment("1.0~rc1", "1.0"), Ordering::Less);
    }

    #[test]
    fn letters_sort_before_nonletters() {
        assert_eq!(compare_segment("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(compare_segment("1.0+", "1.0a"), Ordering::Greater);
    }

    #[test]
    fn digit_runs_compare_numerically() {
        assert_eq!(compare_segment("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_segment("1.09", "1.9"), Ordering::Equal);
        // Digit runs longer than any machine integer still compare.
        assert_eq!(
            compare_segment("1.184467440737095516160", "1.184467440737095516159"),
            Ordering::Greater
        );
    }

    #[test]
    fn ordering() -> Result<()> {
        let ordered = [
            "1.0~beta1~svn1245",
            "1.0~beta1",
            "1.0",
            "1.0-1",
            "1.0-1tanglu1",
            "1.0-2",
            "1.2-1",
            "1:0.5-1",
        ];

        for pair in ordered.windows(2) {
            assert_eq!(
                compare_version_strings(pair[0], pair[1])?,
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }

        assert_eq!(compare_version_strings("2.0-1", "2.0-1")?, Ordering::Equal);
        // A missing revision counts as `0`.
        assert_eq!(compare_version_strings("2.0", "2.0-1")?, Ordering::Less);

        Ok(())
    }

    #[test]
    fn revision_extraction() {
        assert_eq!(version_revision("2.0-0tanglu1"), "0tanglu1");
        assert_eq!(version_revision("0.18.0+dfsg-2+b1"), "2+b1");
        assert_eq!(version_revision("3.3.2.final~github"), "");
        assert_eq!(version_revision("1:1.0-2"), "2");
    }
}
