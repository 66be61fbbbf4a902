//! Parser for the Rubin Science Platform lab image tag grammar
//! (https://sqr-059.lsst.io): typed, orderable tag metadata extracted from
//! raw Docker tag strings.

use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;
use semver::{
    BuildMetadata,
    Prerelease,
    Version,
};

use crate::constants::DOCKER_DEFAULT_TAG;
use crate::errors::*;

err_impl! {TagError,
    #[error("cannot compare tags of different types: {0}")]
    IncomparableTypes(String),
}

/// Tag types, declared in significance order: when one image carries tags
/// of several types, the lowest-ordinal one names the image (a release
/// outranks its candidates, which outrank weeklies, and so on).  Tags of
/// different types are never comparable with each other.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TagType {
    Release,
    ReleaseCandidate,
    Weekly,
    Daily,
    Experimental,
    Alias,
    Unknown,
}

// Raw building blocks for the tag grammars; these get mixed and matched
// below.  Named capture groups keep the extraction code legible.
const RELEASE: &str = r"r(?P<major>\d+)_(?P<minor>\d+)_(?P<patch>\d+)"; // r22_0_1
const RC: &str = r"r(?P<major>\d+)_(?P<minor>\d+)_(?P<patch>\d+)_rc(?P<pre>\d+)"; // r23_0_0_rc1
const WEEKLY: &str = r"w_(?P<year>\d+)_(?P<week>\d+)"; // w_2021_13
const DAILY: &str = r"d_(?P<year>\d+)_(?P<month>\d+)_(?P<day>\d+)"; // d_2021_05_13
const CYCLE: &str = r"_(?P<ctag>c|csal)(?P<cycle>\d+)\.(?P<cbuild>\d+)"; // _c0020.002
const REST: &str = r"_(?P<rest>.*)"; // _whatever_your_little_heart_desires

fn anchored(parts: &[&str]) -> Regex {
    Regex::new(&format!("^{}$", parts.concat())).unwrap()
}

lazy_static! {
    // The heart of the parser: an ordered list of (type, pattern) pairs,
    // matched top to bottom.  Release candidates must precede releases,
    // because an RC is a release tag with a non-empty remainder; likewise
    // every cycle-bearing pattern precedes its cycleless equivalent.
    static ref TAG_TYPE_REGEXES: Vec<(TagType, Regex)> = vec![
        // r23_0_0_rc1_c0020.001_20210513
        (TagType::ReleaseCandidate, anchored(&[RC, CYCLE, REST])),
        // r23_0_0_rc1_c0020.001
        (TagType::ReleaseCandidate, anchored(&[RC, CYCLE])),
        // r23_0_0_rc1_20210513
        (TagType::ReleaseCandidate, anchored(&[RC, REST])),
        // r23_0_0_rc1
        (TagType::ReleaseCandidate, anchored(&[RC])),
        // r22_0_1_c0019.001_20210513
        (TagType::Release, anchored(&[RELEASE, CYCLE, REST])),
        // r22_0_1_c0019.001
        (TagType::Release, anchored(&[RELEASE, CYCLE])),
        // r22_0_1_20210513
        (TagType::Release, anchored(&[RELEASE, REST])),
        // r22_0_1
        (TagType::Release, anchored(&[RELEASE])),
        // r170 (obsolete form; no new ones, no additional parts)
        (TagType::Release, anchored(&[r"r(?P<major>\d\d)(?P<minor>\d)"])),
        // w_2021_13_c0020.001_20210513
        (TagType::Weekly, anchored(&[WEEKLY, CYCLE, REST])),
        // w_2021_13_c0020.001
        (TagType::Weekly, anchored(&[WEEKLY, CYCLE])),
        // w_2021_13_20210513
        (TagType::Weekly, anchored(&[WEEKLY, REST])),
        // w_2021_13
        (TagType::Weekly, anchored(&[WEEKLY])),
        // d_2021_05_13_c0019.001_20210513
        (TagType::Daily, anchored(&[DAILY, CYCLE, REST])),
        // d_2021_05_13_c0019.001
        (TagType::Daily, anchored(&[DAILY, CYCLE])),
        // d_2021_05_13_20210513
        (TagType::Daily, anchored(&[DAILY, REST])),
        // d_2021_05_13
        (TagType::Daily, anchored(&[DAILY])),
        // exp_w_2021_05_13_nosudo
        (TagType::Experimental, anchored(&[r"exp", REST])),
    ];

    // Semver build metadata may only contain alphanumerics and dots
    static ref NON_BUILD_CHARS: Regex = Regex::new(r"[^\w.]+").unwrap();
}

/// Everything we can know about an image tag from the tag string alone,
/// plus the alias knowledge merged in by [`parse_with_aliases`].
#[derive(Clone, Debug)]
pub struct ImageTag {
    /// The raw tag, e.g. `w_2021_22`.
    pub tag: String,

    pub tag_type: TagType,

    /// Human-readable display name, e.g. `Weekly 2021_22`.
    pub display_name: String,

    /// Semantic version constructed from the tag.  Only extant for the
    /// daily, weekly, release, and release-candidate types, and only
    /// meaningful for comparison within a type.
    pub version: Option<Version>,

    /// XML cycle for T&S builds.
    pub cycle: Option<i32>,
}

pub fn parse(raw: &str) -> ImageTag {
    // Docker convention: the empty tag means "latest"
    let tag = if raw.is_empty() { DOCKER_DEFAULT_TAG } else { raw };
    for (tag_type, regexp) in TAG_TYPE_REGEXES.iter() {
        if let Some(caps) = regexp.captures(tag) {
            let (display_name, version, cycle) = extract_metadata(&caps, tag, *tag_type);
            return ImageTag {
                tag: tag.into(),
                tag_type: *tag_type,
                display_name,
                version,
                cycle,
            };
        }
    }

    ImageTag {
        tag: tag.into(),
        tag_type: TagType::Unknown,
        display_name: tag.into(),
        version: None,
        cycle: None,
    }
}

/// Parse a tag and then apply alias knowledge: tags named in configuration,
/// `latest`, and `latest_*` are forced to the alias type and get a
/// title-cased display name.
pub fn parse_with_aliases(raw: &str, alias_tags: &[String]) -> ImageTag {
    let mut parsed = parse(raw);
    if alias_tags.iter().any(|a| a == &parsed.tag)
        || parsed.tag == DOCKER_DEFAULT_TAG
        || parsed.tag.starts_with("latest_")
    {
        parsed.tag_type = TagType::Alias;
        parsed.display_name = prettify(&parsed.tag);
    }
    parsed
}

/// Turn a (possibly underscore-separated) tag into space-separated title
/// case, e.g. `latest_daily` -> `Latest Daily`.
pub fn prettify(tag: &str) -> String {
    tag.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

impl ImageTag {
    /// Compare two tags of the same type; comparing across types is an
    /// error, since the ordering is only meaningful within a type.
    pub fn compare(&self, other: &ImageTag) -> anyhow::Result<Ordering> {
        if self.tag_type != other.tag_type {
            bail!(TagError::incomparable_types(&format!(
                "'{}' is {:?} but '{}' is {:?}",
                self.tag, self.tag_type, other.tag, other.tag_type
            )));
        }
        Ok(self.cmp_within_type(other))
    }

    /// The within-type ordering: semantic versions when both tags carry
    /// one, raw tag strings otherwise (which is all we can do for
    /// experimental, alias, and unknown tags).
    pub fn cmp_within_type(&self, other: &ImageTag) -> Ordering {
        match (&self.version, &other.version) {
            (Some(mine), Some(theirs)) => mine.cmp(theirs),
            _ => self.tag.cmp(&other.tag),
        }
    }

    /// True for types that identify a concrete build: not an alias, not
    /// unrecognized.
    pub fn is_recognized(&self) -> bool {
        !matches!(self.tag_type, TagType::Alias | TagType::Unknown)
    }
}

impl PartialEq for ImageTag {
    fn eq(&self, other: &ImageTag) -> bool {
        self.tag_type == other.tag_type && self.cmp_within_type(other) == Ordering::Equal
    }
}

fn extract_metadata(caps: &regex::Captures, tag: &str, tag_type: TagType) -> (String, Option<Version>, Option<i32>) {
    let ctag = caps.name("ctag").map(|m| m.as_str());
    let cycle = caps.name("cycle").map(|m| m.as_str());
    let cbuild = caps.name("cbuild").map(|m| m.as_str());
    let rest = caps.name("rest").map(|m| m.as_str());

    match tag_type {
        TagType::Experimental => {
            // The build process usually produces exp_<other-legal-tag>, so
            // recursively parse the remainder for its display name; if the
            // remainder isn't a legal tag itself, this falls through to the
            // unknown type and we just get the remainder back.
            let display_name = match rest {
                Some(r) => format!("Experimental {}", parse(r).display_name),
                None => tag.into(),
            };
            (display_name, None, None)
        },

        TagType::Release | TagType::ReleaseCandidate | TagType::Weekly | TagType::Daily => {
            let (major, minor, patch, pre, restname) = match tag_type {
                TagType::Release | TagType::ReleaseCandidate => {
                    let major = capture_num(caps, "major");
                    let minor = capture_num(caps, "minor");
                    // The legacy two-digit form has no patch component
                    let patch = capture_num(caps, "patch").or(Some(0));
                    let pre = caps.name("pre").map(|m| format!("rc{}", m.as_str()));
                    let mut restname = format!(
                        "r{}.{}.{}",
                        fmt_part(major),
                        fmt_part(minor),
                        fmt_part(patch)
                    );
                    if let Some(p) = &pre {
                        restname += &format!("-{p}");
                    }
                    (major, minor, patch, pre, restname)
                },
                TagType::Weekly => {
                    let year = caps.name("year").map_or("", |m| m.as_str());
                    let week = caps.name("week").map_or("", |m| m.as_str());
                    // Preserve the initial string format in the display name
                    (capture_num(caps, "year"), capture_num(caps, "week"), Some(0), None, format!("{year}_{week}"))
                },
                TagType::Daily => {
                    let year = caps.name("year").map_or("", |m| m.as_str());
                    let month = caps.name("month").map_or("", |m| m.as_str());
                    let day = caps.name("day").map_or("", |m| m.as_str());
                    (
                        capture_num(caps, "year"),
                        capture_num(caps, "month"),
                        capture_num(caps, "day"),
                        None,
                        format!("{year}_{month}_{day}"),
                    )
                },
                _ => unreachable!(),
            };

            let build = trailing_parts_to_build(ctag, cycle, cbuild, rest);
            let version = build_version(major, minor, patch, pre.as_deref(), build.as_deref());

            // Both release forms display as "Release"; the -rcN suffix is
            // already part of restname.
            let typename = match tag_type {
                TagType::Release | TagType::ReleaseCandidate => "Release",
                TagType::Weekly => "Weekly",
                TagType::Daily => "Daily",
                _ => unreachable!(),
            };
            let mut display_name = format!("{typename} {restname}");
            if let (Some(c), Some(b)) = (cycle, cbuild) {
                display_name += &format!(" (SAL Cycle {c}, Build {b})");
            }
            if let Some(r) = rest {
                display_name += &format!(" [{r}]");
            }

            let cycle_int = cycle.and_then(|c| c.parse().ok());
            (display_name, version, cycle_int)
        },

        TagType::Alias | TagType::Unknown => (tag.into(), None, None),
    }
}

fn capture_num(caps: &regex::Captures, name: &str) -> Option<u64> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn fmt_part(part: Option<u64>) -> String {
    part.map_or_else(|| "?".into(), |n| n.to_string())
}

// Massage the cycle components and the free-form remainder into a
// semver-compatible build string: dot-separated, alphanumerics only.  The
// cycle always precedes the remainder.
fn trailing_parts_to_build(
    ctag: Option<&str>,
    cycle: Option<&str>,
    cbuild: Option<&str>,
    rest: Option<&str>,
) -> Option<String> {
    let combined = match (ctag, cycle, cbuild) {
        (Some(ct), Some(c), Some(cb)) => match rest {
            Some(r) => format!("{ct}{c}.{cb}_{r}"),
            None => format!("{ct}{c}.{cb}"),
        },
        _ => rest?.into(),
    };

    let cleaned = NON_BUILD_CHARS.replace_all(&combined.replace('_', "."), "").to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn build_version(
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Option<&str>,
    build: Option<&str>,
) -> Option<Version> {
    // A tag without extractable version fields is allowed; it just can't be
    // version-compared.  Unparseable build metadata is dropped rather than
    // invalidating the whole version.
    Some(Version {
        major: major?,
        minor: minor?,
        patch: patch?,
        pre: match pre {
            Some(p) => Prerelease::new(p).ok()?,
            None => Prerelease::EMPTY,
        },
        build: build.and_then(|b| BuildMetadata::new(b).ok()).unwrap_or(BuildMetadata::EMPTY),
    })
}
