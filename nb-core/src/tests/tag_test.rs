use std::cmp::Ordering;

use assertables::*;
use rstest::*;
use semver::Version;

use crate::tag::*;

#[rstest]
fn test_parse_weekly() {
    let parsed = parse("w_2023_14");
    assert_eq!(parsed.tag_type, TagType::Weekly);
    assert_eq!(parsed.display_name, "Weekly 2023_14");
    assert_eq!(parsed.version, Some(Version::new(2023, 14, 0)));
    assert_none!(parsed.cycle);
}

#[rstest]
fn test_parse_release_candidate_with_cycle_and_rest() {
    let parsed = parse("r23_0_0_rc1_c0020.001_20230513");
    assert_eq!(parsed.tag_type, TagType::ReleaseCandidate);
    assert_eq!(parsed.display_name, "Release r23.0.0-rc1 (SAL Cycle 0020, Build 001) [20230513]");

    let version = parsed.version.unwrap();
    assert_eq!((version.major, version.minor, version.patch), (23, 0, 0));
    assert_eq!(version.pre.as_str(), "rc1");
    assert_eq!(version.build.as_str(), "c0020.001.20230513");
    assert_eq!(parsed.cycle, Some(20));
}

#[rstest]
#[case::release("r22_0_1", TagType::Release, "Release r22.0.1", (22, 0, 1))]
#[case::release_cycle("r22_0_1_c0019.001", TagType::Release, "Release r22.0.1 (SAL Cycle 0019, Build 001)", (22, 0, 1))]
#[case::rc("r23_0_0_rc1", TagType::ReleaseCandidate, "Release r23.0.0-rc1", (23, 0, 0))]
#[case::weekly_rest("w_2021_13_nosudo", TagType::Weekly, "Weekly 2021_13 [nosudo]", (2021, 13, 0))]
#[case::daily("d_2021_05_13", TagType::Daily, "Daily 2021_05_13", (2021, 5, 13))]
#[case::legacy("r170", TagType::Release, "Release r17.0.0", (17, 0, 0))]
fn test_parse_known_grammars(
    #[case] tag: &str,
    #[case] expected_type: TagType,
    #[case] expected_name: &str,
    #[case] expected_version: (u64, u64, u64),
) {
    let parsed = parse(tag);
    assert_eq!(parsed.tag_type, expected_type);
    assert_eq!(parsed.display_name, expected_name);
    let version = parsed.version.unwrap();
    assert_eq!((version.major, version.minor, version.patch), expected_version);
}

// Reconstructing the raw grammar from the parsed fields must reproduce the
// original tag for the canonical forms.
#[rstest]
#[case::release("r22_0_1")]
#[case::rc("r23_0_0_rc2")]
#[case::weekly("w_2021_13")]
#[case::daily("d_2021_05_13")]
fn test_round_trip(#[case] tag: &str) {
    let parsed = parse(tag);
    let version = parsed.version.unwrap();
    let rebuilt = match parsed.tag_type {
        TagType::Release => format!("r{}_{}_{}", version.major, version.minor, version.patch),
        TagType::ReleaseCandidate => {
            let rc_num = version.pre.as_str().trim_start_matches("rc");
            format!("r{}_{}_{}_rc{}", version.major, version.minor, version.patch, rc_num)
        },
        TagType::Weekly => format!("w_{}_{}", version.major, version.minor),
        TagType::Daily => format!("d_{}_{:02}_{:02}", version.major, version.minor, version.patch),
        _ => panic!("unexpected tag type"),
    };
    assert_eq!(rebuilt, tag);
}

#[rstest]
fn test_parse_experimental() {
    let parsed = parse("exp_w_2021_05_13_nosudo");
    assert_eq!(parsed.tag_type, TagType::Experimental);
    assert_eq!(parsed.display_name, "Experimental Weekly 2021_05 [13_nosudo]");
    assert_none!(parsed.version);

    let opaque = parse("exp_flattened_build");
    assert_eq!(opaque.tag_type, TagType::Experimental);
    assert_eq!(opaque.display_name, "Experimental flattened_build");
}

#[rstest]
fn test_parse_unknown() {
    let parsed = parse("not_a_thing_we_know");
    assert_eq!(parsed.tag_type, TagType::Unknown);
    assert_eq!(parsed.display_name, "not_a_thing_we_know");
    assert_none!(parsed.version);
}

#[rstest]
fn test_empty_tag_is_latest() {
    let parsed = parse("");
    assert_eq!(parsed.tag, "latest");
}

#[rstest]
#[case::latest("latest")]
#[case::latest_prefixed("latest_daily")]
#[case::configured("recommended")]
fn test_alias_override(#[case] tag: &str) {
    let aliases = vec!["recommended".to_string()];
    let parsed = parse_with_aliases(tag, &aliases);
    assert_eq!(parsed.tag_type, TagType::Alias);
    assert!(!parsed.display_name.is_empty());
}

#[rstest]
fn test_alias_display_name() {
    let parsed = parse_with_aliases("latest_daily", &[]);
    assert_eq!(parsed.display_name, "Latest Daily");
}

#[rstest]
fn test_non_alias_unaffected_by_alias_list() {
    let aliases = vec!["recommended".to_string()];
    let parsed = parse_with_aliases("w_2023_14", &aliases);
    assert_eq!(parsed.tag_type, TagType::Weekly);
}

#[rstest]
fn test_compare_within_type() {
    let older = parse("w_2023_10");
    let newer = parse("w_2023_14");
    assert_eq!(older.compare(&newer).unwrap(), Ordering::Less);
    assert_eq!(newer.compare(&older).unwrap(), Ordering::Greater);
    assert_eq!(newer.compare(&newer.clone()).unwrap(), Ordering::Equal);

    // Release candidates order below the release they are candidates for
    let rc = parse("r23_0_0_rc1");
    let rc2 = parse("r23_0_0_rc2");
    assert_eq!(rc.compare(&rc2).unwrap(), Ordering::Less);
}

#[rstest]
fn test_compare_without_versions_is_lexicographic() {
    let a = parse("exp_aardvark");
    let b = parse("exp_zebra");
    assert_eq!(a.compare(&b).unwrap(), Ordering::Less);
}

#[rstest]
fn test_compare_across_types_fails() {
    let weekly = parse("w_2023_14");
    let daily = parse("d_2023_05_13");
    let err = weekly.compare(&daily).unwrap_err().downcast::<TagError>().unwrap();
    assert!(matches!(err, TagError::IncomparableTypes(_)));
}

// Every parse result must have a non-empty display name, whatever we throw
// at the parser.
#[rstest]
#[case("w_2023_14")]
#[case("r23_0_0_rc1_c0020.001_20230513")]
#[case("exp_")]
#[case("exp_random")]
#[case("latest")]
#[case("r\u{fe0f}weird")]
#[case("")]
fn test_display_name_nonempty(#[case] tag: &str) {
    assert!(!parse(tag).display_name.is_empty());
    assert!(!parse_with_aliases(tag, &[]).display_name.is_empty());
}
