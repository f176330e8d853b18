//! Unit tests for the quirks table.

use rstest::rstest;

use super::*;

fn v(text: &str) -> Version {
    Version::parse(text).expect("valid version")
}

fn bounded() -> QuirkRule {
    QuirkRule::new("legacy-quiz", QuirkBehaviour::SkipReadinessWait)
        .with_min_version(v("1.0.0"))
        .with_max_version(v("1.4.0"))
}

#[rstest]
#[case::lower_bound("1.0.0", true)]
#[case::inside("1.2.7", true)]
#[case::upper_bound("1.4.0", true)]
#[case::upper_bound_pre_release("1.4.0-beta", true)]
#[case::above("1.4.1", false)]
#[case::below("0.9.9", false)]
fn bounds_are_inclusive(#[case] version: &str, #[case] expected: bool) {
    assert_eq!(bounded().matches("legacy-quiz", &v(version)), expected);
}

#[test]
fn rule_is_scoped_to_its_guest() {
    assert!(!bounded().matches("quiz", &v("1.2.0")));
}

#[test]
fn open_rule_matches_every_version() {
    let rule = QuirkRule::new("legacy-quiz", QuirkBehaviour::SkipReadinessWait);
    assert!(rule.matches("legacy-quiz", &v("0.0.1")));
    assert!(rule.matches("legacy-quiz", &v("99.0.0")));
}

#[test]
fn parses_json_rules() {
    let table = QuirksTable::from_json(
        r#"[
            {"guest_id": "legacy-quiz", "min_version": "1.0.0", "max_version": "1.4.0",
             "behaviour": "skip_readiness_wait"},
            {"guest_id": "poll", "behaviour": "skip_readiness_wait"}
        ]"#,
    )
    .expect("valid table");
    assert_eq!(table.len(), 2);
    assert_eq!(table.rules().first(), Some(&bounded()));
    assert!(table.skips_readiness_wait("poll", &v("3.1.0")));
    assert!(!table.skips_readiness_wait("quiz", &v("1.0.0")));
}

#[rstest]
#[case::unknown_behaviour(r#"[{"guest_id": "poll", "behaviour": "teleport"}]"#)]
#[case::bad_version(r#"[{"guest_id": "poll", "min_version": "1.x.0", "behaviour": "skip_readiness_wait"}]"#)]
#[case::not_an_array(r#"{"guest_id": "poll"}"#)]
fn rejects_malformed_tables(#[case] document: &str) {
    assert!(QuirksTable::from_json(document).is_err());
}

#[test]
fn empty_table_applies_nothing() {
    let table = QuirksTable::default();
    assert!(table.is_empty());
    assert!(!table.skips_readiness_wait("legacy-quiz", &v("1.0.0")));
}

#[test]
fn push_appends_rules() {
    let mut table = QuirksTable::new(Vec::new());
    table.push(bounded());
    assert!(table.skips_readiness_wait("legacy-quiz", &v("1.1.0")));
    assert_eq!(
        serde_json::to_value(&table).expect("serialise")[0]["behaviour"],
        "skip_readiness_wait"
    );
}

#[test]
fn behaviour_parses_from_text() {
    assert_eq!(
        "skip_readiness_wait"
            .parse::<QuirkBehaviour>()
            .expect("parse"),
        QuirkBehaviour::SkipReadinessWait
    );
}
