use chrono::{TimeZone, Timelike, Utc};
use pleiades_reporter_core::dates::{dawn_of_time, format_listing, parse_datetime, DateError};
use pleiades_reporter_core::post::Post;
use pleiades_reporter_core::text::{norm, strip_tags, truncate_chars};

#[test]
fn norm_collapses_whitespace_and_trims() {
    assert_eq!(norm("  Hello   \n\t world ", &[], true), "Hello world");
    assert_eq!(norm("  Hello  world ", &[], false), " Hello world ");
}

#[test]
fn norm_keeps_preserved_characters_without_surrounding_spaces() {
    assert_eq!(
        norm("line one \n  line two", &['\n'], true),
        "line one\nline two"
    );
}

#[test]
fn norm_composes_unicode() {
    // "e" followed by a combining acute accent becomes a single "é".
    let decomposed = "Caesare\u{0301}a";
    let normalized = norm(decomposed, &[], true);
    assert_eq!(normalized, "Caesaréa");
    assert_eq!(normalized.chars().count(), 8);
}

#[test]
fn strip_tags_removes_markup_and_decodes_entities() {
    assert_eq!(
        strip_tags("<p>Roman <b>city</b> &amp; port</p><p>on the&nbsp;coast</p>"),
        "Roman city & port on the coast"
    );
}

#[test]
fn truncate_chars_marks_shortened_text() {
    assert_eq!(truncate_chars("abcdef", 4), "abc…");
    assert_eq!(truncate_chars("abc", 5), "abc");
    assert_eq!(truncate_chars("abc", 0), "");
}

#[test]
fn parse_datetime_accepts_the_common_upstream_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap();
    assert_eq!(parse_datetime("2024-09-02T10:00:00Z").unwrap(), expected);
    assert_eq!(parse_datetime("2024-09-02T12:00:00+02:00").unwrap(), expected);
    assert_eq!(
        parse_datetime("Mon, 02 Sep 2024 10:00:00 +0000").unwrap(),
        expected
    );
    assert_eq!(parse_datetime("2024-09-02 10:00:00").unwrap(), expected);
    assert_eq!(
        parse_datetime(" 2024-09-02 ").unwrap(),
        Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap()
    );
}

#[test]
fn parse_datetime_rejects_nonsense() {
    assert_eq!(
        parse_datetime("yesterday"),
        Err(DateError("yesterday".to_string()))
    );
}

#[test]
fn parse_datetime_folds_leap_seconds() {
    let dt = parse_datetime("2016-12-31T23:59:60Z").expect("leap second should parse");
    assert_eq!(dt.format("%H:%M:%S").to_string(), "23:59:59");
    assert!(dt.nanosecond() < 1_000_000_000);
}

#[test]
fn listing_format_is_minute_precision() {
    let dt = Utc.with_ymd_and_hms(2024, 9, 2, 10, 5, 59).unwrap();
    assert_eq!(format_listing(&dt), "2024-09-02 10:05");
    assert_eq!(dawn_of_time(), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
}

#[test]
fn post_cleans_tags_and_gets_a_fresh_id() {
    let a = Post::new(
        "body",
        vec![
            "#Pleiades".to_string(),
            "Ancient History".to_string(),
            " ".to_string(),
        ],
    );
    let b = Post::new("body", vec![]);
    assert_eq!(a.tags, vec!["Pleiades", "AncientHistory"]);
    assert_ne!(a.id, b.id);
}
