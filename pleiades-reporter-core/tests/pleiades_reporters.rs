use chrono::{TimeZone, Utc};
use pleiades_reporter_core::contract::{MockWebClient, Reporter, WebResponse};
use pleiades_reporter_core::pleiades::{
    modification_summary, place_url, PleiadesChangesReporter, PleiadesFeedKind,
    PleiadesFeedReporter, CHANGES_FEED, NEW_PLACES_FEED,
};
use pleiades_reporter_core::reporter::ReporterBase;
use pleiades_reporter_core::rss::FeedHandler;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn item(title: &str, place: &str, date: &str, description: &str) -> String {
    format!(
        "<item><title>{title}</title><link>{place}</link><guid>{place}</guid>\
         <description>{description}</description><pubDate>{date}</pubDate></item>"
    )
}

fn feed(items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel><title>Pleiades</title>\
         <link>https://pleiades.stoa.org/</link><description>Published places</description>\
         {}</channel></rss>",
        items.concat()
    )
}

fn roma() -> String {
    item(
        "Roma",
        "https://pleiades.stoa.org/places/423025",
        "Mon, 02 Sep 2024 10:00:00 GMT",
        "&lt;p&gt;Capital of the empire&lt;/p&gt;",
    )
}

fn ostia() -> String {
    item(
        "Ostia",
        "https://pleiades.stoa.org/places/422995",
        "Tue, 03 Sep 2024 10:00:00 GMT",
        "Harbour town",
    )
}

fn carthago() -> String {
    item(
        "Carthago",
        "https://pleiades.stoa.org/places/314921",
        "Wed, 04 Sep 2024 10:00:00 GMT",
        "",
    )
}

#[test]
fn feed_entries_parse_newest_first_with_plain_summaries() {
    let fetched_at = Utc::now();
    let entries = FeedHandler::parse(NEW_PLACES_FEED, &feed(&[roma(), ostia()]), fetched_at)
        .expect("feed parses");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "Ostia");
    assert_eq!(entries[1].title, "Roma");
    assert_eq!(entries[1].summary.as_deref(), Some("Capital of the empire"));
    assert_eq!(
        entries[1].link.as_deref(),
        Some("https://pleiades.stoa.org/places/423025")
    );
    assert_eq!(entries[1].iso_date(), "2024-09-02T10:00:00Z");
}

#[test]
fn unparseable_feed_is_a_protocol_error() {
    let result = FeedHandler::parse(NEW_PLACES_FEED, "this is not a feed", Utc::now());
    assert!(result.is_err());
}

/// Serves the given bodies in order, repeating the last one.
fn feed_server(bodies: Vec<String>) -> (MockWebClient, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockWebClient::new();
    mock.expect_get().returning(move |request| {
        assert!(request.bypass_cache, "feed checks always go to the network");
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let body = bodies[n.min(bodies.len() - 1)].clone();
        Ok(WebResponse::new(200, body))
    });
    (mock, calls)
}

#[tokio::test]
async fn new_places_reporter_primes_then_reports_only_new_entries() {
    let state_dir = tempdir().unwrap();
    let (mock, calls) = feed_server(vec![
        feed(&[roma(), ostia()]),
        feed(&[roma(), ostia(), carthago()]),
    ]);
    let base = ReporterBase::new("pleiades-new-places", NEW_PLACES_FEED, Arc::new(mock)).unwrap();
    let mut reporter =
        PleiadesFeedReporter::new(base, PleiadesFeedKind::NewPlaces, Some(state_dir.path()))
            .unwrap();

    let first = reporter.check().await.expect("first check");
    assert!(first.is_empty(), "first run only records what already exists");

    let second = reporter.check().await.expect("second check");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.len(), 1);
    let report = &second[0];
    assert_eq!(report.title, "New Pleiades place: Carthago");
    assert_eq!(report.summary, "Carthago");
    assert_eq!(
        report.url.as_deref(),
        Some("https://pleiades.stoa.org/places/314921")
    );
    assert_eq!(report.tags, vec!["Pleiades", "AncientGeography"]);
    assert_eq!(report.source, "pleiades-new-places");
    assert!(state_dir.path().join("pleiades-new-places.json").exists());
}

#[tokio::test]
async fn seen_entries_survive_a_restart() {
    let state_dir = tempdir().unwrap();
    {
        let (mock, _) = feed_server(vec![feed(&[roma()])]);
        let base = ReporterBase::new("blog", NEW_PLACES_FEED, Arc::new(mock)).unwrap();
        let mut reporter =
            PleiadesFeedReporter::new(base, PleiadesFeedKind::Blog, Some(state_dir.path())).unwrap();
        assert!(reporter.check().await.unwrap().is_empty());
    }

    let (mock, _) = feed_server(vec![feed(&[roma(), ostia()])]);
    let base = ReporterBase::new("blog", NEW_PLACES_FEED, Arc::new(mock)).unwrap();
    let mut reporter =
        PleiadesFeedReporter::new(base, PleiadesFeedKind::Blog, Some(state_dir.path())).unwrap();
    let reports = reporter.check().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].title, "Pleiades blog: Ostia");
    assert_eq!(reports[0].summary, "Ostia: Harbour town");
    assert_eq!(reports[0].tags, vec!["Pleiades", "AncientHistory"]);

    // After a reset the next check primes again.
    reporter.handler_mut().reset().unwrap();
    assert!(!state_dir.path().join("blog.json").exists());
    assert!(reporter.check().await.unwrap().is_empty());
}

#[tokio::test]
async fn upstream_errors_surface_from_check() {
    let mut mock = MockWebClient::new();
    mock.expect_get()
        .returning(|_| Ok(WebResponse::new(500, "boom")));
    let base = ReporterBase::new("pleiades-new-places", NEW_PLACES_FEED, Arc::new(mock)).unwrap();
    let mut reporter = PleiadesFeedReporter::new(base, PleiadesFeedKind::NewPlaces, None).unwrap();
    assert!(reporter.check().await.is_err());
}

#[test]
fn place_urls_are_extracted_from_sub_resources() {
    assert_eq!(
        place_url("https://pleiades.stoa.org/places/423025/roma-name").as_deref(),
        Some("https://pleiades.stoa.org/places/423025")
    );
    assert_eq!(
        place_url("https://pleiades.stoa.org/places/423025").as_deref(),
        Some("https://pleiades.stoa.org/places/423025")
    );
    assert_eq!(place_url("https://pleiades.stoa.org/news/item"), None);
}

fn roma_json() -> serde_json::Value {
    json!({
        "title": "Roma",
        "history": [
            {"modified": "2024-09-03T11:00:00Z", "comment": "", "modifiedBy": "thomase"},
            {"modified": "2024-09-02T10:00:00Z", "comment": "Added  name", "modifiedBy": "sfoy"},
            {"modified": "2020-01-01T00:00:00Z", "comment": "Old edit", "modifiedBy": "sfoy"},
            {"modified": "not a date", "comment": "Broken", "modifiedBy": "sfoy"}
        ]
    })
}

#[test]
fn modification_summary_lists_recent_edits_oldest_first() {
    let cutoff = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    assert_eq!(
        modification_summary(&roma_json(), cutoff),
        "2024-09-02: Added name (sfoy)\n2024-09-03: Edited (thomase)"
    );
    let later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(modification_summary(&roma_json(), later), "");
    assert_eq!(modification_summary(&json!({"title": "x"}), cutoff), "");
}

#[tokio::test]
async fn changes_reporter_reports_one_update_per_place() {
    let changes = feed(&[
        item(
            "Roma (name)",
            "https://pleiades.stoa.org/places/423025/roma-name",
            "Mon, 02 Sep 2024 10:00:00 GMT",
            "",
        ),
        item(
            "Roma (location)",
            "https://pleiades.stoa.org/places/423025/location",
            "Tue, 03 Sep 2024 11:00:00 GMT",
            "",
        ),
        item(
            "Pleiades news",
            "https://pleiades.stoa.org/news/item",
            "Tue, 03 Sep 2024 12:00:00 GMT",
            "",
        ),
    ]);
    let mut mock = MockWebClient::new();
    mock.expect_get().returning(move |request| {
        if request.url == "https://pleiades.stoa.org/places/423025/json" {
            Ok(WebResponse::new(200, roma_json().to_string()))
        } else {
            assert_eq!(request.url, CHANGES_FEED);
            Ok(WebResponse::new(200, changes.clone()))
        }
    });
    let base = ReporterBase::new("pleiades-changes", CHANGES_FEED, Arc::new(mock)).unwrap();
    let mut reporter = PleiadesChangesReporter::new(base, None).unwrap();
    reporter
        .handler_mut()
        .set_last_check(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap())
        .unwrap();

    let reports = reporter.check().await.expect("check succeeds");
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.title, "Pleiades place updated: Roma");
    assert_eq!(
        report.summary,
        "2024-09-02: Added name (sfoy)\n2024-09-03: Edited (thomase)"
    );
    assert_eq!(
        report.url.as_deref(),
        Some("https://pleiades.stoa.org/places/423025")
    );
    assert_eq!(
        report.when,
        Utc.with_ymd_and_hms(2024, 9, 3, 11, 0, 0).unwrap()
    );
}

fn roma_location_feed() -> String {
    feed(&[item(
        "Roma (location)",
        "https://pleiades.stoa.org/places/423025/location",
        "Tue, 03 Sep 2024 11:00:00 GMT",
        "",
    )])
}

/// Place JSON fails with a 500 for the first `failures` requests.
fn flaky_changes_server(feeds: Vec<String>, failures: usize) -> (MockWebClient, Arc<AtomicUsize>) {
    let json_calls = Arc::new(AtomicUsize::new(0));
    let counter = json_calls.clone();
    let feed_calls = AtomicUsize::new(0);
    let mut mock = MockWebClient::new();
    mock.expect_get().returning(move |request| {
        if request.url == "https://pleiades.stoa.org/places/423025/json" {
            assert!(request.bypass_cache, "place history is always fetched fresh");
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                return Ok(WebResponse::new(500, "boom"));
            }
            return Ok(WebResponse::new(200, roma_json().to_string()));
        }
        assert_eq!(request.url, CHANGES_FEED);
        let n = feed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(WebResponse::new(200, feeds[n.min(feeds.len() - 1)].clone()))
    });
    (mock, json_calls)
}

#[tokio::test]
async fn place_that_failed_to_load_is_reported_on_the_next_check() {
    let state_dir = tempdir().unwrap();
    let (mock, json_calls) = flaky_changes_server(vec![roma_location_feed()], 1);
    let base = ReporterBase::new("pleiades-changes", CHANGES_FEED, Arc::new(mock)).unwrap();
    let mut reporter = PleiadesChangesReporter::new(base, Some(state_dir.path())).unwrap();
    let cutoff = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    reporter.handler_mut().set_last_check(cutoff).unwrap();

    let first = reporter.check().await.expect("a failing place is not fatal");
    assert!(first.is_empty());
    let saved = std::fs::read_to_string(state_dir.path().join("pleiades-changes.json")).unwrap();
    assert!(saved.contains("https://pleiades.stoa.org/places/423025"));

    let second = reporter.check().await.expect("second check");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].title, "Pleiades place updated: Roma");
    assert_eq!(
        second[0].summary,
        "2024-09-02: Added name (sfoy)\n2024-09-03: Edited (thomase)"
    );

    let third = reporter.check().await.expect("third check");
    assert!(third.is_empty(), "the update is reported exactly once");
    assert_eq!(json_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pending_places_are_retried_after_they_leave_the_feed() {
    let (mock, _) = flaky_changes_server(vec![roma_location_feed(), feed(&[])], 1);
    let base = ReporterBase::new("pleiades-changes", CHANGES_FEED, Arc::new(mock)).unwrap();
    let mut reporter = PleiadesChangesReporter::new(base, None).unwrap();
    reporter
        .handler_mut()
        .set_last_check(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap())
        .unwrap();

    assert!(reporter.check().await.unwrap().is_empty());
    let reports = reporter.check().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].url.as_deref(),
        Some("https://pleiades.stoa.org/places/423025")
    );
}

#[tokio::test]
async fn seen_set_only_keeps_entries_still_in_the_feed() {
    let (mock, _) = feed_server(vec![
        feed(&[roma(), ostia()]),
        feed(&[ostia(), carthago()]),
    ]);
    let base = ReporterBase::new("pleiades-new-places", NEW_PLACES_FEED, Arc::new(mock)).unwrap();
    let mut reporter =
        PleiadesFeedReporter::new(base, PleiadesFeedKind::NewPlaces, None).unwrap();

    assert!(reporter.check().await.unwrap().is_empty());
    let reports = reporter.check().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].title, "New Pleiades place: Carthago");

    let seen: Vec<&String> = reporter.handler_mut().state().seen.keys().collect();
    assert_eq!(
        seen,
        vec![
            "https://pleiades.stoa.org/places/314921",
            "https://pleiades.stoa.org/places/422995",
        ]
    );
}
