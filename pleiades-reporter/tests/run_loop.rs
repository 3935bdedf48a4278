use chrono::{TimeZone, Utc};
use pleiades_reporter::cli::run_rounds;
use pleiades_reporter_core::contract::MockReporter;
use pleiades_reporter_core::looper::Looper;
use pleiades_reporter_core::report::Report;
use pleiades_reporter_core::schedule::Schedule;
use std::time::Duration;
use tokio::io::{duplex, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::time::timeout;

fn reporter_with_news() -> MockReporter {
    let mut mock = MockReporter::new();
    mock.expect_name().return_const("places".to_string());
    mock.expect_check().returning(|| {
        Ok(vec![Report::new(
            "places",
            "New Pleiades place: Ostia",
            "Ostia: harbour town",
            Utc.with_ymd_and_hms(2024, 9, 3, 10, 0, 0).unwrap(),
        )])
    });
    mock
}

fn interrupt_after(delay: Duration) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(true);
    });
    rx
}

#[tokio::test]
async fn interrupt_stops_a_waiting_prompt() {
    let mut looper = Looper::new(Schedule::new());
    looper.add_reporter(Box::new(reporter_with_news()));
    // The operator never types anything.
    let (_keyboard, terminal) = duplex(64);
    let mut input = BufReader::new(terminal);
    let mut output = Vec::new();

    let finished = timeout(
        Duration::from_secs(5),
        run_rounds(
            &mut looper,
            &mut input,
            &mut output,
            Duration::from_secs(3600),
            interrupt_after(Duration::from_millis(50)),
        ),
    )
    .await;
    assert!(matches!(finished, Ok(Ok(()))), "loop ends on interrupt");
    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("1. New Pleiades place: Ostia"));
    assert!(output.contains("cmd>>> "));
}

#[tokio::test]
async fn interrupt_stops_the_sleep_between_rounds() {
    let mut looper = Looper::new(Schedule::new());
    let (_keyboard, terminal) = duplex(64);
    let mut input = BufReader::new(terminal);
    let mut output = Vec::new();

    let finished = timeout(
        Duration::from_secs(5),
        run_rounds(
            &mut looper,
            &mut input,
            &mut output,
            Duration::from_secs(3600),
            interrupt_after(Duration::from_millis(50)),
        ),
    )
    .await;
    assert!(matches!(finished, Ok(Ok(()))));
    assert!(output.is_empty());
}

#[tokio::test]
async fn quitting_at_the_prompt_ends_the_loop() {
    let mut looper = Looper::new(Schedule::new());
    looper.add_reporter(Box::new(reporter_with_news()));
    let (mut keyboard, terminal) = duplex(64);
    keyboard.write_all(b"q\n").await.unwrap();
    let mut input = BufReader::new(terminal);
    let mut output = Vec::new();
    let (_tx, never) = watch::channel(false);

    let finished = timeout(
        Duration::from_secs(5),
        run_rounds(&mut looper, &mut input, &mut output, Duration::from_secs(3600), never),
    )
    .await;
    assert!(matches!(finished, Ok(Ok(()))));
}
