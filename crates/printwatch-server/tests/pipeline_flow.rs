mod common;

use anyhow::Result;
use common::{close_line, open_line, recorder, samples_line, test_config};
use printwatch_common::types::{AlertStatus, OutboundEvent};
use printwatch_server::{build_manager, run};
use std::io::Cursor;
use tokio::io::BufReader;

const AMBIENT: &str = "fluctuated_ambient_temperature";

fn input(lines: &[String]) -> BufReader<Cursor<Vec<u8>>> {
    BufReader::new(Cursor::new(lines.join("\n").into_bytes()))
}

#[tokio::test]
async fn over_now_alert_then_finished_on_close() -> Result<()> {
    let (recorder, publishers) = recorder();
    let lines = vec![
        open_line("s-1", "Printer 1"),
        samples_line("s-1", AMBIENT, &[(0, 50.0), (1, 50.0), (2, 50.0), (3, 50.0)]),
        samples_line("s-1", AMBIENT, &[(4, 56.0)]),
        close_line("s-1"),
    ];

    let stats = run(&test_config(), input(&lines), publishers, std::future::pending()).await?;
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failed, 0);

    let events = recorder.events();
    assert_eq!(events.len(), 2);

    let (stream, OutboundEvent::Alert(alert)) = &events[0] else {
        panic!("expected an alert first, got {events:?}");
    };
    assert_eq!(stream, "s-1-alerts");
    assert_eq!(alert.status, AlertStatus::OverNow);
    assert_eq!(alert.value, 56.0);

    let (stream, OutboundEvent::Finished(finished)) = &events[1] else {
        panic!("expected a finished event last, got {events:?}");
    };
    assert_eq!(stream, "s-1-alerts");
    assert_eq!(finished.display_name, "Printer 1");
    Ok(())
}

#[tokio::test]
async fn forecasts_go_to_forecast_stream() -> Result<()> {
    let (recorder, publishers) = recorder();
    let points: Vec<(u32, f64)> = (0..5).map(|i| (i, 50.0)).collect();
    let lines = vec![
        open_line("s-1", "Printer 1"),
        samples_line("s-1", AMBIENT, &points),
        close_line("s-1"),
    ];

    run(&test_config(), input(&lines), publishers, std::future::pending()).await?;

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    let (stream, OutboundEvent::Forecast(forecast)) = &events[0] else {
        panic!("expected a forecast, got {events:?}");
    };
    assert_eq!(stream, "s-1-forecast");
    assert_eq!(forecast.points.len(), 10);
    Ok(())
}

#[tokio::test]
async fn malformed_and_unknown_lines_are_skipped() -> Result<()> {
    let (recorder, publishers) = recorder();
    let lines = vec![
        "this is not json".to_string(),
        "# comment".to_string(),
        String::new(),
        samples_line("s-9", AMBIENT, &[(0, 80.0)]),
        open_line("s-1", "Printer 1"),
        close_line("s-1"),
    ];

    run(&test_config(), input(&lines), publishers, std::future::pending()).await?;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].1, OutboundEvent::Finished(_)));
    Ok(())
}

#[tokio::test]
async fn streams_open_at_end_of_input_are_closed() -> Result<()> {
    let (recorder, publishers) = recorder();
    let lines = vec![open_line("s-1", "Printer 1"), open_line("s-2", "Printer 2")];

    run(&test_config(), input(&lines), publishers, std::future::pending()).await?;

    let mut finished: Vec<String> = recorder
        .events()
        .into_iter()
        .filter_map(|(_, event)| match event {
            OutboundEvent::Finished(f) => Some(f.device_id),
            _ => None,
        })
        .collect();
    finished.sort();
    assert_eq!(finished, vec!["s-1".to_string(), "s-2".to_string()]);
    Ok(())
}

#[tokio::test]
async fn devices_are_processed_independently() -> Result<()> {
    let (recorder, publishers) = recorder();
    let lines = vec![
        open_line("s-1", "Printer 1"),
        open_line("s-2", "Printer 2"),
        samples_line("s-1", AMBIENT, &[(0, 50.0), (1, 50.0), (2, 50.0), (3, 50.0), (4, 56.0)]),
        samples_line("s-2", AMBIENT, &[(0, 56.0)]),
        close_line("s-1"),
        close_line("s-2"),
    ];

    run(&test_config(), input(&lines), publishers, std::future::pending()).await?;

    let alerts: Vec<String> = recorder
        .events()
        .into_iter()
        .filter(|(_, event)| matches!(event, OutboundEvent::Alert(_)))
        .map(|(stream, _)| stream)
        .collect();
    // s-2 has a single sample, so only s-1 alerts
    assert_eq!(alerts, vec!["s-1-alerts".to_string()]);
    Ok(())
}

#[tokio::test]
async fn checkpoint_dir_creates_store() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let mut config = test_config();
    config.checkpoint_dir = Some(temp.path().join("state").to_string_lossy().into_owned());

    let manager = build_manager(&config)?;
    manager.on_stream_open("s-1", None);
    assert!(temp.path().join("state").join("checkpoints.db").exists());
    Ok(())
}
