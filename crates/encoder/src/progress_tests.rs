// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const BLOCK: &str = "\
frame=240
fps=59.8
bitrate=4521.3kbits/s
out_time_ms=30000000
speed=2.01x
progress=continue
";

#[test]
fn parses_a_full_block() {
    let mut parser = ProgressParser::new("tsk-1", 120.0);
    let mut update = None;
    for line in BLOCK.lines() {
        if let Some(p) = parser.feed_line(line) {
            update = Some(p);
        }
    }
    let update = update.unwrap();

    // 30s of 120s source
    assert!((update.percent - 25.0).abs() < 1e-9);
    assert!((update.speed - 2.01).abs() < 1e-9);
    assert!((update.fps - 59.8).abs() < 1e-9);
    assert_eq!(update.bitrate, 4_521_300);
    assert!((update.current_time - 30.0).abs() < 1e-9);
    assert!(!update.completed);
}

#[test]
fn unknown_keys_ignored() {
    let mut parser = ProgressParser::new("tsk-1", 60.0);
    assert!(parser.feed_line("total_size=123456").is_none());
    assert!(parser.feed_line("stream_0_0_q=28.0").is_none());
    assert!(parser.feed_line("not a kv line").is_none());
}

#[test]
fn percent_clamps_to_hundred() {
    let mut parser = ProgressParser::new("tsk-1", 10.0);
    parser.feed_line("out_time_ms=99000000");
    let update = parser.feed_line("progress=continue").unwrap();
    assert_eq!(update.percent, 100.0);
}

#[test]
fn percent_never_regresses() {
    let mut parser = ProgressParser::new("tsk-1", 100.0);
    parser.feed_line("out_time_ms=50000000");
    let first = parser.feed_line("progress=continue").unwrap();
    assert!((first.percent - 50.0).abs() < 1e-9);

    // Encoder restarts its timestamps; report must hold the line
    parser.feed_line("out_time_ms=10000000");
    let second = parser.feed_line("progress=continue").unwrap();
    assert!((second.percent - 50.0).abs() < 1e-9);
}

#[test]
fn end_block_is_terminal_and_full() {
    let mut parser = ProgressParser::new("tsk-1", 100.0);
    parser.feed_line("out_time_ms=99500000");
    let last = parser.feed_line("progress=end").unwrap();
    assert!(last.completed);
    assert_eq!(last.percent, 100.0);
}

#[test]
fn zero_duration_reports_zero() {
    let mut parser = ProgressParser::new("tsk-1", 0.0);
    parser.feed_line("out_time_ms=5000000");
    let update = parser.feed_line("progress=continue").unwrap();
    assert_eq!(update.percent, 0.0);
}

#[test]
fn malformed_values_keep_previous() {
    let mut parser = ProgressParser::new("tsk-1", 100.0);
    parser.feed_line("out_time_ms=20000000");
    parser.feed_line("out_time_ms=garbage");
    let update = parser.feed_line("progress=continue").unwrap();
    assert!((update.percent - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn sender_drops_updates_but_delivers_terminal() {
    let (sender, mut rx) = ProgressSender::channel();

    // Flood far past the buffer without a consumer
    for n in 0..(PROGRESS_BUFFER * 4) {
        sender.send_update(TaskProgress {
            task_id: "tsk-1".into(),
            percent: n as f64,
            speed: 1.0,
            fps: 30.0,
            bitrate: 0,
            current_time: 0.0,
            completed: false,
        });
    }

    // Drain what survived; must be at most the buffer depth
    let mut drained = 0;
    while rx.try_recv().is_ok() {
        drained += 1;
    }
    assert!(drained <= PROGRESS_BUFFER);

    sender
        .send_terminal(TaskProgress {
            task_id: "tsk-1".into(),
            percent: 100.0,
            speed: 1.0,
            fps: 30.0,
            bitrate: 0,
            current_time: 0.0,
            completed: true,
        })
        .await;
    let last = rx.recv().await.unwrap();
    assert!(last.completed);
}
