//! End-to-end tests for the streamer core.
//!
//! The whole core runs through `run_streamer`; only the transport engine,
//! the device tools, the screenshot tool and the bridge process are
//! replaced by in-memory doubles.  Input travels the real path: data-channel
//! bytes → coordinator → mapper → supervisor → bridge stdin.

mod common;

use std::time::Duration;

use common::{assert_close, bridge_lines, next_bridge_command, start, WAIT};
use mirror_streamer::application::BridgeStatus;
use mirror_streamer::domain::config::ChromeConfig;
use mirror_streamer::domain::{Frame, SessionState, StreamerConfig};
use mirror_streamer::infrastructure::mock::MockTransportFactory;

const DOWN_CENTER: &[u8] = br#"{"type":"down","x":0.5,"y":0.5}"#;
const UP_CENTER: &[u8] = br#"{"type":"up","x":0.5,"y":0.5}"#;

// ── Input scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_center_tap_reaches_bridge_in_device_points() {
    // Arrange
    let mut h = start(StreamerConfig::default(), MockTransportFactory::new());
    h.wait_bridge_ready(1).await;
    let transport = h.connect_viewer("v=0").await;
    h.wait_bridge_ready(2).await;
    let (stdin_far, _stdout_far) = h.launcher.take_far_end(1);
    let mut commands = bridge_lines(stdin_far);

    // Act
    transport.emit_data(DOWN_CENTER);
    transport.emit_data(UP_CENTER);

    // Assert
    let cmd = next_bridge_command(&mut commands).await;
    assert_eq!(cmd["type"], "tap");
    assert_close(&cmd["x"], 195.0);
    assert_close(&cmd["y"], 422.0);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_diagonal_drag_becomes_swipe() {
    // Arrange
    let mut h = start(StreamerConfig::default(), MockTransportFactory::new());
    h.wait_bridge_ready(1).await;
    let transport = h.connect_viewer("v=0").await;
    h.wait_bridge_ready(2).await;
    let (stdin_far, _stdout_far) = h.launcher.take_far_end(1);
    let mut commands = bridge_lines(stdin_far);

    // Act
    transport.emit_data(br#"{"type":"down","x":0.1,"y":0.1}"#);
    transport.emit_data(br#"{"type":"up","x":0.9,"y":0.9}"#);

    // Assert
    let cmd = next_bridge_command(&mut commands).await;
    assert_eq!(cmd["type"], "swipe");
    assert_close(&cmd["x1"], 39.0);
    assert_close(&cmd["y1"], 84.4);
    assert_close(&cmd["x2"], 351.0);
    assert_close(&cmd["y2"], 759.6);
    assert_close(&cmd["duration"], 0.3);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_chrome_correction_shifts_tap_below_title_bar() {
    // Arrange: the captured window is 900 pt tall with a 60 pt title bar
    let config = StreamerConfig {
        chrome: ChromeConfig {
            enabled: true,
            top_bar_offset: 60.0,
            window_height: 900.0,
            content_height: 844.0,
        },
        ..StreamerConfig::default()
    };
    let mut h = start(config, MockTransportFactory::new());
    h.wait_bridge_ready(1).await;
    let transport = h.connect_viewer("v=0").await;
    h.wait_bridge_ready(2).await;
    let (stdin_far, _stdout_far) = h.launcher.take_far_end(1);
    let mut commands = bridge_lines(stdin_far);

    // Act
    transport.emit_data(DOWN_CENTER);
    transport.emit_data(UP_CENTER);

    // Assert
    let cmd = next_bridge_command(&mut commands).await;
    assert_eq!(cmd["type"], "tap");
    assert_close(&cmd["x"], 195.0);
    assert_close(&cmd["y"], 390.0);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_dead_bridge_drops_input_until_next_session() {
    // Arrange
    let mut h = start(StreamerConfig::default(), MockTransportFactory::new());
    h.wait_bridge_ready(1).await;
    let first = h.connect_viewer("v=0 first").await;
    h.wait_bridge_ready(2).await;
    let (stdin_far, stdout_far) = h.launcher.take_far_end(1);
    let mut dead_commands = bridge_lines(stdin_far);

    // Act: the bridge process exits
    drop(stdout_far);
    let mut status = h.handle.bridge().subscribe_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| matches!(s, BridgeStatus::Failed(_))))
        .await
        .expect("bridge never marked failed")
        .unwrap();
    first.emit_data(DOWN_CENTER);
    first.emit_data(UP_CENTER);

    // Assert: nothing written, nothing relaunched
    let eof = tokio::time::timeout(WAIT, dead_commands.next_line())
        .await
        .expect("dead bridge stdin left open")
        .unwrap();
    assert_eq!(eof, None);
    assert_eq!(h.launcher.launches(), 2);

    // Act: a new viewer session re-resolves the bridge
    let second = h.connect_viewer("v=0 second").await;
    h.wait_bridge_ready(3).await;
    let (stdin_far, _stdout_far) = h.launcher.take_far_end(1);
    let mut commands = bridge_lines(stdin_far);
    second.emit_data(DOWN_CENTER);
    second.emit_data(UP_CENTER);

    // Assert
    let cmd = next_bridge_command(&mut commands).await;
    assert_eq!(cmd["type"], "tap");

    h.handle.shutdown().await;
}

// ── Session supersession ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_offer_closes_old_session_before_answering() {
    // Arrange
    let mut h = start(StreamerConfig::default(), MockTransportFactory::new());
    let first = h.connect_viewer("v=0 A").await;

    // Act
    let second = h.connect_viewer("v=0 B").await;

    // Assert: A closed exactly once, and before B was negotiated
    assert_eq!(first.close_count(), 1);
    assert_eq!(second.close_count(), 0);
    let journal = h.transport.journal();
    let closed_a = journal
        .iter()
        .position(|e| *e == format!("close:{}", first.id().0))
        .expect("first session never closed");
    let answered_b = journal
        .iter()
        .position(|e| *e == format!("answer:{}", second.id().0))
        .expect("second session never answered");
    assert!(closed_a < answered_b, "journal: {journal:?}");

    // Assert: stale events from A no longer matter
    first.emit_state(mirror_streamer::application::ConnectionState::Failed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*h.handle.session_state().borrow(), SessionState::Connected);
    assert_eq!(second.close_count(), 0);

    h.handle.shutdown().await;
    assert_eq!(second.close_count(), 1);
    assert_eq!(first.close_count(), 1);
}

// ── Frames ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connecting_viewer_receives_cached_frame_on_static_screen() {
    // Arrange: one capture at startup, then nothing for a minute
    let mut config = StreamerConfig::default();
    config.pump.interval_ms = 60_000;
    let mut h = start(config, MockTransportFactory::new());
    tokio::time::timeout(WAIT, async {
        while !h.handle.pump().replay_last() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pump never cached a frame");

    // Act
    let transport = h.connect_viewer("v=0").await;

    // Assert
    let frames = tokio::time::timeout(WAIT, async {
        loop {
            let frames = transport.frames();
            if !frames.is_empty() {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no frame delivered to the new session");
    assert_eq!(&frames[0].data[..], &[0x89, b'P', b'N', b'G']);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn test_real_frames_flow_to_connected_session() {
    // Arrange
    let mut h = start(StreamerConfig::default(), MockTransportFactory::new());
    let transport = h.connect_viewer("v=0").await;

    // Act
    h.handle
        .on_frame(Frame::new(vec![7u8; 32], Duration::from_millis(40)));

    // Assert
    tokio::time::timeout(WAIT, async {
        while !transport.frames().iter().any(|f| f.len() == 32) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("captured frame never reached the transport");

    h.handle.shutdown().await;
}
