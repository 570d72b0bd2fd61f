// Integration tests for the session controller
//
// The controller is driven through its handle against fake encoders,
// pickers and pages; assertions look at the side effects those fakes log.

mod common;

use anyhow::Result;
use common::*;
use std::time::Duration;
use stream_saver::encoder::EncoderEvent;
use stream_saver::session::INCREMENTAL_TIMESLICE;
use stream_saver::source::PageMetadata;
use stream_saver::{InboundMessage, OutboundMessage, SessionController, SessionState, SinkKind};

#[tokio::test]
async fn test_start_records_incrementally_and_stop_finalizes() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;
    assert!(controller.is_running().await?);

    harness.encoders.emit(0, b"abc").await;
    harness.encoders.emit(0, b"").await;
    harness.encoders.emit(0, b"defg").await;

    controller.stop().await?;
    expect_running(&mut pushes, false).await;

    let files = harness.picker.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].data, b"abcdefg");
    assert!(files[0].closed);

    assert!(!controller.is_running().await?);
    assert!(harness.downloads.downloads().is_empty());
    assert_eq!(harness.encoders.started(), 1);

    Ok(())
}

#[tokio::test]
async fn test_timeslice_only_requested_for_incremental_sink() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;
    controller.stop().await?;
    expect_running(&mut pushes, false).await;

    harness.picker.set_mode(PickerMode::Refuse);
    controller.start().await?;
    expect_running(&mut pushes, true).await;
    controller.stop().await?;
    expect_running(&mut pushes, false).await;

    assert_eq!(harness.encoders.timeslice(0), Some(INCREMENTAL_TIMESLICE));
    assert_eq!(harness.encoders.timeslice(1), None);

    Ok(())
}

#[tokio::test]
async fn test_refused_destination_buffers_and_delivers_download() -> Result<()> {
    let harness = Harness::new(PickerMode::Refuse);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    let stats = controller.stats().await?.expect("active session");
    assert_eq!(stats.sink, SinkKind::Buffering);
    assert_eq!(stats.state, SessionState::Recording);

    harness.encoders.emit(0, b"one").await;
    harness.encoders.emit(0, b"two").await;

    controller.stop().await?;
    expect_running(&mut pushes, false).await;

    let downloads = harness.downloads.downloads();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].data, b"onetwo");
    assert_eq!(downloads[0].mime_type, WEBM_VP9_OPUS);
    assert!(downloads[0].file_name.ends_with(".webm"));

    Ok(())
}

#[tokio::test]
async fn test_failed_picker_falls_back_to_buffering() -> Result<()> {
    let harness = Harness::new(PickerMode::Fail);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;
    harness.encoders.emit(0, b"data").await;
    controller.stop().await?;
    expect_running(&mut pushes, false).await;

    assert_eq!(harness.picker.requests().len(), 1);
    assert_eq!(harness.downloads.downloads()[0].data, b"data");

    Ok(())
}

#[tokio::test]
async fn test_start_supersedes_active_session() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    harness.encoders.flush_on_stop(b"-tail");
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;
    harness.encoders.emit(0, b"first").await;

    controller.start().await?;
    expect_running(&mut pushes, false).await;
    expect_running(&mut pushes, true).await;

    let files = harness.picker.files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].data, b"first-tail");
    assert!(files[0].closed);

    // The old output is complete before the new one is opened
    let events = harness.picker.events();
    let closed = events.iter().position(|e| e == "close:0").expect("close:0");
    let opened = events.iter().position(|e| e == "open:1").expect("open:1");
    assert!(closed < opened, "events: {:?}", events);

    assert!(controller.is_running().await?);
    assert_eq!(harness.encoders.started(), 2);

    Ok(())
}

#[tokio::test]
async fn test_restarts_while_source_keeps_playing() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;
    harness.encoders.emit(0, b"part one").await;

    // Item ends naturally; playback continues with the next one
    harness.page.set_metadata(PageMetadata {
        title: Some("Next".to_string()),
        channel: Some("Conf".to_string()),
        id: Some("n2".to_string()),
        channel_link: None,
    });
    harness.video.end();
    expect_running(&mut pushes, false).await;
    expect_running(&mut pushes, true).await;

    assert_eq!(harness.encoders.started(), 2);
    assert_eq!(harness.video.captures(), 2);
    assert!(controller.is_running().await?);

    let files = harness.picker.files();
    assert_eq!(files[0].data, b"part one");
    assert!(files[0].closed);
    assert!(!files[1].closed);

    // The restarted session names itself from the new item
    assert_eq!(files[1].name, "Next [n2].webm");
    assert_ne!(files[0].name, files[1].name);

    Ok(())
}

#[tokio::test]
async fn test_restart_without_metadata_gets_fresh_fallback_name() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    harness.video.end();
    expect_running(&mut pushes, false).await;
    expect_running(&mut pushes, true).await;

    let requests = harness.picker.requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].suggested_name, requests[1].suggested_name);
    for request in &requests {
        assert!(request.suggested_name.ends_with(".webm"));
    }

    let stats = controller.stats().await?.expect("active session");
    assert_eq!(stats.file_name, requests[1].suggested_name);

    Ok(())
}

#[tokio::test]
async fn test_no_restart_when_source_stopped_playing() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    harness.video.set_playing(false);
    harness.video.end();
    expect_running(&mut pushes, false).await;
    expect_quiet(&mut pushes).await;

    assert_eq!(harness.encoders.started(), 1);
    assert!(!controller.is_running().await?);

    Ok(())
}

#[tokio::test]
async fn test_stop_never_restarts() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    // Source is still playing, but the operator asked to stop
    controller.stop().await?;
    expect_running(&mut pushes, false).await;
    expect_quiet(&mut pushes).await;

    assert_eq!(harness.encoders.started(), 1);
    assert_eq!(harness.encoders.stops(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_without_session_is_ignored() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.stop().await?;
    assert!(!controller.is_running().await?);
    expect_quiet(&mut pushes).await;

    Ok(())
}

#[tokio::test]
async fn test_no_video_means_no_session() -> Result<()> {
    let harness = Harness::without_video(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    assert!(!controller.is_running().await?);
    expect_quiet(&mut pushes).await;

    assert!(harness.picker.requests().is_empty());
    assert_eq!(harness.encoders.started(), 0);

    Ok(())
}

#[tokio::test]
async fn test_encoder_construction_failure_leaves_controller_idle() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    harness.encoders.fail_create(true);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    assert!(!controller.is_running().await?);
    expect_quiet(&mut pushes).await;

    // The acquired destination is discarded, nothing is downloaded
    let files = harness.picker.files();
    assert_eq!(files.len(), 1);
    assert!(files[0].discarded);
    assert!(!files[0].closed);
    assert!(files[0].data.is_empty());
    assert!(harness.downloads.downloads().is_empty());

    // A later start works once the encoder can be built
    harness.encoders.fail_create(false);
    controller.start().await?;
    expect_running(&mut pushes, true).await;

    Ok(())
}

#[tokio::test]
async fn test_capture_failure_leaves_controller_idle() -> Result<()> {
    let harness = Harness::new(PickerMode::Refuse);
    harness.video.fail_capture(true);
    let controller = SessionController::spawn(harness.config()).await?;

    controller.start().await?;
    assert!(!controller.is_running().await?);
    assert!(harness.downloads.downloads().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_write_failure_aborts_session_without_restart() -> Result<()> {
    let harness = Harness::new(PickerMode::GrantBroken);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    harness.encoders.emit(0, b"lost").await;
    expect_running(&mut pushes, false).await;
    expect_quiet(&mut pushes).await;

    assert_eq!(harness.encoders.stops(), 1);
    assert_eq!(harness.encoders.started(), 1);
    assert!(harness.picker.files()[0].closed);
    assert!(!controller.is_running().await?);

    Ok(())
}

#[tokio::test]
async fn test_encoder_stopping_on_its_own_ends_session() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    harness.video.set_playing(false);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    harness.encoders.emit(0, b"last").await;
    harness.encoders.send(0, EncoderEvent::Stopped).await;
    expect_running(&mut pushes, false).await;

    assert_eq!(harness.picker.files()[0].data, b"last");

    Ok(())
}

#[tokio::test]
async fn test_suggested_name_from_page_metadata() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    harness.page.set_metadata(PageMetadata {
        title: Some("Keynote".to_string()),
        channel: Some("Conf".to_string()),
        id: Some("abc123".to_string()),
        channel_link: Some("https://example.com/@ConfChannel".to_string()),
    });
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    let requests = harness.picker.requests();
    assert_eq!(requests[0].suggested_name, "Keynote [abc123].webm");
    assert_eq!(requests[0].id.as_deref(), Some("ConfChannel"));

    let stats = controller.stats().await?.expect("active session");
    assert_eq!(stats.file_name, "Keynote [abc123].webm");
    assert_eq!(stats.mime_type, WEBM_VP9_OPUS);

    Ok(())
}

#[tokio::test]
async fn test_fallback_name_changes_between_sessions() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    for _ in 0..2 {
        controller.start().await?;
        expect_running(&mut pushes, true).await;
        controller.stop().await?;
        expect_running(&mut pushes, false).await;
    }

    let requests = harness.picker.requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].suggested_name, requests[1].suggested_name);
    for request in &requests {
        assert!(request.suggested_name.ends_with(".webm"));
        assert_eq!(request.id, None);
    }

    Ok(())
}

#[tokio::test]
async fn test_unknown_runtime_default_uses_webm_file_name() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant).with_probe(no_support);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    // Encoder picks its own format; the file still gets an extension
    assert_eq!(harness.encoders.options(0).mime_type, None);
    assert!(harness.picker.requests()[0].suggested_name.ends_with(".webm"));

    Ok(())
}

#[tokio::test]
async fn test_runtime_default_mime_is_passed_to_encoder() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    controller.start().await?;
    expect_running(&mut pushes, true).await;

    let options = harness.encoders.options(0);
    assert_eq!(options.mime_type.as_deref(), Some(WEBM_VP9_OPUS));
    assert_eq!(options.audio_bits_per_second, Some(192_000));
    assert_eq!(options.video_bits_per_second, Some(2_500_000));
    assert_eq!(options.video_key_frame_interval, Some(Duration::from_secs(5)));

    Ok(())
}

#[tokio::test]
async fn test_query_messages() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;

    let running = controller.handle_message(InboundMessage::Running).await?;
    assert_eq!(running, Some(OutboundMessage::Running(false)));

    let codecs = controller
        .handle_message(InboundMessage::GetAvailableCodecs)
        .await?;
    match codecs {
        Some(OutboundMessage::AvailableCodecs(options)) => {
            assert_eq!(options.len(), 2);
            assert_eq!(options[0].label(), "VP9 Video + Opus Audio");
        }
        other => panic!("unexpected response: {:?}", other),
    }

    assert_eq!(controller.handle_message(InboundMessage::Stop).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_start_message_pushes_running() -> Result<()> {
    let harness = Harness::new(PickerMode::Grant);
    let controller = SessionController::spawn(harness.config()).await?;
    let mut pushes = controller.subscribe();

    assert_eq!(controller.handle_message(InboundMessage::Start).await?, None);
    expect_running(&mut pushes, true).await;

    assert_eq!(
        controller.handle_message(InboundMessage::Running).await?,
        Some(OutboundMessage::Running(true))
    );

    Ok(())
}
