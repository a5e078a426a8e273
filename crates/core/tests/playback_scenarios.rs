use std::time::Duration;

use radio_player_core::render::{DrawCommand, FallbackReason};
use radio_player_core::sink::{MediaErrorCode, SinkFault};
use radio_player_core::timer::TimerKind;
use radio_player_core::{
    AudioGraphRegistry, Capabilities, CommandSurface, FrameOutcome, LoadOutcome, ManualTimers,
    MediaSink, MemorySink, PcmTap, PlaybackController, PlaybackStatus, PlayerConfig, SinkEvent,
    SoftwareDecodeBackend, SpectrumRenderer, VisualizerConfig,
};

type Controller = PlaybackController<MemorySink, ManualTimers>;

fn controller() -> Controller {
    PlaybackController::new(
        PlayerConfig::default(),
        Capabilities::headless(),
        MemorySink::new(),
        ManualTimers::new(),
    )
    .unwrap()
}

fn advance(controller: &mut Controller, ms: u64) {
    for token in controller.timers_mut().advance(Duration::from_millis(ms)) {
        controller.handle_timer(token);
    }
}

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.4 * (2.0 * std::f32::consts::PI * 6.0 * i as f32 / 512.0).sin())
        .collect()
}

#[test]
fn visualizer_opened_before_playback_waits_for_the_graph() {
    let registry = AudioGraphRegistry::new();
    let tap = PcmTap::new(4_096);
    let mut controller = controller()
        .with_registry(registry.clone())
        .with_decode_backend(Box::new(SoftwareDecodeBackend::new(tap.clone())));
    let sink = controller.sink().identity().clone();

    let mut renderer = SpectrumRenderer::new(VisualizerConfig::default());
    renderer.open(Some("https://cdn.example/cover.jpg".into()));
    let mut surface = CommandSurface::new(800.0, 450.0);

    for _ in 0..3 {
        let outcome = renderer.frame(&registry, &sink, &mut surface);
        assert_eq!(outcome, FrameOutcome::Fallback(FallbackReason::NoGraph));
        assert!(outcome.should_continue());
    }
    assert!(surface
        .commands()
        .iter()
        .all(|command| matches!(command, DrawCommand::Backdrop(_))));
    assert!(registry.is_empty(), "the renderer must not build a graph");

    controller.load_streams(&["https://radio.example/live.mp3"]);
    controller.play();
    controller.handle_sink_event(SinkEvent::Playing);
    tap.push(&tone(512));

    surface.take_commands();
    assert_eq!(renderer.frame(&registry, &sink, &mut surface), FrameOutcome::Drawn);
    let bars = surface
        .commands()
        .iter()
        .filter(|command| matches!(command, DrawCommand::FillRect { .. }))
        .count();
    assert_eq!(bars, 1 + 2 * 120);
}

#[test]
fn closing_the_visualizer_leaves_the_graph_for_reopening() {
    let registry = AudioGraphRegistry::new();
    let mut controller = controller()
        .with_registry(registry.clone())
        .with_decode_backend(Box::new(SoftwareDecodeBackend::new(PcmTap::new(1_024))));
    controller.load_streams(&["https://radio.example/live.mp3"]);
    controller.play();
    let sink = controller.sink().identity().clone();

    let mut renderer = SpectrumRenderer::new(VisualizerConfig::default());
    let mut surface = CommandSurface::new(400.0, 300.0);
    renderer.open(None);
    assert_eq!(renderer.frame(&registry, &sink, &mut surface), FrameOutcome::Drawn);
    renderer.close();
    assert_eq!(renderer.frame(&registry, &sink, &mut surface), FrameOutcome::Closed);

    controller.stop();
    assert_eq!(registry.len(), 1);
    renderer.open(None);
    assert_eq!(renderer.frame(&registry, &sink, &mut surface), FrameOutcome::Drawn);
}

#[test]
fn no_sink_calls_after_stop_until_the_next_play() {
    let mut controller = controller();
    controller.load_streams(&["https://radio.example/live.mp3"]);
    controller.play();
    controller.handle_sink_event(SinkEvent::Playing);
    controller.handle_sink_event(SinkEvent::Error(SinkFault::new(MediaErrorCode::Network, "reset")));
    assert_eq!(controller.timers().pending_of(TimerKind::Reconnect), 1);

    controller.stop();
    controller.sink_mut().clear_calls();
    for event in [
        SinkEvent::Stalled,
        SinkEvent::Ended,
        SinkEvent::Suspend,
        SinkEvent::Error(SinkFault::new(MediaErrorCode::Decode, "late")),
    ] {
        controller.handle_sink_event(event);
    }
    advance(&mut controller, 60_000);
    assert!(controller.sink().calls().is_empty());
    assert_eq!(controller.state().status, PlaybackStatus::Idle);

    controller.play();
    assert!(!controller.sink().calls().is_empty());
}

#[test]
fn periodic_list_refresh_never_interrupts() {
    let mut controller = controller();
    let list = ["https://radio.example/a.mp3", "https://radio.example/b.mp3"];
    assert_eq!(controller.load_streams(&list), LoadOutcome::Primed);
    controller.play();
    controller.handle_sink_event(SinkEvent::Playing);
    controller.sink_mut().clear_calls();

    for _ in 0..4 {
        assert_eq!(controller.load_streams(&list), LoadOutcome::Unchanged);
        advance(&mut controller, 15_000);
    }
    let reordered = [list[1], list[0]];
    assert_eq!(controller.load_streams(&reordered), LoadOutcome::Deferred);
    assert!(controller.sink().calls().is_empty());
    assert!(controller.state().is_playing());
}

#[test]
fn live_suspend_while_paused_schedules_a_retry() {
    let mut controller = controller();
    controller.load_streams(&["https://radio.example/live.mp3"]);
    controller.play();
    controller.handle_sink_event(SinkEvent::Playing);

    controller.sink_mut().force_pause();
    controller.handle_sink_event(SinkEvent::Suspend);
    assert_eq!(controller.timers().pending_of(TimerKind::Reconnect), 1);
    controller.handle_sink_event(SinkEvent::Suspend);
    assert_eq!(controller.timers().pending_of(TimerKind::Reconnect), 1);

    advance(&mut controller, 1_000);
    assert_eq!(controller.policy().attempts(), 1);
    assert!(!controller.sink().is_paused());
}
