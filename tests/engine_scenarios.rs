use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::sleep;

use now_playing_engine::engine::now;
use now_playing_engine::provider::ScriptedProvider;
use now_playing_engine::{
    Engine, EngineConfig, PlayState, PlaybackEvent, ProviderError, RawPayload,
};

// Default timing: providers poll at 0s, 5s, 10s, ... and the stabilizer
// ticks one provider timeout later, at 4s, 9s, 14s, ...

fn song(title: &str, playing: bool) -> RawPayload {
    RawPayload {
        title: Some(title.to_string()),
        artist: Some("Artist X".to_string()),
        is_playing: Some(playing),
        ..Default::default()
    }
}

fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn track_titles(events: &[PlaybackEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::TrackChanged { metadata, .. } => {
                metadata.title.known().map(str::to_string)
            }
            _ => None,
        })
        .collect()
}

fn play_states(events: &[PlaybackEvent]) -> Vec<PlayState> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::PlayStateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(50),
        "expected about {expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn higher_priority_source_wins_and_is_promoted_on_third_tick() {
    let p1 = ScriptedProvider::new("p1", 10).repeat(song("Song A", true), 3);
    let p2 = ScriptedProvider::new("p2", 5)
        .then_error(ProviderError::Idle)
        .then(song("Song B", true));

    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .with_provider(p2)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(9_500)).await;
    assert!(drain(&mut events).is_empty());
    assert!(handle.current_metadata().is_none());

    sleep(Duration::from_secs(5)).await;
    let published = drain(&mut events);
    assert_eq!(track_titles(&published), vec!["Song A"]);
    assert_eq!(play_states(&published), vec![PlayState::Playing]);
    assert!(matches!(
        published.first(),
        Some(PlaybackEvent::TrackChanged { .. })
    ));

    let metadata = handle.current_metadata().unwrap();
    assert_eq!(metadata.title.known(), Some("Song A"));
    assert_eq!(handle.play_state(), PlayState::Playing);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn steady_track_is_announced_exactly_once() {
    let p1 = ScriptedProvider::new("p1", 10).repeat(song("Song A", true), 10);
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(60_500)).await;
    let published = drain(&mut events);
    assert_eq!(
        published.len(),
        2,
        "one track change and one play state change: {published:?}"
    );
    assert_eq!(track_titles(&published), vec!["Song A"]);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn flip_flopping_source_never_publishes_a_track() {
    let mut flaky = ScriptedProvider::new("flaky", 1);
    for idx in 0..12 {
        let title = if idx % 2 == 0 { "Video One" } else { "Video Two" };
        flaky = flaky.then(song(title, true));
    }
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(flaky)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut events).is_empty());
    assert!(handle.current_metadata().is_none());
    assert_eq!(handle.play_state(), PlayState::Stopped);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silence_beyond_the_window_stops_playback_once() {
    // Last observation at 10s; the window is 15s, so the tick at 29s is
    // the first one where the silence exceeds it.
    let p1 = ScriptedProvider::new("p1", 10).repeat(song("Song A", true), 3);
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(25_500)).await;
    assert_eq!(drain(&mut events).len(), 2);
    assert_eq!(handle.play_state(), PlayState::Playing);

    sleep(Duration::from_secs(15)).await;
    assert_eq!(
        drain(&mut events),
        vec![PlaybackEvent::PlayStateChanged(PlayState::Stopped)]
    );
    assert!(handle.current_metadata().is_none());
    assert_eq!(handle.play_state(), PlayState::Stopped);

    sleep(Duration::from_secs(30)).await;
    assert!(drain(&mut events).is_empty());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pause_is_published_on_the_next_tick_and_freezes_position() {
    let p1 = ScriptedProvider::new("p1", 10)
        .repeat(song("Song A", true), 4)
        .repeat(song("Song A", false), 4);
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(19_500)).await;
    assert_eq!(play_states(&drain(&mut events)), vec![PlayState::Playing]);

    // Paused report polled at 20s, applied at the 24s tick.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(
        drain(&mut events),
        vec![PlaybackEvent::PlayStateChanged(PlayState::Paused)]
    );

    // No position was ever reported: the track is assumed to have started
    // when first seen at 0s and was paused at 20s.
    assert_close(handle.position(), Duration::from_secs(20));
    sleep(Duration::from_secs(10)).await;
    assert_close(handle.position(), Duration::from_secs(20));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_and_failing_sources_are_skipped() {
    let mut slow = ScriptedProvider::new("slow", 50);
    let mut failing = ScriptedProvider::new("failing", 40);
    for _ in 0..6 {
        slow = slow.then_slow(song("Never Seen", true), Duration::from_secs(10));
        failing = failing.then_error(ProviderError::Failed("backend crashed".into()));
    }
    let steady = ScriptedProvider::new("steady", 5).repeat(song("Song B", true), 6);

    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(slow)
        .with_provider(failing)
        .with_provider(steady)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(14_500)).await;
    let published = drain(&mut events);
    assert_eq!(track_titles(&published), vec!["Song B"]);
    assert_eq!(
        handle.current_metadata().unwrap().title.known(),
        Some("Song B")
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reported_position_is_extrapolated_and_clamped() {
    let mut p1 = ScriptedProvider::new("p1", 10);
    for poll in 0..3u32 {
        p1 = p1.then(RawPayload {
            position: Some(120.0 + 5.0 * f64::from(poll)),
            duration: Some(200.0),
            ..song("Song A", true)
        });
    }
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .start();

    sleep(Duration::from_millis(14_500)).await;
    // Promoted from the 10s report at 130s.
    assert_close(handle.position(), Duration::from_millis(134_500));

    let snapshot = handle.snapshot();
    let much_later = now() + Duration::from_secs(250);
    assert_eq!(
        snapshot.estimate_position(much_later),
        Duration::from_secs(200)
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_published_after_shutdown() {
    let p1 = ScriptedProvider::new("p1", 10)
        .repeat(song("Song A", true), 4)
        .repeat(song("Song B", true), 10);
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(p1)
        .start();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(14_500)).await;
    handle.shutdown().await;

    sleep(Duration::from_secs(60)).await;
    let published = drain(&mut events);
    assert_eq!(track_titles(&published), vec!["Song A"]);
    assert_eq!(events.try_recv(), Err(TryRecvError::Closed));
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_polls_in_flight() {
    let stuck = ScriptedProvider::new("stuck", 10)
        .then_slow(song("Song A", true), Duration::from_secs(3_600));
    let handle = Engine::new(EngineConfig::default())
        .unwrap()
        .with_provider(stuck)
        .start();

    sleep(Duration::from_secs(1)).await;
    let token = handle.cancellation_token();
    assert!(handle.is_running());

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("shutdown should not wait for a stuck provider");
    assert!(token.is_cancelled());
}

#[test]
fn invalid_configuration_is_rejected_at_construction() {
    let config = EngineConfig {
        promotion_threshold: 0,
        ..EngineConfig::default()
    };
    assert!(Engine::new(config).is_err());
}
