use std::time::Duration;

use now_playing_engine::provider::ScriptedProvider;
use now_playing_engine::{Engine, EngineConfig, RawPayload};

fn playing_at(position: f64) -> RawPayload {
    RawPayload {
        title: Some("Song A".to_string()),
        artist: Some("Artist X".to_string()),
        duration: Some(200.0),
        position: Some(position),
        is_playing: Some(true),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_position_advances_one_second_per_second() {
    let config = EngineConfig::with_poll_interval(Duration::from_secs(1));
    let mut provider = ScriptedProvider::new("player", 10);
    for second in 0..20 {
        provider = provider.then(playing_at(10.0 + second as f64));
    }
    let handle = Engine::new(config).unwrap().with_provider(provider).start();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let mut last = handle.position();

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let current = handle.position();
        let step = current.saturating_sub(last);
        assert!(
            step >= Duration::from_millis(950) && step <= Duration::from_millis(1_050),
            "the position did not advance by a second: {step:?}"
        );
        last = current;
    }

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_position_reads_do_not_wait_for_ticks() {
    let config = EngineConfig::with_poll_interval(Duration::from_secs(5));
    let provider = ScriptedProvider::new("player", 10)
        .repeat(playing_at(60.0), 3)
        .repeat(playing_at(75.0), 3);
    let handle = Engine::new(config).unwrap().with_provider(provider).start();

    tokio::time::sleep(Duration::from_millis(14_100)).await;
    let first = handle.position();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let second = handle.position();

    // Two seconds passed between ticks; the estimate moved anyway.
    let moved = second.saturating_sub(first);
    assert!(
        moved >= Duration::from_millis(1_990) && moved <= Duration::from_millis(2_010),
        "expected two seconds of progress, got {moved:?}"
    );

    handle.shutdown().await;
}
