use std::{cell::RefCell, rc::Rc};

use frame_kit_core::{
    frame_callback, Bitmap, ClockConfig, FrameClock, FrameRect, FrameTimingEvent, HostServices,
    ManualFrameScheduler, ManualTimeSource, MemoryAssetLoader, PlayerConfig, PlayerState, Rect,
    RecordingSurfaceHost, SpriteSheetPlayer, SpriteSource, UpdateMode,
};

struct Host {
    time: ManualTimeSource,
    scheduler: Rc<ManualFrameScheduler>,
    loader: Rc<MemoryAssetLoader>,
    services: HostServices,
}

fn host() -> Host {
    let time = ManualTimeSource::new(0.0);
    let scheduler = Rc::new(ManualFrameScheduler::new());
    let loader = Rc::new(MemoryAssetLoader::deferred());
    let services = HostServices::new(Rc::new(time.clone()), scheduler.clone(), loader.clone());
    Host {
        time,
        scheduler,
        loader,
        services,
    }
}

#[test]
fn clock_fans_out_one_frame_in_registration_order() {
    let host = host();
    let clock = FrameClock::new(&host.services, &ClockConfig::default());
    let seen: Rc<RefCell<Vec<(&str, FrameTimingEvent)>>> = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    clock.register_callback(frame_callback(move |event| log.borrow_mut().push(("a", *event))));
    let log = seen.clone();
    clock.register_callback(frame_callback(move |event| log.borrow_mut().push(("b", *event))));

    clock.play();
    seen.borrow_mut().clear();
    host.time.advance(16.67);
    host.scheduler.run_frame();

    let seen = seen.borrow();
    assert_eq!(seen.iter().map(|(name, _)| *name).collect::<Vec<_>>(), ["a", "b"]);
    for (_, event) in seen.iter() {
        assert!((event.delta_scale - 1.0).abs() < 1e-3);
        assert_eq!(event.now, 16.67);
    }
}

#[test]
fn clock_and_self_driven_sprite_share_one_host() {
    let host = host();
    host.loader.register_bitmap("walk.png", Bitmap::blank(96, 32));
    host.loader.register_text(
        "walk.json",
        r#"[
            { "x": 0, "y": 0, "width": 32, "height": 32 },
            { "x": 32, "y": 0, "width": 32, "height": 32 },
            { "x": 64, "y": 0, "width": 32, "height": 32 }
        ]"#,
    );
    let surfaces = RecordingSurfaceHost::new(["walker"]);
    let player = SpriteSheetPlayer::new(
        "walker",
        SpriteSource::new("walk.png", "walk.json"),
        UpdateMode::SelfDriven,
        &host.services,
        &surfaces,
        PlayerConfig {
            rng_seed: Some(42),
            ..PlayerConfig::default()
        },
    )
    .unwrap();
    player.resize(64, 64);

    let clock = FrameClock::new(&host.services, &ClockConfig::default());
    let ticks = Rc::new(RefCell::new(0));
    let counter = ticks.clone();
    clock.register_callback(frame_callback(move |_| *counter.borrow_mut() += 1));
    clock.play();

    player.init();
    for _ in 0..5 {
        host.time.advance(16.0);
        host.scheduler.run_frame();
    }
    assert_eq!(player.state(), PlayerState::Loading);

    host.loader.complete_all();
    assert_eq!(player.state(), PlayerState::Playing);

    let mut indices = Vec::new();
    for _ in 0..30 {
        host.time.advance(16.0);
        host.scheduler.run_frame();
        if indices.last() != Some(&player.current_frame_index()) {
            indices.push(player.current_frame_index());
        }
    }

    assert_eq!(indices, [0, 1, 2, 0]);
    assert_eq!(player.state(), PlayerState::InterLoopPause);
    assert_eq!(*ticks.borrow(), 36);

    let log = surfaces.log("walker").unwrap();
    assert_eq!(
        log.last_draw(),
        Some((FrameRect::new(0, 0, 32, 32), Rect::sized(64.0, 64.0)))
    );
}
