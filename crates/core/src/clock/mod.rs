//! Process-wide frame clock.
//!
//! Consumers register a [`FrameCallback`] and receive one
//! [`FrameTimingEvent`] per host frame while the clock plays, so every
//! time-based system advances from the same reading.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    config::ClockConfig, FrameKitError, FrameRequestId, FrameScheduler, HostServices, LoopState,
    Result, TimeSource,
};

/// Timing payload handed to every callback on a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTimingEvent {
    /// Timestamp of this tick in milliseconds.
    pub now: f64,
    /// Milliseconds since the previous tick.
    pub elapsed: f64,
    /// `elapsed` relative to one ideal frame, multiplied by the time scale.
    pub delta_scale: f64,
}

/// Registered frame consumer. Identity is the `Rc` allocation, so keep the
/// handle around to unregister it later.
pub type FrameCallback = Rc<dyn Fn(&FrameTimingEvent)>;

/// Wraps a closure into a [`FrameCallback`].
pub fn frame_callback(f: impl Fn(&FrameTimingEvent) + 'static) -> FrameCallback {
    Rc::new(f)
}

struct ClockShared {
    time: Rc<dyn TimeSource>,
    scheduler: Rc<dyn FrameScheduler>,
    state: RefCell<ClockState>,
}

struct ClockState {
    started_at: f64,
    ideal_frame_ms: f64,
    time_scale: f64,
    playing: bool,
    last_tick_at: f64,
    current_tick_at: f64,
    last_event: Option<FrameTimingEvent>,
    callbacks: Vec<FrameCallback>,
    frame_loop: LoopState,
}

/// Cheap, clonable handle to one clock. All clones drive the same state.
#[derive(Clone)]
pub struct FrameClock {
    shared: Rc<ClockShared>,
}

impl FrameClock {
    pub fn new(host: &HostServices, config: &ClockConfig) -> Self {
        let started_at = host.time.now_ms();
        Self {
            shared: Rc::new(ClockShared {
                time: host.time.clone(),
                scheduler: host.scheduler.clone(),
                state: RefCell::new(ClockState {
                    started_at,
                    ideal_frame_ms: config.ideal_frame_ms(),
                    time_scale: config.time_scale,
                    playing: false,
                    last_tick_at: started_at,
                    current_tick_at: started_at,
                    last_event: None,
                    callbacks: Vec::new(),
                    frame_loop: LoopState::Idle,
                }),
            }),
        }
    }

    /// Starts the callback loop and runs the first tick right away.
    /// Calling it while already playing does nothing.
    pub fn play(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.playing {
                return;
            }
            state.playing = true;
            state.frame_loop = LoopState::Idle;
        }
        tracing::debug!("frame clock playing");
        self.tick(None);
    }

    /// Stops the loop. The pending host frame is cancelled, so no callback
    /// runs after this returns (even when called from inside a callback).
    pub fn pause(&self) {
        let mut state = self.shared.state.borrow_mut();
        if !state.playing {
            return;
        }
        state.playing = false;
        state.frame_loop.cancel(self.shared.scheduler.as_ref());
        tracing::debug!("frame clock paused");
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.borrow().playing
    }

    /// Reads and optionally updates the time scale.
    ///
    /// `None`, zero and NaN only read the current value. Any other value is
    /// stored as is; negative scales run time-based consumers backwards.
    pub fn time_scale(&self, rate: Option<f64>) -> f64 {
        let mut state = self.shared.state.borrow_mut();
        if let Some(rate) = rate.filter(|rate| *rate != 0.0 && !rate.is_nan()) {
            state.time_scale = rate;
        }
        state.time_scale
    }

    /// Appends a callback. Registering the same handle twice makes it run
    /// twice per tick.
    pub fn register_callback(&self, callback: FrameCallback) {
        self.shared.state.borrow_mut().callbacks.push(callback);
    }

    /// Removes the first registration of `callback`.
    pub fn unregister_callback(&self, callback: &FrameCallback) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        let index = state
            .callbacks
            .iter()
            .position(|registered| Rc::ptr_eq(registered, callback))
            .ok_or(FrameKitError::CallbackNotRegistered)?;
        state.callbacks.remove(index);
        Ok(())
    }

    pub fn callback_count(&self) -> usize {
        self.shared.state.borrow().callbacks.len()
    }

    pub fn started_at(&self) -> f64 {
        self.shared.state.borrow().started_at
    }

    pub fn last_tick_at(&self) -> f64 {
        self.shared.state.borrow().last_tick_at
    }

    pub fn current_tick_at(&self) -> f64 {
        self.shared.state.borrow().current_tick_at
    }

    /// Event produced by the most recent tick that fanned out.
    pub fn last_event(&self) -> Option<FrameTimingEvent> {
        self.shared.state.borrow().last_event
    }

    /// `request` is the host request being served, or `None` for the tick
    /// `play` runs directly.
    fn tick(&self, request: Option<FrameRequestId>) {
        let now = self.shared.time.now_ms();
        let (event, callbacks) = {
            let mut state = self.shared.state.borrow_mut();
            if let Some(id) = request {
                // Taken by the host before a pause or restart replaced it.
                if !state.frame_loop.is_live(id) {
                    return;
                }
                state.frame_loop = LoopState::Idle;
            }

            state.last_tick_at = state.current_tick_at;
            state.current_tick_at = now;
            let elapsed = state.current_tick_at - state.last_tick_at;
            let event = FrameTimingEvent {
                now,
                elapsed,
                delta_scale: (elapsed / state.ideal_frame_ms) * state.time_scale,
            };

            if !state.playing {
                return;
            }

            // Reschedule before fan-out; a callback that pauses cancels this request.
            let weak = Rc::downgrade(&self.shared);
            let id = self
                .shared
                .scheduler
                .request_frame(Box::new(move |id| tick_weak(&weak, id)));
            state.frame_loop = LoopState::Scheduled(id);
            state.last_event = Some(event);

            // Registry changes made by callbacks apply from the next tick.
            (event, state.callbacks.clone())
        };

        tracing::trace!(
            elapsed = event.elapsed,
            delta_scale = event.delta_scale,
            callbacks = callbacks.len(),
            "frame clock tick"
        );
        for callback in &callbacks {
            callback(&event);
        }
    }
}

fn tick_weak(shared: &Weak<ClockShared>, id: FrameRequestId) {
    if let Some(shared) = shared.upgrade() {
        FrameClock { shared }.tick(Some(id));
    }
}

impl fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("FrameClock")
            .field("playing", &state.playing)
            .field("time_scale", &state.time_scale)
            .field("current_tick_at", &state.current_tick_at)
            .field("callbacks", &state.callbacks.len())
            .field("frame_loop", &state.frame_loop)
            .finish()
    }
}

thread_local! {
    static SHARED_CLOCK: RefCell<Option<FrameClock>> = const { RefCell::new(None) };
}

/// Installs `clock` as this thread's shared clock, returning the previous one.
///
/// Components should prefer taking a [`FrameClock`] handle at construction;
/// the shared slot exists for code that cannot be handed one.
pub fn install_shared(clock: FrameClock) -> Option<FrameClock> {
    SHARED_CLOCK.with(|slot| slot.borrow_mut().replace(clock))
}

/// The clock installed with [`install_shared`], if any.
pub fn shared() -> Option<FrameClock> {
    SHARED_CLOCK.with(|slot| slot.borrow().clone())
}

/// Removes and pauses the shared clock.
pub fn uninstall_shared() -> Option<FrameClock> {
    let clock = SHARED_CLOCK.with(|slot| slot.borrow_mut().take());
    if let Some(clock) = &clock {
        clock.pause();
    }
    clock
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{ManualFrameScheduler, ManualTimeSource, MemoryAssetLoader};

    struct Harness {
        time: ManualTimeSource,
        scheduler: Rc<ManualFrameScheduler>,
        clock: FrameClock,
    }

    fn harness() -> Harness {
        let time = ManualTimeSource::new(1_000.0);
        let scheduler = Rc::new(ManualFrameScheduler::new());
        let host = HostServices::new(
            Rc::new(time.clone()),
            scheduler.clone(),
            Rc::new(MemoryAssetLoader::new()),
        );
        let clock = FrameClock::new(&host, &ClockConfig::default());
        Harness {
            time,
            scheduler,
            clock,
        }
    }

    fn recorder() -> (FrameCallback, Rc<RefCell<Vec<FrameTimingEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        (frame_callback(move |event| sink.borrow_mut().push(*event)), events)
    }

    #[test]
    fn delta_scale_tracks_elapsed_and_time_scale() {
        let h = harness();
        let (callback, events) = recorder();
        h.clock.register_callback(callback);
        h.clock.play();

        h.time.advance(20.0);
        h.scheduler.run_frame();
        h.clock.time_scale(Some(2.0));
        h.time.advance(20.0);
        h.scheduler.run_frame();
        h.time.advance(40.0);
        h.scheduler.run_frame();

        let events = events.borrow();
        let base = events[1].delta_scale;
        assert!((base - 1.2).abs() < 1e-9);
        assert!((events[2].delta_scale - 2.0 * base).abs() < 1e-9);
        assert!((events[3].delta_scale - 4.0 * base).abs() < 1e-9);
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let h = harness();
        let order = Rc::new(RefCell::new(Vec::new()));
        let a_log = order.clone();
        let b_log = order.clone();
        let a = frame_callback(move |event| a_log.borrow_mut().push(("a", *event)));
        let b = frame_callback(move |event| b_log.borrow_mut().push(("b", *event)));
        h.clock.register_callback(a);
        h.clock.register_callback(b);

        h.clock.play();
        order.borrow_mut().clear();
        h.time.advance(16.67);
        h.scheduler.run_frame();

        let order = order.borrow();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].0, "a");
        assert_eq!(order[1].0, "b");
        for (_, event) in order.iter() {
            assert!((event.delta_scale - 1.0).abs() < 1e-3);
            assert!((event.elapsed - 16.67).abs() < 1e-9);
        }
    }

    #[test]
    fn duplicate_registrations_fire_per_entry() {
        let h = harness();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let callback = frame_callback(move |_| counter.set(counter.get() + 1));

        h.clock.register_callback(callback.clone());
        h.clock.register_callback(callback.clone());
        h.clock.play();
        assert_eq!(hits.get(), 2);

        h.clock.unregister_callback(&callback).unwrap();
        h.scheduler.run_frame();
        assert_eq!(hits.get(), 3);
        assert_eq!(h.clock.callback_count(), 1);
    }

    #[test]
    fn unregistering_an_unknown_callback_fails_without_side_effects() {
        let h = harness();
        let (kept, _) = recorder();
        let (stranger, _) = recorder();
        h.clock.register_callback(kept);

        let err = h.clock.unregister_callback(&stranger).unwrap_err();
        assert!(matches!(err, FrameKitError::CallbackNotRegistered));
        assert_eq!(h.clock.callback_count(), 1);
    }

    #[test]
    fn pause_stops_all_further_callbacks() {
        let h = harness();
        let (callback, events) = recorder();
        h.clock.register_callback(callback);
        h.clock.play();
        h.scheduler.run_frames(3);
        assert_eq!(events.borrow().len(), 4);

        h.clock.pause();
        assert_eq!(h.scheduler.pending(), 0);
        h.scheduler.run_frames(3);
        assert_eq!(events.borrow().len(), 4);
        assert!(!h.clock.is_playing());
    }

    #[test]
    fn pausing_from_a_callback_cancels_the_next_tick() {
        let h = harness();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let clock = h.clock.clone();
        h.clock.register_callback(frame_callback(move |_| {
            counter.set(counter.get() + 1);
            clock.pause();
        }));

        h.clock.play();
        h.scheduler.run_frames(2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn play_is_idempotent() {
        let h = harness();
        h.clock.play();
        h.clock.play();
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn tick_timestamps_roll_forward() {
        let h = harness();
        assert_eq!(h.clock.started_at(), 1_000.0);
        assert_eq!(h.clock.current_tick_at(), 1_000.0);

        h.clock.play();
        h.time.advance(25.0);
        h.scheduler.run_frame();

        assert_eq!(h.clock.started_at(), 1_000.0);
        assert_eq!(h.clock.last_tick_at(), 1_000.0);
        assert_eq!(h.clock.current_tick_at(), 1_025.0);
        assert_eq!(h.clock.last_event().map(|event| event.elapsed), Some(25.0));
    }

    #[test]
    fn restart_within_one_host_frame_keeps_a_single_loop() {
        let h = harness();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        h.clock
            .register_callback(frame_callback(move |_| counter.set(counter.get() + 1)));

        // Queued ahead of the clock, so it runs first in the next host frame
        // while the clock's own request has already been taken.
        let clock = h.clock.clone();
        h.scheduler.request_frame(Box::new(move |_| {
            clock.pause();
            clock.play();
        }));
        h.clock.play();
        assert_eq!(hits.get(), 1);

        h.scheduler.run_frame();
        assert_eq!(hits.get(), 2);
        assert_eq!(h.scheduler.pending(), 1);

        h.scheduler.run_frame();
        assert_eq!(hits.get(), 3);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn registry_changes_inside_a_tick_apply_next_tick() {
        let h = harness();
        let (late, late_events) = recorder();
        let (victim, victim_events) = recorder();
        let clock = h.clock.clone();
        let late_handle = late.clone();
        let victim_handle = victim.clone();
        let added = Rc::new(Cell::new(false));
        let once = added.clone();
        h.clock.register_callback(frame_callback(move |_| {
            if !once.replace(true) {
                clock.register_callback(late_handle.clone());
                clock.unregister_callback(&victim_handle).unwrap();
            }
        }));
        h.clock.register_callback(victim);

        h.clock.play();
        assert_eq!(late_events.borrow().len(), 0);
        assert_eq!(victim_events.borrow().len(), 1);

        h.scheduler.run_frame();
        assert_eq!(late_events.borrow().len(), 1);
        assert_eq!(victim_events.borrow().len(), 1);
    }

    #[test]
    fn falsy_time_scales_only_read() {
        let h = harness();
        assert_eq!(h.clock.time_scale(None), 1.0);
        assert_eq!(h.clock.time_scale(Some(0.0)), 1.0);
        assert_eq!(h.clock.time_scale(Some(f64::NAN)), 1.0);
        assert_eq!(h.clock.time_scale(Some(-0.5)), -0.5);
        assert_eq!(h.clock.time_scale(None), -0.5);
    }

    #[test]
    fn shared_slot_round_trips_one_clock() {
        let h = harness();
        assert!(install_shared(h.clock.clone()).is_none());

        let shared_clock = shared().expect("clock should be installed");
        shared_clock.play();
        assert!(h.clock.is_playing());

        let removed = uninstall_shared().unwrap();
        assert!(!removed.is_playing());
        assert!(shared().is_none());
    }

    #[test]
    fn dropped_clock_ignores_its_pending_frame() {
        let h = harness();
        let (callback, events) = recorder();
        h.clock.register_callback(callback);
        h.clock.play();
        drop(h.clock);

        assert_eq!(h.scheduler.run_frame(), 1);
        assert_eq!(events.borrow().len(), 1);
    }
}
