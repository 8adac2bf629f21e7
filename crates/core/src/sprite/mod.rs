//! Sprite sheet playback.
//!
//! A [`SpriteSheetPlayer`] loads an atlas bitmap and a JSON frame map, then
//! steps through the frames at a fixed cadence with a random pause between
//! loops. It either drives itself through the host frame scheduler or is
//! stepped by its owner through [`SpriteSheetPlayer::update`].

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    clock::{frame_callback, FrameCallback},
    config::{LoadFailurePolicy, PlayerConfig},
    Bitmap, DrawSurface, FetchResponse, FrameMap, FrameRequestId, HostServices, LoadFailure,
    LoopState, Rect, Result, SurfaceHost,
};

/// Number of assets that must arrive before playback starts.
const REQUIRED_ASSETS: usize = 2;

/// Who advances the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// The player requests its own host frames.
    SelfDriven,
    /// The owner calls [`SpriteSheetPlayer::update`] once per step.
    Manual,
}

/// Where the atlas and its frame map live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSource {
    pub atlas_url: String,
    pub map_url: String,
}

impl SpriteSource {
    pub fn new(atlas_url: impl Into<String>, map_url: impl Into<String>) -> Self {
        Self {
            atlas_url: atlas_url.into(),
            map_url: map_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Surface mounted, nothing requested yet.
    Uninitialized,
    Loading,
    Playing,
    /// Back on frame 0, waiting out the random pause between loops.
    InterLoopPause,
    /// A load failed under [`LoadFailurePolicy::Report`].
    Failed,
    Stopped,
}

enum LoadedAsset {
    Atlas(Bitmap),
    Map(FrameMap),
}

/// Counts completed loads and keeps what they produced until both are in.
#[derive(Debug, Default)]
struct LoadJoin {
    loaded: usize,
    atlas: Option<Bitmap>,
    map: Option<FrameMap>,
}

impl LoadJoin {
    /// Stores `asset` and returns the pair once the last one has arrived.
    fn accept(&mut self, asset: LoadedAsset) -> Option<(Bitmap, FrameMap)> {
        match asset {
            LoadedAsset::Atlas(bitmap) => self.atlas = Some(bitmap),
            LoadedAsset::Map(map) => self.map = Some(map),
        }
        self.loaded += 1;

        if self.loaded < REQUIRED_ASSETS {
            return None;
        }
        self.atlas.take().zip(self.map.take())
    }
}

struct PlayerInner {
    container_id: String,
    source: SpriteSource,
    mode: UpdateMode,
    surface: Box<dyn DrawSurface>,
    phase: PlayerState,
    load_generation: u64,
    load_started_at: Option<f64>,
    join: LoadJoin,
    failure: Option<LoadFailure>,
    assets_loaded: bool,
    atlas: Option<Bitmap>,
    map: FrameMap,
    current_frame: usize,
    last_frame_at: f64,
    next_frame_at: f64,
    playing: bool,
    render_size: (u32, u32),
    frame_loop: LoopState,
    watchdog: LoopState,
    rng: fastrand::Rng,
}

impl PlayerInner {
    fn dest_rect(&self) -> Rect {
        Rect::sized(f64::from(self.render_size.0), f64::from(self.render_size.1))
    }

    fn draw_current(&mut self) {
        let dest = self.dest_rect();
        if let (Some(atlas), Some(source)) = (&self.atlas, self.map.get(self.current_frame)) {
            self.surface.draw_region(atlas, *source, dest);
        }
    }

    fn is_waiting_for_assets(&self) -> bool {
        self.phase == PlayerState::Loading && self.failure.is_none()
    }
}

struct PlayerShared {
    host: HostServices,
    config: PlayerConfig,
    frame_duration_ms: f64,
    state: RefCell<PlayerInner>,
    on_failure: RefCell<Option<Rc<dyn Fn(&LoadFailure)>>>,
}

/// Handle to one animated sprite. Clones share the same player.
#[derive(Clone)]
pub struct SpriteSheetPlayer {
    shared: Rc<PlayerShared>,
}

impl SpriteSheetPlayer {
    /// Mounts a drawing surface into `container_id`. Nothing is loaded until
    /// [`init`](Self::init) or [`load`](Self::load).
    pub fn new(
        container_id: &str,
        source: SpriteSource,
        mode: UpdateMode,
        host: &HostServices,
        surfaces: &dyn SurfaceHost,
        config: PlayerConfig,
    ) -> Result<Self> {
        let surface = surfaces.mount(container_id)?;
        let rng = config
            .rng_seed
            .map(fastrand::Rng::with_seed)
            .unwrap_or_else(fastrand::Rng::new);

        Ok(Self {
            shared: Rc::new(PlayerShared {
                host: host.clone(),
                frame_duration_ms: config.frame_duration_ms(),
                config,
                state: RefCell::new(PlayerInner {
                    container_id: container_id.to_string(),
                    source,
                    mode,
                    surface,
                    phase: PlayerState::Uninitialized,
                    load_generation: 0,
                    load_started_at: None,
                    join: LoadJoin::default(),
                    failure: None,
                    assets_loaded: false,
                    atlas: None,
                    map: FrameMap::default(),
                    current_frame: 0,
                    last_frame_at: 0.0,
                    next_frame_at: 0.0,
                    playing: false,
                    render_size: (0, 0),
                    frame_loop: LoopState::Idle,
                    watchdog: LoopState::Idle,
                    rng,
                }),
                on_failure: RefCell::new(None),
            }),
        })
    }

    pub fn init(&self) {
        self.load();
    }

    /// Requests the atlas and the frame map. Both requests are in flight at
    /// once and may complete in either order; playback starts when the
    /// second one lands. Completions from an earlier `load` are ignored.
    pub fn load(&self) {
        let now = self.shared.host.time.now_ms();
        let (generation, source, self_driven) = {
            let mut inner = self.shared.state.borrow_mut();
            inner.load_generation += 1;
            inner.load_started_at = Some(now);
            inner.join = LoadJoin::default();
            inner.failure = None;
            inner.phase = PlayerState::Loading;
            inner.assets_loaded = false;
            inner.playing = false;
            let scheduler = self.shared.host.scheduler.as_ref();
            inner.frame_loop.cancel(scheduler);
            inner.watchdog.cancel(scheduler);
            (
                inner.load_generation,
                inner.source.clone(),
                inner.mode == UpdateMode::SelfDriven,
            )
        };
        tracing::debug!(
            atlas = %source.atlas_url,
            map = %source.map_url,
            "loading sprite sheet"
        );

        if self_driven && self.shared.config.load_timeout_ms.is_some() {
            self.schedule_watchdog();
        }

        let weak = Rc::downgrade(&self.shared);
        let atlas_url = source.atlas_url.clone();
        self.shared.host.loader.load_bitmap(
            &source.atlas_url,
            Box::new(move |result| {
                with_player(&weak, |player| player.on_bitmap(generation, &atlas_url, result))
            }),
        );

        let weak = Rc::downgrade(&self.shared);
        let map_url = source.map_url.clone();
        self.shared.host.loader.fetch_text(
            &source.map_url,
            Box::new(move |response| {
                with_player(&weak, |player| player.on_frame_map(generation, &map_url, response))
            }),
        );
    }

    /// Starts playback from the current frame. Does nothing until both
    /// assets are loaded.
    pub fn play(&self) {
        let start_loop = {
            let mut inner = self.shared.state.borrow_mut();
            if !inner.assets_loaded {
                return;
            }

            let now = self.shared.host.time.now_ms();
            inner.playing = true;
            inner.phase = PlayerState::Playing;
            inner.last_frame_at = now;
            inner.next_frame_at = now + self.shared.frame_duration_ms;
            inner.draw_current();

            inner.mode == UpdateMode::SelfDriven && !inner.frame_loop.is_scheduled()
        };

        tracing::debug!(frame = self.current_frame_index(), "sprite sheet playing");
        if start_loop {
            self.schedule_advance();
        }
    }

    /// Manual-mode step. While loading it only checks the load timeout;
    /// once playing it advances the frame if one is due.
    pub fn update(&self) {
        let (waiting, ready) = {
            let inner = self.shared.state.borrow();
            (
                inner.is_waiting_for_assets(),
                inner.playing && inner.assets_loaded,
            )
        };

        if waiting {
            self.check_load_timeout();
        } else if ready {
            self.advance();
        }
    }

    /// Halts playback and cancels any pending host frame. A later
    /// [`play`](Self::play) resumes from the current frame.
    pub fn stop(&self) {
        let mut inner = self.shared.state.borrow_mut();
        let scheduler = self.shared.host.scheduler.as_ref();
        inner.frame_loop.cancel(scheduler);
        inner.watchdog.cancel(scheduler);
        if !inner.assets_loaded {
            // Orphan the in-flight requests.
            inner.load_generation += 1;
        }
        inner.playing = false;
        inner.phase = PlayerState::Stopped;
    }

    /// Sets the drawn size. Safe at any point, including before load.
    pub fn resize(&self, width: u32, height: u32) {
        let mut inner = self.shared.state.borrow_mut();
        inner.render_size = (width, height);
        inner.surface.set_size(width, height);
    }

    /// Registers an observer for load failures. Only called under
    /// [`LoadFailurePolicy::Report`].
    pub fn on_load_failure(&self, observer: impl Fn(&LoadFailure) + 'static) {
        *self.shared.on_failure.borrow_mut() = Some(Rc::new(observer));
    }

    /// Callback that calls [`update`](Self::update), for driving a manual
    /// player from a [`FrameClock`](crate::FrameClock).
    pub fn frame_callback(&self) -> FrameCallback {
        let weak = Rc::downgrade(&self.shared);
        frame_callback(move |_| with_player(&weak, |player| player.update()))
    }

    pub fn state(&self) -> PlayerState {
        self.shared.state.borrow().phase
    }

    pub fn mode(&self) -> UpdateMode {
        self.shared.state.borrow().mode
    }

    pub fn container_id(&self) -> String {
        self.shared.state.borrow().container_id.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.borrow().playing
    }

    pub fn assets_loaded(&self) -> bool {
        self.shared.state.borrow().assets_loaded
    }

    /// Completed loads of the current attempt.
    pub fn loaded_count(&self) -> usize {
        let inner = self.shared.state.borrow();
        if inner.assets_loaded {
            REQUIRED_ASSETS
        } else {
            inner.join.loaded
        }
    }

    pub fn load_failure(&self) -> Option<LoadFailure> {
        self.shared.state.borrow().failure.clone()
    }

    pub fn current_frame_index(&self) -> usize {
        self.shared.state.borrow().current_frame
    }

    pub fn frame_count(&self) -> usize {
        self.shared.state.borrow().map.len()
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.shared.frame_duration_ms
    }

    pub fn last_frame_at(&self) -> f64 {
        self.shared.state.borrow().last_frame_at
    }

    pub fn next_frame_at(&self) -> f64 {
        self.shared.state.borrow().next_frame_at
    }

    pub fn render_size(&self) -> (u32, u32) {
        self.shared.state.borrow().render_size
    }

    fn on_bitmap(&self, generation: u64, url: &str, result: std::result::Result<Bitmap, String>) {
        let outcome = result
            .map(LoadedAsset::Atlas)
            .map_err(|reason| LoadFailure::Bitmap {
                url: url.to_string(),
                reason,
            });
        self.on_asset(generation, outcome);
    }

    fn on_frame_map(&self, generation: u64, url: &str, response: FetchResponse) {
        let outcome = if !response.is_success() {
            Err(LoadFailure::HttpStatus {
                url: url.to_string(),
                status: response.status,
            })
        } else {
            match FrameMap::from_json(&response.body) {
                Ok(map) if map.is_empty() => Err(LoadFailure::FrameMap {
                    url: url.to_string(),
                    reason: "frame map has no frames".to_string(),
                }),
                Ok(map) => Ok(LoadedAsset::Map(map)),
                Err(err) => Err(LoadFailure::FrameMap {
                    url: url.to_string(),
                    reason: err.to_string(),
                }),
            }
        };
        self.on_asset(generation, outcome);
    }

    fn on_asset(&self, generation: u64, outcome: std::result::Result<LoadedAsset, LoadFailure>) {
        let ready = {
            let mut inner = self.shared.state.borrow_mut();
            if inner.load_generation != generation || !inner.is_waiting_for_assets() {
                return;
            }

            let asset = match outcome {
                Ok(asset) => asset,
                Err(failure) => {
                    drop(inner);
                    self.fail(failure);
                    return;
                }
            };

            match inner.join.accept(asset) {
                Some((atlas, map)) => {
                    tracing::debug!(frames = map.len(), "sprite sheet assets loaded");
                    inner.atlas = Some(atlas);
                    inner.map = map;
                    inner.current_frame = 0;
                    inner.assets_loaded = true;
                    inner
                        .watchdog
                        .cancel(self.shared.host.scheduler.as_ref());
                    true
                }
                None => false,
            }
        };

        if ready {
            self.play();
        }
    }

    fn fail(&self, failure: LoadFailure) {
        let report = self.shared.config.failure_policy == LoadFailurePolicy::Report;
        {
            let mut inner = self.shared.state.borrow_mut();
            tracing::warn!(
                container = %inner.container_id,
                error = %failure,
                "sprite sheet failed to load"
            );
            inner.failure = Some(failure.clone());
            inner
                .watchdog
                .cancel(self.shared.host.scheduler.as_ref());
            if report {
                inner.phase = PlayerState::Failed;
            }
        }

        if report {
            let observer = self.shared.on_failure.borrow().clone();
            if let Some(observer) = observer {
                observer(&failure);
            }
        }
    }

    fn check_load_timeout(&self) {
        let Some(timeout_ms) = self.shared.config.load_timeout_ms else {
            return;
        };
        let elapsed_ms = {
            let inner = self.shared.state.borrow();
            match inner.load_started_at {
                Some(started) if inner.is_waiting_for_assets() => {
                    self.shared.host.time.now_ms() - started
                }
                _ => return,
            }
        };

        if elapsed_ms >= timeout_ms {
            self.fail(LoadFailure::TimedOut { elapsed_ms });
        }
    }

    fn schedule_watchdog(&self) {
        let weak = Rc::downgrade(&self.shared);
        let id = self
            .shared
            .host
            .scheduler
            .request_frame(Box::new(move |id| {
                with_player(&weak, |player| player.on_watchdog(id))
            }));
        self.shared.state.borrow_mut().watchdog = LoopState::Scheduled(id);
    }

    fn on_watchdog(&self, id: FrameRequestId) {
        {
            let mut inner = self.shared.state.borrow_mut();
            if !inner.watchdog.is_live(id) {
                return;
            }
            inner.watchdog = LoopState::Idle;
        }

        self.check_load_timeout();
        if self.shared.state.borrow().is_waiting_for_assets() {
            self.schedule_watchdog();
        }
    }

    fn schedule_advance(&self) {
        let weak = Rc::downgrade(&self.shared);
        let id = self
            .shared
            .host
            .scheduler
            .request_frame(Box::new(move |id| with_player(&weak, |player| player.on_frame(id))));
        self.shared.state.borrow_mut().frame_loop = LoopState::Scheduled(id);
    }

    /// Self-driven loop body: reschedule first, then advance if due.
    /// Requests taken by the host before a `stop` or restart replaced them
    /// are ignored.
    fn on_frame(&self, id: FrameRequestId) {
        {
            let mut inner = self.shared.state.borrow_mut();
            if !inner.frame_loop.is_live(id) || !inner.playing {
                return;
            }
            inner.frame_loop = LoopState::Idle;
        }

        self.schedule_advance();
        self.advance();
    }

    /// Moves to the next frame when its due time has been reached. Returns
    /// whether a frame was drawn.
    fn advance(&self) -> bool {
        let now = self.shared.host.time.now_ms();
        let mut inner = self.shared.state.borrow_mut();
        if now < inner.next_frame_at {
            return false;
        }

        inner.last_frame_at = now;
        inner.next_frame_at = now + self.shared.frame_duration_ms;
        inner.current_frame += 1;
        inner.phase = PlayerState::Playing;

        if inner.current_frame >= inner.map.len() {
            let jitter = inner.rng.f64() * self.shared.config.loop_pause_jitter_ms;
            let pause = self.shared.config.loop_pause_min_ms + jitter;
            inner.next_frame_at = now + pause;
            inner.current_frame = 0;
            inner.phase = PlayerState::InterLoopPause;
            tracing::trace!(pause_ms = pause, "sprite loop finished");
        }

        let dest = inner.dest_rect();
        inner.surface.clear_rect(dest);
        inner.draw_current();
        true
    }
}

fn with_player(shared: &Weak<PlayerShared>, f: impl FnOnce(&SpriteSheetPlayer)) {
    if let Some(shared) = shared.upgrade() {
        f(&SpriteSheetPlayer { shared });
    }
}

impl fmt::Debug for SpriteSheetPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.state.borrow();
        f.debug_struct("SpriteSheetPlayer")
            .field("container_id", &inner.container_id)
            .field("mode", &inner.mode)
            .field("phase", &inner.phase)
            .field("current_frame", &inner.current_frame)
            .field("frame_count", &inner.map.len())
            .field("render_size", &inner.render_size)
            .finish()
    }
}
