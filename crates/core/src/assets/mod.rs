use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Source rectangle of one animation frame inside the atlas. Values are
/// passed to the surface as they appear in the map; negative sizes are not
/// rejected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FrameRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Ordered frame rectangles. Array order is playback order; fields other
/// than `x`, `y`, `width` and `height` are ignored.
///
/// ```text
/// [ { "x": 0, "y": 0, "width": 64, "height": 64 }, ... ]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameMap {
    frames: Vec<FrameRect>,
}

impl FrameMap {
    pub fn new(frames: Vec<FrameRect>) -> Self {
        Self { frames }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FrameRect> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[FrameRect] {
        &self.frames
    }
}

/// Decoded RGBA raster. Pixel storage is shared, so clones are cheap.
#[derive(Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Rc<[u8]>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Fully transparent bitmap of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; width as usize * height as usize * 4])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Transport-level answer to a text fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// The transfer finished (the equivalent of ready state 4).
    pub complete: bool,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            complete: true,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            complete: true,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.complete && self.status == 200
    }
}

pub type BitmapCallback = Box<dyn FnOnce(std::result::Result<Bitmap, String>)>;
pub type FetchCallback = Box<dyn FnOnce(FetchResponse)>;

/// Asynchronous bitmap decode and text fetch services.
///
/// Implementations may complete synchronously from inside the call or at any
/// later point on the same thread. Each callback is invoked at most once.
pub trait AssetLoader {
    fn load_bitmap(&self, url: &str, done: BitmapCallback);
    fn fetch_text(&self, url: &str, done: FetchCallback);
}

enum PendingLoad {
    Bitmap(String, BitmapCallback),
    Text(String, FetchCallback),
}

impl PendingLoad {
    fn url(&self) -> &str {
        match self {
            Self::Bitmap(url, _) | Self::Text(url, _) => url,
        }
    }
}

/// In-memory asset registry.
///
/// Unknown bitmaps fail to decode, unknown texts answer with status 404.
/// In deferred mode completions are queued until [`complete`] or
/// [`complete_all`] is called, which lets tests choose the arrival order.
///
/// [`complete`]: MemoryAssetLoader::complete
/// [`complete_all`]: MemoryAssetLoader::complete_all
#[derive(Default)]
pub struct MemoryAssetLoader {
    bitmaps: RefCell<HashMap<String, Bitmap>>,
    texts: RefCell<HashMap<String, FetchResponse>>,
    deferred: bool,
    pending: RefCell<Vec<PendingLoad>>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    pub fn register_bitmap(&self, url: impl Into<String>, bitmap: Bitmap) {
        self.bitmaps.borrow_mut().insert(url.into(), bitmap);
    }

    pub fn register_text(&self, url: impl Into<String>, body: impl Into<String>) {
        self.register_response(url, FetchResponse::ok(body));
    }

    pub fn register_response(&self, url: impl Into<String>, response: FetchResponse) {
        self.texts.borrow_mut().insert(url.into(), response);
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Completes the first queued load for `url`. Returns `false` if none is queued.
    pub fn complete(&self, url: &str) -> bool {
        let load = {
            let mut pending = self.pending.borrow_mut();
            match pending.iter().position(|load| load.url() == url) {
                Some(index) => pending.remove(index),
                None => return false,
            }
        };
        self.finish(load);
        true
    }

    /// Completes every queued load in request order.
    pub fn complete_all(&self) -> usize {
        let loads = std::mem::take(&mut *self.pending.borrow_mut());
        let count = loads.len();
        for load in loads {
            self.finish(load);
        }
        count
    }

    fn finish(&self, load: PendingLoad) {
        match load {
            PendingLoad::Bitmap(url, done) => {
                let bitmap = self.bitmaps.borrow().get(&url).cloned();
                done(bitmap.ok_or_else(|| format!("no bitmap registered for `{url}`")));
            }
            PendingLoad::Text(url, done) => {
                let response = self.texts.borrow().get(&url).cloned();
                done(response.unwrap_or_else(|| FetchResponse::status(404)));
            }
        }
    }

    fn dispatch(&self, load: PendingLoad) {
        if self.deferred {
            self.pending.borrow_mut().push(load);
        } else {
            self.finish(load);
        }
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load_bitmap(&self, url: &str, done: BitmapCallback) {
        self.dispatch(PendingLoad::Bitmap(url.to_string(), done));
    }

    fn fetch_text(&self, url: &str, done: FetchCallback) {
        self.dispatch(PendingLoad::Text(url.to_string(), done));
    }
}

impl fmt::Debug for MemoryAssetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAssetLoader")
            .field("bitmaps", &self.bitmaps.borrow().len())
            .field("texts", &self.texts.borrow().len())
            .field("deferred", &self.deferred)
            .field("pending", &self.pending())
            .finish()
    }
}
