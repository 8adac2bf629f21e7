use std::{cell::Cell, io::ErrorKind, rc::Rc};

use frame_kit_core::{
    AssetLoader, Bitmap, BitmapCallback, DrawSurface, FetchCallback, FetchResponse, FrameKitError,
    FrameRect, Rect, SurfaceHost,
};

/// Loads assets from the local filesystem. Completion is synchronous.
#[derive(Debug, Default)]
pub struct FileAssetLoader;

impl AssetLoader for FileAssetLoader {
    fn load_bitmap(&self, url: &str, done: BitmapCallback) {
        let decoded = image::open(url)
            .map(|image| {
                let rgba = image.to_rgba8();
                let (width, height) = rgba.dimensions();
                Bitmap::new(width, height, rgba.into_raw())
            })
            .map_err(|err| err.to_string());
        done(decoded);
    }

    fn fetch_text(&self, url: &str, done: FetchCallback) {
        let response = match std::fs::read_to_string(url) {
            Ok(body) => FetchResponse::ok(body),
            Err(err) if err.kind() == ErrorKind::NotFound => FetchResponse::status(404),
            Err(err) => {
                tracing::debug!(url, error = %err, "frame map read failed");
                FetchResponse::status(500)
            }
        };
        done(response);
    }
}

/// Mounts [`TracingSurface`]s into a single named container.
#[derive(Debug)]
pub struct TracingSurfaceHost {
    container_id: String,
    draws: Rc<Cell<usize>>,
}

impl TracingSurfaceHost {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            draws: Rc::new(Cell::new(0)),
        }
    }

    /// Total frames drawn by every surface this host mounted.
    pub fn draw_count(&self) -> usize {
        self.draws.get()
    }
}

impl SurfaceHost for TracingSurfaceHost {
    fn mount(&self, container_id: &str) -> frame_kit_core::Result<Box<dyn DrawSurface>> {
        if container_id != self.container_id {
            return Err(FrameKitError::ContainerNotFound(container_id.to_string()));
        }
        tracing::info!(container_id, "surface mounted");
        Ok(Box::new(TracingSurface {
            container_id: container_id.to_string(),
            draws: self.draws.clone(),
        }))
    }
}

/// Surface that reports draw calls through `tracing` instead of rasterising.
#[derive(Debug)]
pub struct TracingSurface {
    container_id: String,
    draws: Rc<Cell<usize>>,
}

impl DrawSurface for TracingSurface {
    fn clear_rect(&mut self, rect: Rect) {
        tracing::trace!(container = %self.container_id, ?rect, "clear");
    }

    fn draw_region(&mut self, atlas: &Bitmap, source: FrameRect, dest: Rect) {
        self.draws.set(self.draws.get() + 1);
        tracing::debug!(
            container = %self.container_id,
            atlas_width = atlas.width(),
            atlas_height = atlas.height(),
            ?source,
            ?dest,
            "draw frame"
        );
    }

    fn set_size(&mut self, width: u32, height: u32) {
        tracing::info!(container = %self.container_id, width, height, "surface resized");
    }
}
