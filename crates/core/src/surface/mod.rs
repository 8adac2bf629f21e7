use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{Bitmap, FrameKitError, FrameRect, Result};

/// Destination rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Rectangle anchored at the origin.
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// 2-D drawing target used by the sprite player. Only these primitives are
/// ever called.
pub trait DrawSurface {
    fn clear_rect(&mut self, rect: Rect);

    /// Blits `source` from `atlas` into `dest`, scaling as needed.
    fn draw_region(&mut self, atlas: &Bitmap, source: FrameRect, dest: Rect);

    /// Updates backing pixel dimensions and the displayed box size.
    fn set_size(&mut self, width: u32, height: u32);
}

/// Looks up a container by id and attaches a fresh drawing surface to it.
pub trait SurfaceHost {
    fn mount(&self, container_id: &str) -> Result<Box<dyn DrawSurface>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Rect),
    Draw { source: FrameRect, dest: Rect },
    Resize { width: u32, height: u32 },
}

/// Shared command log written by a [`RecordingSurface`].
#[derive(Debug, Clone, Default)]
pub struct DrawLog {
    commands: Rc<RefCell<Vec<DrawCommand>>>,
}

impl DrawLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.borrow().clone()
    }

    pub fn draws(&self) -> Vec<(FrameRect, Rect)> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Draw { source, dest } => Some((*source, *dest)),
                _ => None,
            })
            .collect()
    }

    pub fn last_draw(&self) -> Option<(FrameRect, Rect)> {
        self.draws().last().copied()
    }

    pub fn clear(&self) {
        self.commands.borrow_mut().clear();
    }

    fn push(&self, command: DrawCommand) {
        self.commands.borrow_mut().push(command);
    }
}

/// Surface that records every call instead of rasterising.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    log: DrawLog,
}

impl RecordingSurface {
    pub fn new(log: DrawLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &DrawLog {
        &self.log
    }
}

impl DrawSurface for RecordingSurface {
    fn clear_rect(&mut self, rect: Rect) {
        self.log.push(DrawCommand::Clear(rect));
    }

    fn draw_region(&mut self, _atlas: &Bitmap, source: FrameRect, dest: Rect) {
        self.log.push(DrawCommand::Draw { source, dest });
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.log.push(DrawCommand::Resize { width, height });
    }
}

/// Host with a fixed set of container ids. Each mount gets a recording
/// surface whose log stays reachable through [`RecordingSurfaceHost::log`].
#[derive(Debug, Default)]
pub struct RecordingSurfaceHost {
    containers: HashSet<String>,
    logs: RefCell<HashMap<String, DrawLog>>,
}

impl RecordingSurfaceHost {
    pub fn new<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: containers.into_iter().map(Into::into).collect(),
            logs: RefCell::new(HashMap::new()),
        }
    }

    /// Log of the most recent surface mounted into `container_id`.
    pub fn log(&self, container_id: &str) -> Option<DrawLog> {
        self.logs.borrow().get(container_id).cloned()
    }
}

impl SurfaceHost for RecordingSurfaceHost {
    fn mount(&self, container_id: &str) -> Result<Box<dyn DrawSurface>> {
        if !self.containers.contains(container_id) {
            return Err(FrameKitError::ContainerNotFound(container_id.to_string()));
        }

        let log = DrawLog::new();
        self.logs
            .borrow_mut()
            .insert(container_id.to_string(), log.clone());
        Ok(Box::new(RecordingSurface::new(log)))
    }
}
