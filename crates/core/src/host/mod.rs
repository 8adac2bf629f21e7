use std::{fmt, rc::Rc};

use crate::{AssetLoader, FrameScheduler, TimeSource};

/// Handles to the host environment shared by the clock and every player.
#[derive(Clone)]
pub struct HostServices {
    pub time: Rc<dyn TimeSource>,
    pub scheduler: Rc<dyn FrameScheduler>,
    pub loader: Rc<dyn AssetLoader>,
}

impl HostServices {
    pub fn new(
        time: Rc<dyn TimeSource>,
        scheduler: Rc<dyn FrameScheduler>,
        loader: Rc<dyn AssetLoader>,
    ) -> Self {
        Self {
            time,
            scheduler,
            loader,
        }
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("now_ms", &self.time.now_ms())
            .finish()
    }
}
