use quire_core::store::StateStore;

use crate::engine::Side;

/// Durable slots the layout engine reads at startup and writes after every
/// drag or minimize toggle.
pub trait LayoutStorage {
    fn load_size(&self, side: Side) -> Option<f64>;
    fn load_minimized(&self, side: Side) -> Option<bool>;
    fn save_size(&self, side: Side, px: f64) -> Result<(), String>;
    fn save_minimized(&self, side: Side, minimized: bool) -> Result<(), String>;
}

impl Side {
    pub fn size_key(self) -> &'static str {
        match self {
            Side::Left => "layout.leftWidth",
            Side::Right => "layout.rightWidth",
            Side::Bottom => "layout.bottomHeight",
        }
    }

    pub fn minimized_key(self) -> &'static str {
        match self {
            Side::Left => "layout.minimizedLeft",
            Side::Right => "layout.minimizedRight",
            Side::Bottom => "layout.minimizedBottom",
        }
    }
}

impl LayoutStorage for StateStore {
    fn load_size(&self, side: Side) -> Option<f64> {
        self.get::<f64>(side.size_key())
            .filter(|px| px.is_finite() && *px >= 0.0)
    }

    fn load_minimized(&self, side: Side) -> Option<bool> {
        self.get::<bool>(side.minimized_key())
    }

    fn save_size(&self, side: Side, px: f64) -> Result<(), String> {
        self.set(side.size_key(), px)
    }

    fn save_minimized(&self, side: Side, minimized: bool) -> Result<(), String> {
        self.set(side.minimized_key(), minimized)
    }
}
