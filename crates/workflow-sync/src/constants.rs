//! Engine-wide constants
//!
//! Single source of truth for limits, spacing and timing defaults.

/// Undo/redo history limits
pub mod history {
    /// Maximum number of snapshots kept before the oldest is evicted
    pub const MAX_ENTRIES: usize = 50;
}

/// Execution viewport bounds and presets
pub mod viewport {
    /// Smallest allowed width or height
    pub const MIN_DIMENSION: u32 = 200;
    /// Largest allowed width or height
    pub const MAX_DIMENSION: u32 = 10_000;
    /// Desktop preset dimensions
    pub const DESKTOP: (u32, u32) = (1920, 1080);
    /// Mobile preset dimensions
    pub const MOBILE: (u32, u32) = (390, 844);
}

/// Auto-layout spacing (canvas units)
pub mod layout {
    /// Distance between BFS depth columns
    pub const HORIZONTAL_SPACING: f64 = 280.0;
    /// Distance between nodes sharing a depth
    pub const VERTICAL_SPACING: f64 = 140.0;
    pub const ORIGIN_X: f64 = 100.0;
    pub const ORIGIN_Y: f64 = 100.0;
}

/// Autosave timing
pub mod autosave {
    /// Debounce window in milliseconds
    pub const DEBOUNCE_MS: u64 = 2_000;
}
