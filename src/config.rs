/// Configuration of a [`SoftRoutingTable`](crate::SoftRoutingTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftRoutingConfig {
    /// The first GSI handed out.
    pub gsi_base: u32,
    /// The number of GSIs available for SINT routes.
    pub gsi_count: u32,
    /// Reject a second route for a (vp, sint) pair that already has one.
    pub unique_routes: bool,
}

/// The implemention for SoftRoutingConfig
impl SoftRoutingConfig {
    /// The new function for SoftRoutingConfig
    pub const fn new(gsi_base: u32, gsi_count: u32) -> Self {
        Self {
            gsi_base,
            gsi_count,
            unique_routes: true,
        }
    }

    /// Allows several routes for the same (vp, sint) pair.
    pub const fn allow_shared_sints(mut self) -> Self {
        self.unique_routes = false;
        self
    }
}

impl Default for SoftRoutingConfig {
    fn default() -> Self {
        // GSIs below 24 belong to the emulated IOAPIC pins.
        Self::new(24, 1024)
    }
}
