//! Parameters governing a [`crate::ClientFactory`]

/// Factory configuration
///
/// Defaults are suitable for typical deployments: the encode slot comfortably
/// holds the largest practical PROXY v2 header (16 bytes plus a 216-byte UNIX
/// address block plus TLVs), and one slot is held per session only between
/// its outbound Begin and the first usable Window.
pub struct Config {
    pub(crate) encode_slot_size: usize,
    pub(crate) encode_slot_count: usize,
    pub(crate) scratch_capacity: usize,
}

impl Config {
    /// Size in bytes of each pending-header slot
    ///
    /// Must accommodate the full encoded header; encoding fails the session
    /// if it does not fit.
    pub fn encode_slot_size(&mut self, value: usize) -> &mut Self {
        self.encode_slot_size = value;
        self
    }

    /// Number of pending-header slots, bounding the number of sessions that
    /// may simultaneously await their first Window
    pub fn encode_slot_count(&mut self, value: usize) -> &mut Self {
        self.encode_slot_count = value;
        self
    }

    /// Initial capacity of the shared frame-builder scratch buffer
    pub fn scratch_capacity(&mut self, value: usize) -> &mut Self {
        self.scratch_capacity = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encode_slot_size: 2048,
            encode_slot_count: 64,
            scratch_capacity: 64 * 1024,
        }
    }
}
