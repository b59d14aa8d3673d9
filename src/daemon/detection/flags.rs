/// Set on activity starts that open a new task. Launcher taps always carry it.
pub const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;

/// Set when an activity was started by the system rather than by the user, e.g. the incoming
/// call screen.
pub const FLAG_ACTIVITY_NO_USER_ACTION: u32 = 0x0004_0000;

/// Returns true only if every bit of `bit` is present in `flags`.
pub fn has_flag(flags: u32, bit: u32) -> bool {
    flags & bit == bit
}

/// Decides which flag combinations count as a user initiated launch.
///
/// The default forbidden bit is the platform's no-user-action flag, `0x00040000`. Logs that mark
/// system starts with a different bit, e.g. `0x00000100`, need `forbidden` set to that bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagRules {
    /// All of these bits must be set.
    pub required: u32,
    /// None of these bits may be set. A composite mask is rejected only when all of its bits
    /// are present.
    pub forbidden: u32,
}

impl FlagRules {
    pub fn accepts(&self, flags: u32) -> bool {
        has_flag(flags, self.required) && !has_flag(flags, self.forbidden)
    }
}

impl Default for FlagRules {
    fn default() -> Self {
        Self {
            required: FLAG_ACTIVITY_NEW_TASK,
            forbidden: FLAG_ACTIVITY_NO_USER_ACTION,
        }
    }
}
