//! The mutable keystream state, shared by every algorithm version.
//!
//! A [`Context`] is created by [`crate::init`], mutated exclusively by
//! [`crate::keystream::Context::apply`] and [`crate::seek::Context::seek`],
//! and destroyed by its owner. It is single-owner and not safe for
//! concurrent mutation - multiple independent contexts may run in parallel
//! on disjoint data, but one context must not be shared across threads
//! without external synchronization.

/// Algorithm identification.
///
/// `Auto` is a request sentinel: callers may pass it to
/// [`crate::init::decrypt_init`] to ask the initializer to determine the
/// version from the file header, but a fully-initialized [`Context`]
/// (`phase2_complete() == true`) never rests in this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Transparent passthrough; no keying, no header.
    None,
    /// Headerless 4-byte-group XOR cipher.
    V1,
    /// 4-byte-header, 2-byte-group LCG cipher.
    V2,
    /// 16-byte-header, single-LCG cipher with MD5-seeded table selection.
    V3,
    /// Like V3, but the LCG parameters are chosen from the filename rather
    /// than from the MD5 digest.
    V4,
    /// A chained cipher: encrypt and decrypt are structurally distinct.
    V5,
    /// Two independent LCGs contributing one byte each per plaintext byte.
    V6,
    /// Request sentinel: "figure out the version from the header".
    Auto,
}

/// The codec's mutable per-stream state.
///
/// Three key "slots" are tracked: the primary LCG/generator state (`init_key`
/// / `update_key` / `xor_key` plus `shift_val` / `mul_val` / `add_val`), a
/// secondary slot used only by V6 (`second_*`), and bookkeeping
/// (`pos`, `phase2_complete`, `v5_encrypting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub(crate) version: Version,

    pub(crate) init_key: u32,
    pub(crate) update_key: u32,
    pub(crate) xor_key: u32,
    pub(crate) pos: u32,

    pub(crate) shift_val: u32,
    pub(crate) mul_val: u32,
    pub(crate) add_val: u32,

    pub(crate) second_init_key: u32,
    pub(crate) second_update_key: u32,
    pub(crate) second_xor_key: u32,
    pub(crate) second_shift_val: u32,
    pub(crate) second_mul_val: u32,
    pub(crate) second_add_val: u32,

    pub(crate) phase2_complete: bool,
    pub(crate) v5_encrypting: bool,

    /// Rolling chaining byte for V5, seeded to `0x59` when a context
    /// commits to V5. Kept in the context (rather than reset to `0x59` on
    /// every call the way the original C locals do it) so that
    /// `apply(A); apply(B) == apply(A ++ B)` holds for V5 too.
    pub(crate) v5_chain: u8,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            version: Version::None,
            init_key: 0,
            update_key: 0,
            xor_key: 0,
            pos: 0,
            shift_val: 0,
            mul_val: 0,
            add_val: 0,
            second_init_key: 0,
            second_update_key: 0,
            second_xor_key: 0,
            second_shift_val: 0,
            second_mul_val: 0,
            second_add_val: 0,
            phase2_complete: false,
            v5_encrypting: false,
            v5_chain: 0,
        }
    }
}

impl Context {
    /// A freshly zeroed context, not yet initialized for any algorithm.
    ///
    /// Pass this to [`crate::init::decrypt_init`] or
    /// [`crate::init::encrypt_init`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// The context's current algorithm version.
    ///
    /// Reads as [`Version::Auto`] only while [`crate::init::needs_phase2`]
    /// would also return `true` for an auto-requested V3+ file.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of plaintext bytes XORed since this context was created (not
    /// counting header bytes).
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// Whether phase-2 initialization has completed.
    ///
    /// True immediately after init for `None`/`V1`/`V2`; for `V3..V6` it
    /// becomes true only once [`crate::init::decrypt_phase2`] (or
    /// `encrypt_init`, which has all material upfront) has run.
    pub fn phase2_complete(&self) -> bool {
        self.phase2_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_zeroed_and_not_phase2_complete() {
        let ctx = Context::new();
        assert_eq!(ctx.version(), Version::None);
        assert_eq!(ctx.pos(), 0);
        assert!(!ctx.phase2_complete());
    }
}
