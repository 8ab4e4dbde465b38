//! Random-access positioning: recompute a [`Context`]'s keystream state to
//! represent an arbitrary absolute byte offset, without re-deriving keys
//! from the header.
//!
//! Forward seeks step the generator; backward seeks reset to `init_key`
//! and step forward from there (no version keeps enough state to run a
//! generator in reverse). V5 has no seek support at all, since its
//! keystream depends on the plaintext/ciphertext stream itself (the
//! chaining byte), not just position.

use crate::context::{Context, Version};
use crate::error::{Error, Result};

impl Context {
    /// Recomputes this context's state to represent absolute position
    /// `offset`, as if [`crate::keystream::Context::apply`] had been
    /// called with exactly `offset` bytes since initialization.
    ///
    /// Returns [`Error::Unimplemented`] for [`Version::V5`].
    pub fn seek(&mut self, offset: u32) -> Result<()> {
        if self.version == Version::V5 {
            return Err(Error::Unimplemented);
        }
        if offset == self.pos {
            return Ok(());
        }

        let reset = offset < self.pos;

        match self.version {
            Version::None | Version::Auto => {}
            Version::V1 => seek_v1(self, offset, reset),
            Version::V2 => seek_v2(self, offset, reset),
            Version::V3 | Version::V4 => seek_single_lcg(self, offset, reset),
            Version::V6 => seek_v6(self, offset, reset),
            Version::V5 => unreachable!("handled above"),
        }

        self.pos = offset;
        Ok(())
    }
}

/// V1 advances/rewinds `xor_key` in 4-byte-group steps, matching the
/// source's `(c - n) >> 2` / `(n - c) >> 2` loop counts (reframed as an
/// absolute-difference-in-the-right-direction, since the source's
/// unsigned subtraction silently wraps when seeking in the "wrong" of its
/// two branches).
fn seek_v1(ctx: &mut Context, offset: u32, _reset: bool) {
    let cur_block = ctx.pos & !3;
    let new_block = offset & !3;
    if new_block > cur_block {
        let steps = (new_block - cur_block) / 4;
        for _ in 0..steps {
            ctx.xor_key = ctx.xor_key.wrapping_add(ctx.update_key);
        }
    } else if cur_block > new_block {
        let steps = (cur_block - new_block) / 4;
        for _ in 0..steps {
            ctx.xor_key = ctx.xor_key.wrapping_sub(ctx.update_key);
        }
    }
}

fn update_v2(ctx: &mut Context) {
    let a = ctx.update_key >> 16;
    let b_lo = a.wrapping_mul(1101463552) & 0x7FFF_FFFF;
    let b_hi = (ctx.update_key & 0xFFFF).wrapping_mul(16807);
    let mut b = b_lo.wrapping_add(b_hi);
    let c = a.wrapping_mul(16807) >> 15;
    let d = c.wrapping_add(b).wrapping_sub(0x7FFF_FFFF);
    b = if b > 0x7FFF_FFFE { d } else { b.wrapping_add(c) };
    ctx.update_key = b;
    ctx.xor_key = ((b >> 23) & 0xFF) | ((b >> 7) & 0xFF00);
}

fn seek_v2(ctx: &mut Context, offset: u32, reset: bool) {
    let mut loop_times = if reset { offset } else { offset - ctx.pos };

    if reset {
        ctx.update_key = ctx.init_key;
        ctx.xor_key = ((ctx.init_key >> 23) & 0xFF) | ((ctx.init_key >> 7) & 0xFF00);
    } else if ctx.pos % 2 == 1 {
        loop_times -= 1;
        update_v2(ctx);
    }

    for _ in 0..(loop_times / 2) {
        update_v2(ctx);
    }
}

fn seek_single_lcg(ctx: &mut Context, offset: u32, reset: bool) {
    let loop_times = if reset { offset } else { offset - ctx.pos };
    if reset {
        ctx.xor_key = ctx.init_key;
        ctx.update_key = ctx.init_key;
    }
    for _ in 0..loop_times {
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        ctx.xor_key = ctx.update_key;
    }
}

fn seek_v6(ctx: &mut Context, offset: u32, reset: bool) {
    let loop_times = if reset { offset } else { offset - ctx.pos };
    if reset {
        ctx.xor_key = ctx.init_key;
        ctx.update_key = ctx.init_key;
        ctx.second_xor_key = ctx.second_init_key;
        ctx.second_update_key = ctx.second_init_key;
    }
    for _ in 0..loop_times {
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        ctx.xor_key = ctx.update_key;
        ctx.second_update_key = ctx
            .second_mul_val
            .wrapping_mul(ctx.second_update_key)
            .wrapping_add(ctx.second_add_val);
        ctx.second_xor_key = ctx.second_update_key;
    }
}
