//! The keystream engine: XORs a byte buffer in place, advancing
//! [`crate::context::Context`] state.
//!
//! `apply` never allocates and never fails - it operates on an
//! already-validated context (see [`crate::init`]) and a caller-owned
//! buffer. Calling it on a context whose initialization did not return
//! `Ok`, or whose [`crate::init::needs_phase2`] is still true, is a logic
//! error on the caller's part and produces unspecified output.
//!
//! | Version | Bytes per keystream step | Notes |
//! |---------|---------------------------|-------|
//! | `None`  | n/a                       | no-op |
//! | `V1`    | 4 (one `u32`, big-endian) | straddles call boundaries at non-multiple-of-4 `pos` |
//! | `V2`    | 2                         | straddles call boundaries at odd `pos` |
//! | `V3`/`V4` | 1 (single LCG)          | pre-step tap for the first byte of a call, post-step for the rest |
//! | `V5`    | 1 (chained)               | encrypt and decrypt are structurally distinct, see below |
//! | `V6`    | 1 (two LCGs in lockstep)  | |
//!
//! `apply(A); apply(B)` is byte-for-byte equivalent to `apply(A ++ B)` for
//! every version - including V5, whose chaining byte therefore lives in
//! the context (`Context::v5_chain`) rather than being reset per call the
//! way the original C implementation does it (a source quirk that would
//! otherwise break multi-chunk streaming; see `DESIGN.md`).

use crate::context::{Context, Version};

impl Context {
    /// XORs `buf` in place with this context's keystream, advancing
    /// `pos` by `buf.len()`.
    ///
    /// A no-op on an empty buffer, and a no-op (aside from an implicit
    /// `pos` unchanged, since `buf` is empty) for [`Version::None`].
    pub fn apply(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        match self.version {
            Version::None | Version::Auto => {}
            Version::V1 => apply_v1(self, buf),
            Version::V2 => apply_v2(self, buf),
            Version::V3 | Version::V4 => apply_single_lcg(self, buf),
            Version::V5 if self.v5_encrypting => apply_v5_encrypt(self, buf),
            Version::V5 => apply_v5_decrypt(self, buf),
            Version::V6 => apply_v6(self, buf),
        }
        self.pos = self.pos.wrapping_add(buf.len() as u32);
    }
}

fn apply_v1(ctx: &mut Context, mut buf: &mut [u8]) {
    // Consume the 1..3 bytes straddling the previous call's 4-byte
    // boundary using the *current* block's key, only advancing the key
    // once the boundary is actually crossed.
    let mut block_pos = ctx.pos & 3;
    while block_pos != 0 && !buf.is_empty() {
        let shift = match block_pos {
            1 => 16,
            2 => 8,
            3 => 0,
            _ => unreachable!(),
        };
        buf[0] ^= (ctx.xor_key >> shift) as u8;
        buf = &mut buf[1..];
        block_pos += 1;
        if block_pos == 4 {
            ctx.xor_key = ctx.xor_key.wrapping_add(ctx.update_key);
            block_pos = 0;
        }
    }

    let full_blocks = buf.len() / 4;
    for _ in 0..full_blocks {
        let (block, rest) = buf.split_at_mut(4);
        block[0] ^= (ctx.xor_key >> 24) as u8;
        block[1] ^= (ctx.xor_key >> 16) as u8;
        block[2] ^= (ctx.xor_key >> 8) as u8;
        block[3] ^= ctx.xor_key as u8;
        ctx.xor_key = ctx.xor_key.wrapping_add(ctx.update_key);
        buf = rest;
    }

    // 1..3 trailing bytes, using the *next* block's key without advancing it.
    const TAIL_SHIFTS: [u32; 3] = [24, 16, 8];
    for (b, shift) in buf.iter_mut().zip(TAIL_SHIFTS) {
        *b ^= (ctx.xor_key >> shift) as u8;
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

fn apply_v2(ctx: &mut Context, mut buf: &mut [u8]) {
    if ctx.pos & 1 != 0
        && let Some((first, rest)) = std::mem::take(&mut buf).split_first_mut()
    {
        *first ^= (ctx.xor_key >> 8) as u8;
        buf = rest;
        update_v2(ctx);
    }

    let pairs = buf.len() / 2;
    for _ in 0..pairs {
        let (pair, rest) = buf.split_at_mut(2);
        pair[0] ^= ctx.xor_key as u8;
        pair[1] ^= (ctx.xor_key >> 8) as u8;
        update_v2(ctx);
        buf = rest;
    }

    if let Some(last) = buf.first_mut() {
        *last ^= ctx.xor_key as u8;
    }
}

/// Shared V3/V4 keystream: a single LCG, one byte per step. The pre-step
/// tap is used for the first byte of a call; the post-step value for the
/// rest.
fn apply_single_lcg(ctx: &mut Context, buf: &mut [u8]) {
    let mut tap = ctx.xor_key;
    for b in buf.iter_mut() {
        *b ^= (tap >> ctx.shift_val) as u8;
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        tap = ctx.update_key;
    }
    ctx.xor_key = tap;
}

fn apply_v5_decrypt(ctx: &mut Context, buf: &mut [u8]) {
    let mut chain = ctx.v5_chain;
    for b in buf.iter_mut() {
        let cipher = *b;
        *b = cipher ^ (ctx.xor_key >> ctx.shift_val) as u8 ^ chain;
        chain = cipher;
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        ctx.xor_key = ctx.update_key;
    }
    ctx.v5_chain = chain;
}

fn apply_v5_encrypt(ctx: &mut Context, buf: &mut [u8]) {
    let mut chain = ctx.v5_chain;
    for b in buf.iter_mut() {
        chain ^= (ctx.xor_key >> ctx.shift_val) as u8 ^ *b;
        *b = chain;
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        ctx.xor_key = ctx.update_key;
    }
    ctx.v5_chain = chain;
}

fn apply_v6(ctx: &mut Context, buf: &mut [u8]) {
    for b in buf.iter_mut() {
        let tap =
            (ctx.xor_key >> ctx.shift_val) ^ (ctx.second_xor_key >> ctx.second_shift_val);
        *b ^= tap as u8;
        ctx.update_key = ctx.mul_val.wrapping_mul(ctx.update_key).wrapping_add(ctx.add_val);
        ctx.xor_key = ctx.update_key;
        ctx.second_update_key = ctx
            .second_mul_val
            .wrapping_mul(ctx.second_update_key)
            .wrapping_add(ctx.second_add_val);
        ctx.second_xor_key = ctx.second_update_key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{self, DecryptRequest, EncryptRequest};
    use crate::region::Region;

    fn round_trip(region: Region, version: Option<Version>, filename: &str, plaintext: &[u8]) {
        let mut header = [0u8; 16];
        let mut enc = Context::new();
        let req = match version {
            Some(v) => EncryptRequest::region(region).version(v),
            None => EncryptRequest::region(region),
        };
        init::encrypt_init(&mut enc, req, filename, &mut header).unwrap();

        let mut ciphertext = plaintext.to_vec();
        enc.apply(&mut ciphertext);
        if version != Some(Version::V1) {
            assert_ne!(ciphertext, plaintext, "ciphertext should differ from plaintext");
        }

        let header_size = init::header_size(enc.version());
        let mut dec = Context::new();
        init::decrypt_init(
            &mut dec,
            DecryptRequest::region(region),
            filename,
            &header[..header_size.min(4)],
        )
        .unwrap();
        if init::needs_phase2(&dec) {
            init::decrypt_phase2(
                &mut dec,
                init::Phase2Request::region(region),
                filename,
                &header[4..16],
            )
            .unwrap();
        }

        dec.apply(&mut ciphertext);
        assert_eq!(ciphertext, plaintext);
    }

    #[test]
    fn v2_round_trip() {
        round_trip(Region::Jp, Some(Version::V2), "foo.txt", b"hello honoka");
    }

    #[test]
    fn v3_round_trip() {
        round_trip(Region::En, Some(Version::V3), "live_icon_1.png", &[0u8; 32]);
    }

    #[test]
    fn v4_round_trip() {
        round_trip(Region::Tw, Some(Version::V4), "song.acb", b"some audio bytes");
    }

    #[test]
    fn v5_round_trip() {
        round_trip(Region::Cn, Some(Version::V5), "song_001.acb", b"AAAA");
    }

    #[test]
    fn v6_round_trip() {
        round_trip(Region::En, Some(Version::V6), "x", &[0u8; 16]);
    }

    #[test]
    fn v1_round_trip_across_odd_boundaries() {
        for split in [1usize, 2, 3, 4, 5, 7, 8, 9] {
            let plaintext: Vec<u8> = (0..20u8).collect();
            let mut header = [0u8; 16];
            let mut enc = Context::new();
            init::encrypt_init(
                &mut enc,
                EncryptRequest::region(Region::Jp).version(Version::V1),
                "a",
                &mut header,
            )
            .unwrap();
            let mut ciphertext = plaintext.clone();
            enc.apply(&mut ciphertext);

            let mut dec = Context::new();
            init::decrypt_init(
                &mut dec,
                DecryptRequest::region(Region::Jp).version(Version::V1),
                "a",
                &[],
            )
            .unwrap();

            let mut recovered = ciphertext.clone();
            let split_at = split.min(recovered.len());
            let (first, rest) = recovered.split_at_mut(split_at);
            dec.apply(first);
            dec.apply(rest);
            assert_eq!(recovered, plaintext, "split at {split}");
        }
    }

    #[test]
    fn v2_round_trip_with_odd_split() {
        let plaintext: Vec<u8> = (0..10u8).collect();
        let mut header = [0u8; 16];
        let mut enc = Context::new();
        init::encrypt_init(
            &mut enc,
            EncryptRequest::region(Region::Jp).version(Version::V2),
            "foo.txt",
            &mut header,
        )
        .unwrap();
        let mut ciphertext = plaintext.clone();
        enc.apply(&mut ciphertext);

        let mut dec = Context::new();
        init::decrypt_init(
            &mut dec,
            DecryptRequest::region(Region::Jp).version(Version::V2),
            "foo.txt",
            &header[..4],
        )
        .unwrap();
        let mut recovered = ciphertext.clone();
        let (first, rest) = recovered.split_at_mut(5);
        dec.apply(first);
        dec.apply(rest);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn apply_on_empty_buffer_is_noop() {
        let mut ctx = Context::new();
        let before = ctx;
        let mut buf: [u8; 0] = [];
        ctx.apply(&mut buf);
        assert_eq!(ctx, before);
    }

    #[test]
    fn v5_encrypt_and_decrypt_are_not_interchangeable() {
        let mut header = [0u8; 16];
        let mut enc = Context::new();
        init::encrypt_init(
            &mut enc,
            EncryptRequest::region(Region::Cn).version(Version::V5),
            "song_001.acb",
            &mut header,
        )
        .unwrap();
        let plaintext = b"AAAA";
        let mut encrypted = plaintext.to_vec();
        enc.apply(&mut encrypted);

        // Feeding ciphertext through another "encrypt" context must not
        // recover the plaintext - only a decrypt-mode context does.
        let mut enc2 = Context::new();
        init::encrypt_init(
            &mut enc2,
            EncryptRequest::region(Region::Cn).version(Version::V5),
            "song_001.acb",
            &mut [0u8; 16],
        )
        .unwrap();
        let mut wrong = encrypted.clone();
        enc2.apply(&mut wrong);
        assert_ne!(wrong, *plaintext);
    }

    #[test]
    fn v5_ordering_guarantee_holds_across_call_boundary() {
        let mut header = [0u8; 16];
        let mut enc = Context::new();
        init::encrypt_init(
            &mut enc,
            EncryptRequest::region(Region::Cn).version(Version::V5),
            "song.acb",
            &mut header,
        )
        .unwrap();
        let plaintext: Vec<u8> = (0..40u8).collect();

        let mut whole = plaintext.clone();
        enc.apply(&mut whole);

        let mut enc_split = Context::new();
        init::encrypt_init(
            &mut enc_split,
            EncryptRequest::region(Region::Cn).version(Version::V5),
            "song.acb",
            &mut [0u8; 16],
        )
        .unwrap();
        let mut split = plaintext.clone();
        let (a, b) = split.split_at_mut(13);
        enc_split.apply(a);
        enc_split.apply(b);

        assert_eq!(whole, split);
    }
}
