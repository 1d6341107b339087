//! ASCII lowercasing for match buffers.

const ONES: u64 = 0x0101_0101_0101_0101;
const HIGH_BITS: u64 = 0x8080_8080_8080_8080;
const LOW_BITS: u64 = 0x7f7f_7f7f_7f7f_7f7f;

/// Writes the ASCII lowercase form of `src` into `dst`.
///
/// Bytes outside `A`..=`Z` are copied unchanged, so UTF-8 input stays valid.
/// Works eight bytes at a time without branching on the data; the tail is
/// handled by [`bytes_to_lower_ascii_generic`].
///
/// # Panics
///
/// Panics if `dst` and `src` differ in length.
pub fn bytes_to_lower_ascii(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "lowering needs equal-length buffers");

    let mut dst_chunks = dst.chunks_exact_mut(8);
    let mut src_chunks = src.chunks_exact(8);
    for (d, s) in (&mut dst_chunks).zip(&mut src_chunks) {
        let mut word = [0u8; 8];
        word.copy_from_slice(s);
        let w = u64::from_le_bytes(word);

        // Per byte: high bit of `a` is set from 'A' up, high bit of `z` from
        // '[' up. Bytes that already had their high bit set are left alone.
        let h = w & LOW_BITS;
        let a = h + 0x3f * ONES;
        let z = h + 0x25 * ONES;
        let upper = (a ^ z) & !w & HIGH_BITS;

        d.copy_from_slice(&(w | (upper >> 2)).to_le_bytes());
    }

    bytes_to_lower_ascii_generic(dst_chunks.into_remainder(), src_chunks.remainder());
}

/// Byte-at-a-time version of [`bytes_to_lower_ascii`]
pub fn bytes_to_lower_ascii_generic(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s.to_ascii_lowercase();
    }
}

/// Lowercases `src` into `buf`, resizing it to fit, and returns the lowered bytes
pub fn lower_into<'b>(buf: &'b mut Vec<u8>, src: &[u8]) -> &'b [u8] {
    buf.resize(src.len(), 0);
    bytes_to_lower_ascii(buf, src);
    buf
}
