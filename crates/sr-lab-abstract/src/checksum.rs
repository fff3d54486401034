/// Additive checksum shared by both endpoints.
///
/// The sum covers the sequence number, the acknowledgment number (the
/// `NOT_IN_USE` sentinel when a packet carries no ack) and every payload
/// byte. Arithmetic wraps at 32 bits, so changing any single field always
/// changes the result. It detects channel damage, nothing more.
pub fn compute(seq_num: u32, ack_num: u32, payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(seq_num.wrapping_add(ack_num), |sum, &byte| {
            sum.wrapping_add(byte as u32)
        })
}

#[cfg(test)]
mod tests {
    use super::compute;

    #[test]
    fn sums_header_fields_and_bytes() {
        assert_eq!(compute(3, 4, &[1, 2, 3]), 13);
    }

    #[test]
    fn sentinel_ack_wraps_like_minus_one() {
        assert_eq!(compute(5, u32::MAX, &[0; 20]), 4);
    }

    #[test]
    fn single_byte_change_is_visible() {
        let mut payload = [b'a'; 20];
        let before = compute(0, u32::MAX, &payload);
        payload[7] = b'z';
        assert_ne!(before, compute(0, u32::MAX, &payload));
    }
}
