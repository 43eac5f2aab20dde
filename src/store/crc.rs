//! CRC-32 (reflected, polynomial 0xEDB88320 -- the standard/"zip" variant)
//! over sector and entity payloads.

pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC-32 of the ASCII bytes "123456789" is the standard check value.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn differing_inputs_differ() {
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }
}
