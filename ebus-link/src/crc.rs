//! eBUS CRC-8 (polynomial `0x9b` = x^8 + x^7 + x^4 + x^3 + x + 1).
//!
//! The CRC is defined over the *expanded* byte stream: wherever a logical
//! octet equals `0xAA` or `0xA9`, the escape substitution it would receive
//! on the wire (`0xA9 0x01` or `0xA9 0x00`) is folded into the running
//! register instead of the raw octet itself.

/// Precomputed CRC-8 lookup table, one entry per possible register value.
///
/// Kept as a literal constant (not derived from the polynomial at build
/// time) so that it is bit-for-bit identical to the adapter firmware's own
/// table.
const CRC_LOOKUP_TABLE: [u8; 256] = [
    0x00, 0x9b, 0xad, 0x36, 0xc1, 0x5a, 0x6c, 0xf7, 0x19, 0x82, 0xb4, 0x2f, 0xd8, 0x43, 0x75, 0xee,
    0x32, 0xa9, 0x9f, 0x04, 0xf3, 0x68, 0x5e, 0xc5, 0x2b, 0xb0, 0x86, 0x1d, 0xea, 0x71, 0x47, 0xdc,
    0x64, 0xff, 0xc9, 0x52, 0xa5, 0x3e, 0x08, 0x93, 0x7d, 0xe6, 0xd0, 0x4b, 0xbc, 0x27, 0x11, 0x8a,
    0x56, 0xcd, 0xfb, 0x60, 0x97, 0x0c, 0x3a, 0xa1, 0x4f, 0xd4, 0xe2, 0x79, 0x8e, 0x15, 0x23, 0xb8,
    0xc8, 0x53, 0x65, 0xfe, 0x09, 0x92, 0xa4, 0x3f, 0xd1, 0x4a, 0x7c, 0xe7, 0x10, 0x8b, 0xbd, 0x26,
    0xfa, 0x61, 0x57, 0xcc, 0x3b, 0xa0, 0x96, 0x0d, 0xe3, 0x78, 0x4e, 0xd5, 0x22, 0xb9, 0x8f, 0x14,
    0xac, 0x37, 0x01, 0x9a, 0x6d, 0xf6, 0xc0, 0x5b, 0xb5, 0x2e, 0x18, 0x83, 0x74, 0xef, 0xd9, 0x42,
    0x9e, 0x05, 0x33, 0xa8, 0x5f, 0xc4, 0xf2, 0x69, 0x87, 0x1c, 0x2a, 0xb1, 0x46, 0xdd, 0xeb, 0x70,
    0x0b, 0x90, 0xa6, 0x3d, 0xca, 0x51, 0x67, 0xfc, 0x12, 0x89, 0xbf, 0x24, 0xd3, 0x48, 0x7e, 0xe5,
    0x39, 0xa2, 0x94, 0x0f, 0xf8, 0x63, 0x55, 0xce, 0x20, 0xbb, 0x8d, 0x16, 0xe1, 0x7a, 0x4c, 0xd7,
    0x6f, 0xf4, 0xc2, 0x59, 0xae, 0x35, 0x03, 0x98, 0x76, 0xed, 0xdb, 0x40, 0xb7, 0x2c, 0x1a, 0x81,
    0x5d, 0xc6, 0xf0, 0x6b, 0x9c, 0x07, 0x31, 0xaa, 0x44, 0xdf, 0xe9, 0x72, 0x85, 0x1e, 0x28, 0xb3,
    0xc3, 0x58, 0x6e, 0xf5, 0x02, 0x99, 0xaf, 0x34, 0xda, 0x41, 0x77, 0xec, 0x1b, 0x80, 0xb6, 0x2d,
    0xf1, 0x6a, 0x5c, 0xc7, 0x30, 0xab, 0x9d, 0x06, 0xe8, 0x73, 0x45, 0xde, 0x29, 0xb2, 0x84, 0x1f,
    0xa7, 0x3c, 0x0a, 0x91, 0x66, 0xfd, 0xcb, 0x50, 0xbe, 0x25, 0x13, 0x88, 0x7f, 0xe4, 0xd2, 0x49,
    0x95, 0x0e, 0x38, 0xa3, 0x54, 0xcf, 0xf9, 0x62, 0x8c, 0x17, 0x21, 0xba, 0x4d, 0xd6, 0xe0, 0x7b,
];

fn fold(crc: u8, byte: u8) -> u8 {
    CRC_LOOKUP_TABLE[crc as usize] ^ byte
}

/// Compute the eBUS CRC-8 over a logical (pre-escape) byte slice.
///
/// `data` is the sub-frame from its start up to but not including the CRC
/// octet itself, expressed in raw (unescaped) form. Internally, any `0xAA`
/// or `0xA9` octet is folded as its two-octet wire expansion, matching how
/// the adapter computes the CRC over what actually goes out on the bus.
pub fn ebus_crc(data: &[u8]) -> u8 {
    let mut crc = 0x00u8;
    for &byte in data {
        match byte {
            0xAA => {
                crc = fold(crc, 0xA9);
                crc = fold(crc, 0x01);
            }
            0xA9 => {
                crc = fold(crc, 0xA9);
                crc = fold(crc, 0x00);
            }
            b => crc = fold(crc, b),
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_vector_matches_embedded_crc_octet() {
        let bytes: [u8; 17] = [
            0x10, 0x08, 0xB5, 0x10, 0x09, 0x00, 0x00, 0x3D, 0xFF, 0xFF, 0xFF, 0x06, 0x00, 0x00,
            0x26, 0x00, 0x01,
        ];
        // QQ ZZ PB SB NN=09, 9 data octets, then the CRC at index 14 (5+NN).
        assert_eq!(ebus_crc(&bytes[..14]), bytes[14]);
        assert_eq!(bytes[14], 0x26);
    }

    #[test]
    fn no_escapable_bytes_is_plain_table_walk() {
        let crc = ebus_crc(&[0x10, 0x20, 0x30]);
        let mut expect = 0u8;
        for b in [0x10, 0x20, 0x30] {
            expect = fold(expect, b);
        }
        assert_eq!(crc, expect);
    }

    #[test]
    fn escapable_bytes_fold_as_two_octets() {
        let with_escape = ebus_crc(&[0xAA]);
        let manual = fold(fold(0, 0xA9), 0x01);
        assert_eq!(with_escape, manual);

        let with_escape = ebus_crc(&[0xA9]);
        let manual = fold(fold(0, 0xA9), 0x00);
        assert_eq!(with_escape, manual);
    }
}
