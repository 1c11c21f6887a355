// Sub-byte sample addressing
//   Samples are packed most significant bits first with no row padding, so
//   sample i of a b-bit tile starts at bit i * b of the payload.

/// Sample `index` of a payload packed at `bits` (1, 2 or 4) bits per sample
pub fn packed_sample(bytes: &[u8], index: usize, bits: u32) -> Option<u8> {
    let bits = bits as usize;
    let bit = index * bits;
    let byte = *bytes.get(bit / 8)?;
    let shift = 8 - bits - bit % 8;
    let mask = (1_u16 << bits) as u8 - 1;
    Some((byte >> shift) & mask)
}

pub fn pack_samples(values: &[u8], bits: u32) -> Vec<u8> {
    let width = bits as usize;
    let mask = (1_u16 << width) as u8 - 1;
    let mut packed = vec![0_u8; (values.len() * width).div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        let bit = i * width;
        packed[bit / 8] |= (value & mask) << (8 - width - bit % 8);
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_packed_bits() {
        let bytes = [0b1011_0001, 0b0100_1111];
        let samples: Vec<u8> = (0..16).filter_map(|i| packed_sample(&bytes, i, 1)).collect();
        assert_eq!(samples, vec![1, 0, 1, 1, 0, 0, 0, 1, 0, 1, 0, 0, 1, 1, 1, 1]);
        assert_eq!(packed_sample(&bytes, 0, 4), Some(0xB));
        assert_eq!(packed_sample(&bytes, 3, 4), Some(0xF));
        assert_eq!(packed_sample(&bytes, 4, 4), None);
    }

    #[test]
    fn pack_inverts_addressing() {
        let values = [3_u8, 0, 15, 9, 1];
        let packed = pack_samples(&values, 4);
        assert_eq!(packed, vec![0x30, 0xF9, 0x10]);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(packed_sample(&packed, i, 4), Some(*v));
        }
    }
}
