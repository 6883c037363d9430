/// CRC32 used by MPEG-2 PSI sections (ITU-T H.222.0 / ISO/IEC 13818-1).
///
/// Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final xor.
const CRC32_MPEG2_POLY: u32 = 0x04C1_1DB7;

/// Table-driven MPEG-2 CRC32 calculator.
pub struct Crc32Mpeg2 {
    table: [u32; 256],
}

impl Crc32Mpeg2 {
    /// Creates a calculator with a pre-computed lookup table.
    pub fn new() -> Self {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if (crc & 0x8000_0000) != 0 {
                    (crc << 1) ^ CRC32_MPEG2_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        Self { table }
    }

    /// Calculates the checksum of `data`.
    ///
    /// ```
    /// use tsmeta::utils::Crc32Mpeg2;
    ///
    /// let crc = Crc32Mpeg2::new();
    /// assert_eq!(crc.calculate(&[0x01, 0x01]), 0xD66F_B816);
    /// ```
    pub fn calculate(&self, data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            let index = ((crc >> 24) ^ (byte as u32)) & 0xFF;
            crc = (crc << 8) ^ self.table[index as usize];
        }
        crc
    }

    /// Checks a complete PSI section whose last four bytes hold its CRC32.
    pub fn verify_section(&self, section: &[u8]) -> bool {
        if section.len() < 4 {
            return false;
        }
        let (body, tail) = section.split_at(section.len() - 4);
        let expected = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
        self.calculate(body) == expected
    }
}

impl Default for Crc32Mpeg2 {
    fn default() -> Self {
        Self::new()
    }
}
