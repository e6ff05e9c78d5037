//! Pipeline cache blob header.
//!
//! A pipeline cache blob starts with a fixed header naming the vendor,
//! device and cache UUID it was produced by. Blobs from another device or
//! driver version are useless at best, so the device checks the header
//! before handing a blob to the driver.
//!
//! Layout (little endian):
//!
//! ```text
//! offset  size  field
//!      0     4  header length (32)
//!      4     4  header version (1)
//!      8     4  vendor id
//!     12     4  device id
//!     16    16  cache uuid
//! ```

/// Length of the blob header in bytes.
pub const HEADER_LENGTH: usize = 32;

/// The only header version in use.
pub const HEADER_VERSION: u32 = 1;

/// Identity of the device that produced a pipeline cache blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// PCI vendor id.
    pub vendor_id: u32,
    /// PCI device id.
    pub device_id: u32,
    /// Driver-provided cache compatibility UUID.
    pub cache_uuid: [u8; 16],
}

impl DeviceIdentity {
    /// Parse the identity out of a blob header.
    ///
    /// Returns `None` when the blob is too short or the header length or
    /// version fields are wrong.
    pub fn from_blob(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LENGTH {
            return None;
        }
        let word = |offset: usize| {
            u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ])
        };
        if word(0) as usize != HEADER_LENGTH || word(4) != HEADER_VERSION {
            return None;
        }
        let mut cache_uuid = [0u8; 16];
        cache_uuid.copy_from_slice(&data[16..32]);
        Some(Self {
            vendor_id: word(8),
            device_id: word(12),
            cache_uuid,
        })
    }

    /// Encode the blob header for this identity.
    pub fn header(&self) -> [u8; HEADER_LENGTH] {
        let mut header = [0u8; HEADER_LENGTH];
        header[0..4].copy_from_slice(&(HEADER_LENGTH as u32).to_le_bytes());
        header[4..8].copy_from_slice(&HEADER_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&self.vendor_id.to_le_bytes());
        header[12..16].copy_from_slice(&self.device_id.to_le_bytes());
        header[16..32].copy_from_slice(&self.cache_uuid);
        header
    }

    /// Whether `data` was produced by this device.
    pub fn accepts(&self, data: &[u8]) -> bool {
        Self::from_blob(data).is_some_and(|identity| identity == *self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: DeviceIdentity = DeviceIdentity {
        vendor_id: 0x10de,
        device_id: 0x2684,
        cache_uuid: *b"0123456789abcdef",
    };

    #[test]
    fn test_header_parses_back() {
        let mut blob = IDENTITY.header().to_vec();
        blob.extend_from_slice(&[9, 9, 9]);
        assert_eq!(DeviceIdentity::from_blob(&blob), Some(IDENTITY));
        assert!(IDENTITY.accepts(&blob));
    }

    #[test]
    fn test_rejects_other_device() {
        let other = DeviceIdentity {
            device_id: 0x2204,
            ..IDENTITY
        };
        assert!(!IDENTITY.accepts(&other.header()));
    }

    #[test]
    fn test_rejects_truncated_and_corrupt() {
        assert!(DeviceIdentity::from_blob(&[0u8; 8]).is_none());

        let mut blob = IDENTITY.header();
        blob[4] = 2;
        assert!(DeviceIdentity::from_blob(&blob).is_none());
    }
}
