/// Session client-ID generation: `<prefix>_<mac-3b-hex>_<epoch-8hex>_<rand-4hex>`.
///
/// Generated once per process start so every broker reconnect inside the same
/// run keeps the same ID; a fresh ID is only picked up on the next restart,
/// mirroring the firmware generating it once at boot from MAC + uptime seed.
use std::time::{SystemTime, UNIX_EPOCH};

pub fn generate(prefix: &str, mac: &[u8; 6]) -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let rand: u16 = {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        (nanos ^ (nanos >> 16)) as u16
    };
    format!(
        "{}_{:02x}{:02x}{:02x}_{:08x}_{:04x}",
        prefix, mac[3], mac[4], mac[5], epoch, rand
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_matches_field_widths() {
        let id = generate("dl", &[0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc]);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "dl");
        assert_eq!(parts[1], "aabbcc");
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[3].len(), 4);
    }
}
