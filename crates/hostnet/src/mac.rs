use macaddr::MacAddr6;
use rand::RngCore;

/// Prefix for generated hardware addresses: locally administered, unicast.
const MAC_PREFIX: [u8; 3] = [0x02, 0x00, 0x00];

/// Generate a random locally-administered MAC address.
pub fn random_mac() -> MacAddr6 {
    let mut suffix = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut suffix);
    MacAddr6::new(
        MAC_PREFIX[0],
        MAC_PREFIX[1],
        MAC_PREFIX[2],
        suffix[0],
        suffix[1],
        suffix[2],
    )
}
