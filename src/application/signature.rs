use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, order_handle: &str, transaction_id: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(order_handle.as_bytes());
    mac.update(b"|");
    mac.update(transaction_id.as_bytes());
    mac
}

/// `hex(HMAC_SHA256(secret, order_handle + "|" + transaction_id))`.
///
/// The exact scheme the gateway's checkout flow hands to the client; both
/// sides must match byte for byte.
pub fn sign(secret: &str, order_handle: &str, transaction_id: &str) -> String {
    hex::encode(mac_for(secret, order_handle, transaction_id).finalize().into_bytes())
}

/// Constant-time comparison of a client-supplied hex signature against the
/// expected one. Malformed hex is a mismatch, not an error.
pub fn verify(secret: &str, order_handle: &str, transaction_id: &str, provided: &str) -> bool {
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    mac_for(secret, order_handle, transaction_id)
        .verify_slice(&provided)
        .is_ok()
}
