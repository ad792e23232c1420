//! Coinbase scriptSig inspection: BIP34 height and pool tags.

const TAG_MIN_LEN: usize = 3;
const TAG_MAX_LEN: usize = 96;

/// Read the BIP34 block height from the start of a coinbase scriptSig.
///
/// The height is a minimal little-endian push of 1 to 5 bytes. Only the low
/// four bytes of a 5-byte push are used. Returns `None` when the script does
/// not open with such a push.
pub fn parse_bip34_height(script_sig: &[u8]) -> Option<u32> {
    let (&len, rest) = script_sig.split_first()?;
    let len = usize::from(len);
    if !(1..=5).contains(&len) || rest.len() < len {
        return None;
    }

    let height = rest[..len.min(4)]
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    Some(height)
}

/// Find the first `/.../` delimited printable ASCII run in `bytes`.
///
/// Pools commonly sign their coinbase with a tag like `/ViaBTC/`. The run
/// must be 3 to 96 bytes including both slashes. When a candidate fails, the
/// search resumes at the next slash after the opening one.
pub fn extract_pool_tag(bytes: &[u8]) -> Option<String> {
    let mut start = 0;
    while let Some(offset) = bytes[start..].iter().position(|&b| b == b'/') {
        let open = start + offset;
        if let Some(tag) = tag_at(bytes, open) {
            return Some(tag);
        }
        start = open + 1;
    }
    None
}

fn tag_at(bytes: &[u8], open: usize) -> Option<String> {
    for (i, &b) in bytes.iter().enumerate().skip(open + 1) {
        if b == b'/' {
            let candidate = &bytes[open..=i];
            if (TAG_MIN_LEN..=TAG_MAX_LEN).contains(&candidate.len()) {
                return Some(String::from_utf8_lossy(candidate).into_owned());
            }
            return None;
        }
        if !(32..=126).contains(&b) {
            return None;
        }
    }
    None
}
