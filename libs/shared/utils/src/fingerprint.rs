use std::collections::BTreeMap;

/// 64-bit FNV-1a over the canonical header set. The input is the
/// alphabetically-sorted, lowercase `key:value` pairs joined by `|`, so the
/// fingerprint is invariant under header reordering and name casing.
pub fn header_fingerprint(headers: &BTreeMap<String, String>) -> String {
    let canonical = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("|");
    format!("{:016x}", fnv1a_64(canonical.as_bytes()))
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fnv_vectors() {
        // Published FNV-1a 64 test vectors
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn fingerprint_stable_under_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("accept".to_string(), "text/html".to_string());
        a.insert("user-agent".to_string(), "UnitTest/1.0".to_string());

        let mut b = BTreeMap::new();
        b.insert("user-agent".to_string(), "UnitTest/1.0".to_string());
        b.insert("accept".to_string(), "text/html".to_string());

        assert_eq!(header_fingerprint(&a), header_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_values() {
        let mut a = BTreeMap::new();
        a.insert("accept".to_string(), "text/html".to_string());
        let mut b = BTreeMap::new();
        b.insert("accept".to_string(), "application/json".to_string());
        assert_ne!(header_fingerprint(&a), header_fingerprint(&b));
    }
}
