//! Stable identifiers derived from detection rules

use uuid::Uuid;

use super::artifact::DetectionRule;
use super::IntegrateError;

/// Maximum alert title length accepted by Grafana
pub const MAX_TITLE_CHARS: usize = 190;

/// MurmurHash3, x86 32-bit variant
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut hash = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        hash ^= k;
        hash = hash.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k ^= u32::from(*byte) << (8 * i);
        }
        hash ^= k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
    }

    // Length is mixed in modulo 2^32
    hash ^= data.len() as u32;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

/// XOR all rule ids together and normalise the result to a version 4,
/// variant 10 UUID. Independent of rule order.
pub fn conversion_uuid(rules: &[DetectionRule]) -> Result<Uuid, IntegrateError> {
    if rules.is_empty() {
        return Err(IntegrateError::NoRules);
    }

    let mut bytes = [0u8; 16];
    for rule in rules {
        let id = Uuid::parse_str(&rule.id)
            .map_err(|e| IntegrateError::InvalidRuleId(rule.id.clone(), e.to_string()))?;
        for (acc, byte) in bytes.iter_mut().zip(id.as_bytes()) {
            *acc ^= byte;
        }
    }

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Ok(Uuid::from_bytes(bytes))
}

/// Alert rule uid: hex of the MurmurHash3 of `<conversion>_<uuid>`
pub fn rule_uid(conversion_name: &str, conversion_id: &Uuid) -> String {
    let key = format!("{}_{}", conversion_name, conversion_id);
    let hash = i64::from(murmur3_32(key.as_bytes(), 0));
    format!("{:x}", hash)
}

/// Rule titles joined with ` & `, cut to [`MAX_TITLE_CHARS`]
pub fn alert_title(rules: &[DetectionRule]) -> String {
    let joined = rules
        .iter()
        .map(|rule| rule.title.as_str())
        .collect::<Vec<_>>()
        .join(" & ");
    joined.chars().take(MAX_TITLE_CHARS).collect()
}
