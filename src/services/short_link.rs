//! Short recipe links: the recipe id written in base 36.

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn encode(id: i32) -> String {
    let mut value = u64::from(id.unsigned_abs());
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `None` unless the code is exactly what [`encode`] produces for a positive id. Signs,
/// uppercase letters and leading zeros are rejected, so every recipe has one short link.
pub fn decode(code: &str) -> Option<i32> {
    if code.is_empty() || !code.bytes().all(|b| ALPHABET.contains(&b)) {
        return None;
    }
    let value = i64::from_str_radix(code, 36).ok()?;
    i32::try_from(value)
        .ok()
        .filter(|id| *id > 0 && encode(*id) == code)
}

pub fn short_link_url(public_url: &str, recipe_id: i32) -> String {
    format!("{}/s/{}", public_url.trim_end_matches('/'), encode(recipe_id))
}

pub fn recipe_page_url(frontend_url: &str, recipe_id: i32) -> String {
    format!("{}/recipes/{}/", frontend_url.trim_end_matches('/'), recipe_id)
}
