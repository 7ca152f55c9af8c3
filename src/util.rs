use rand::Rng;

const FRAME_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const FRAME_ID_LEN: usize = 32;

// Generates a fresh 32-character frame id from `[0-9A-Za-z]`.
pub fn new_frame_id() -> String {
    let mut rng = rand::rng();
    (0..FRAME_ID_LEN)
        .map(|_| FRAME_ID_ALPHABET[rng.random_range(0..FRAME_ID_ALPHABET.len())] as char)
        .collect()
}

// Collapse backslashes to slashes, collapse repeated separators, and strip
// one trailing separator.
pub fn normalize_path(path: &str) -> String {
    let unified: String = path.chars().map(|c| if c == '\\' { '/' } else { c }).collect();

    let mut normalized = String::with_capacity(unified.len());
    let mut prev_was_sep = false;
    for c in unified.chars() {
        if c == '/' {
            if prev_was_sep {
                continue;
            }
            prev_was_sep = true;
        } else {
            prev_was_sep = false;
        }
        normalized.push(c);
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_is_32_chars_from_alphabet() {
        let id = new_frame_id();
        assert_eq!(id.len(), 32);
        assert!(id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn frame_ids_are_not_trivially_repeated() {
        let a = new_frame_id();
        let b = new_frame_id();
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_collapses_separators_and_backslashes() {
        assert_eq!(normalize_path("/a//b\\\\c/"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/c"), "/a/b/c");
        assert_eq!(normalize_path("/"), "/");
    }
}
