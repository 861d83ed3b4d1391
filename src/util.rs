// MIT License

/// Strip NUL padding and surrounding whitespace from a panel string field.
pub fn normalize(s: &str) -> String {
    s.replace('\0', "").trim().to_string()
}

/// Decode a fixed-width ASCII field from a panel response.
pub fn normalize_bytes(bytes: &[u8]) -> String {
    normalize(&String::from_utf8_lossy(bytes))
}

/// Topic-safe slug: lowercase, runs of non-alphanumerics collapsed to a
/// single hyphen, no leading or trailing hyphen.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_hyphen = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Front Door\0\0\0"), "Front Door");
        assert_eq!(normalize("  Landing PIR  "), "Landing PIR");
        assert_eq!(normalize("\0\0"), "");
    }

    #[test]
    fn test_normalize_bytes() {
        let mut field = [0u8; 16];
        field[..10].copy_from_slice(b"Downstairs");
        assert_eq!(normalize_bytes(&field), "Downstairs");
        assert_eq!(normalize_bytes(b"Upstairs        "), "Upstairs");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Front Door"), "front-door");
        assert_eq!(slugify("Kitchen  PIR"), "kitchen-pir");
        assert_eq!(slugify("Zone #3 (Hall)"), "zone-3-hall");
        assert_eq!(slugify("--House--"), "house");
        assert_eq!(slugify(""), "");
    }
}
