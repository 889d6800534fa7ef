use rand::Rng;

/// No `I`, `O`, `0` or `1`: players type these codes in chat.
pub const LINK_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LINK_CODE_LENGTH: usize = 6;

pub fn generate_link_code() -> String {
    let mut rng = rand::rng();

    (0..LINK_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..LINK_CODE_ALPHABET.len());
            LINK_CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Accepts a Minecraft UUID with or without dashes and returns the dashed,
/// lowercase form. `None` when it is not 32 hex digits.
pub fn normalize_uuid(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex: String = trimmed.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if trimmed.contains('-') {
        let groups: Vec<usize> = trimmed.split('-').map(str::len).collect();
        if groups != [8, 4, 4, 4, 12] {
            return None;
        }
    }

    let hex = hex.to_ascii_lowercase();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// Minecraft names: 3 to 16 chars of letters, digits and underscore.
pub fn is_valid_minecraft_username(name: &str) -> bool {
    (3..=16).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn generated_codes_use_the_alphabet() {
        for _ in 0..200 {
            let code = generate_link_code();
            assert_eq!(code.len(), LINK_CODE_LENGTH);
            assert!(code.bytes().all(|b| LINK_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn codes_are_uppercased() {
        assert_eq!(normalize_code(" ab3def "), "AB3DEF");
    }

    #[rstest]
    #[case("069a79f4-44e9-4726-a5be-fca90e38aaf5", Some("069a79f4-44e9-4726-a5be-fca90e38aaf5"))]
    #[case("069A79F444E94726A5BEFCA90E38AAF5", Some("069a79f4-44e9-4726-a5be-fca90e38aaf5"))]
    #[case("069a79f4-44e9-4726-a5be", None)]
    #[case("069a79f444e9-4726-a5be-fca90e38aaf5", None)]
    #[case("zz9a79f4-44e9-4726-a5be-fca90e38aaf5", None)]
    #[case("", None)]
    fn uuid_normalization(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_uuid(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("Notch", true)]
    #[case("steve_123", true)]
    #[case("ab", false)]
    #[case("this_name_is_too_long", false)]
    #[case("bad-name", false)]
    #[case("spaced name", false)]
    fn minecraft_username_format(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_minecraft_username(name), valid);
    }
}
