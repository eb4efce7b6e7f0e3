use chrono::Utc;

/// Time-based opaque id for locally created records (messages, stories).
/// Millisecond timestamp plus a random tie-break so two writes landing in
/// the same millisecond stay distinct.
pub(crate) fn time_based_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::random();
    format!("{millis}-{suffix:04x}")
}

/// Lowercases and collapses whitespace runs to single dashes. Punctuation is
/// kept so the derived id stays stable against the seed data as written.
pub(crate) fn slugify(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Eiffel Tower"), "eiffel-tower");
        assert_eq!(slugify("Mt. Fuji"), "mt.-fuji");
        assert_eq!(slugify("Flamenco Beach (Culebra)"), "flamenco-beach-(culebra)");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn test_time_based_id_shape() {
        let id = time_based_id();
        let (millis, suffix) = id.split_once('-').expect("id has a suffix");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 4);
        assert!(u16::from_str_radix(suffix, 16).is_ok());
    }
}
