/// Pick the singular or plural noun for `count`.
pub fn pluralize(count: usize, singular: &str, plural: Option<&str>) -> String {
    if count == 1 {
        return singular.to_string();
    }

    match plural {
        Some(p) => p.to_string(),
        None => format!("{singular}s"),
    }
}

/// `count` followed by the matching noun, e.g. "3 values".
pub fn counted(count: usize, singular: &str, plural: Option<&str>) -> String {
    format!("{count} {}", pluralize(count, singular, plural))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_noun_by_count() {
        assert_eq!(counted(1, "bucket", None), "1 bucket");
        assert_eq!(counted(0, "bucket", None), "0 buckets");
        assert_eq!(counted(2, "key", Some("keys")), "2 keys");
    }
}
