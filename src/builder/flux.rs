//! Flux script rendering for tag lookups and for the finished query.

use anyhow::{bail, Result};

use super::types::{BuilderConfig, TagPredicate};

/// How far back tag lookups look for series.
pub const SEARCH_DURATION: &str = "30d";
/// Upper bound on candidates returned by one lookup.
pub const LOOKUP_LIMIT: usize = 200;

const INTERNAL_COLUMNS: &[&str] = &["_time", "_start", "_stop", "_value", "_field", "_measurement"];

/// Quote `value` as a Flux string literal.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// A case-insensitive substring match as a Flux regex literal.
pub fn search_regex(term: &str) -> String {
    let escaped = regex::escape(term).replace('/', "\\/");
    format!("/(?i:{escaped})/")
}

fn record_ref(key: &str) -> String {
    format!("r[{}]", string_literal(key))
}

/// Body of a `fn: (r) => ...` predicate: values of one key are OR-ed, keys
/// are AND-ed. Returns `true` when there is nothing to filter on.
pub fn predicate_body(predicates: &[TagPredicate]) -> String {
    let clauses: Vec<String> = predicates
        .iter()
        .filter(|p| !p.values.is_empty())
        .map(|p| {
            let column = record_ref(&p.key);
            let alternatives: Vec<String> = p
                .values
                .iter()
                .map(|value| format!("{column} == {}", string_literal(value)))
                .collect();
            match alternatives.as_slice() {
                [single] => single.clone(),
                _ => format!("({})", alternatives.join(" or ")),
            }
        })
        .collect();

    if clauses.is_empty() {
        "true".to_string()
    } else {
        clauses.join(" and ")
    }
}

fn search_filter(search_term: &str) -> String {
    if search_term.is_empty() {
        String::new()
    } else {
        format!(
            "\n  |> filter(fn: (r) => r._value =~ {})",
            search_regex(search_term)
        )
    }
}

pub fn find_keys_script(bucket: &str, predicates: &[TagPredicate], search_term: &str) -> String {
    let excluded: Vec<String> = INTERNAL_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(predicates.iter().map(|p| p.key.clone()))
        .map(|key| format!("r._value != {}", string_literal(&key)))
        .collect();

    format!(
        "import \"influxdata/influxdb/v1\"\n\
         v1.tagKeys(bucket: {bucket}, predicate: (r) => {predicate}, start: -{SEARCH_DURATION})\n  \
         |> filter(fn: (r) => {excluded}){search}\n  \
         |> sort()\n  \
         |> limit(n: {LOOKUP_LIMIT})",
        bucket = string_literal(bucket),
        predicate = predicate_body(predicates),
        excluded = excluded.join(" and "),
        search = search_filter(search_term),
    )
}

pub fn find_values_script(
    bucket: &str,
    predicates: &[TagPredicate],
    key: &str,
    search_term: &str,
) -> String {
    format!(
        "import \"influxdata/influxdb/v1\"\n\
         v1.tagValues(bucket: {bucket}, tag: {key}, predicate: (r) => {predicate}, start: -{SEARCH_DURATION}){search}\n  \
         |> sort()\n  \
         |> limit(n: {LOOKUP_LIMIT})",
        bucket = string_literal(bucket),
        key = string_literal(key),
        predicate = predicate_body(predicates),
        search = search_filter(search_term),
    )
}

/// Render the query a builder config describes. One query per selected
/// function, each with its own `yield`; a plain query when none is selected.
pub fn build_query(config: &BuilderConfig, range: &str) -> Result<String> {
    let Some(bucket) = config.bucket() else {
        bail!("no bucket selected");
    };
    let range = range.strip_prefix('-').unwrap_or(range);
    let range_secs = range_seconds(range)?;

    let predicates = config.predicates();
    let mut base = format!(
        "from(bucket: {})\n  |> range(start: -{range})",
        string_literal(bucket)
    );
    if !predicates.is_empty() {
        base.push_str(&format!(
            "\n  |> filter(fn: (r) => {})",
            predicate_body(&predicates)
        ));
    }

    if config.functions.is_empty() {
        return Ok(base);
    }

    let period = window_period(range_secs);
    let queries: Vec<String> = config
        .functions
        .iter()
        .map(|function| {
            format!(
                "{base}\n  |> aggregateWindow(every: {period}, fn: {function})\n  |> yield(name: {})",
                string_literal(function)
            )
        })
        .collect();
    Ok(queries.join("\n\n"))
}

/// Length of a range such as `15m` or `7d` in seconds. Only a single
/// `<digits><unit>` duration is accepted since it is spliced into the script.
fn range_seconds(range: &str) -> Result<u64> {
    let split = range
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(range.len());
    let (amount, unit) = range.split_at(split);
    let unit_secs: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => bail!("invalid range {range:?}: expected a duration like 15m, 1h or 7d"),
    };
    let Ok(amount) = amount.parse::<u64>() else {
        bail!("invalid range {range:?}: expected a duration like 15m, 1h or 7d");
    };
    if amount == 0 {
        bail!("query range must be longer than zero");
    }
    match amount.checked_mul(unit_secs) {
        Some(secs) => Ok(secs),
        None => bail!("range {range} is too large"),
    }
}

/// Window period for aggregates: roughly 360 points across the range.
fn window_period(range_secs: u64) -> String {
    let secs = (range_secs / 360).max(1);
    if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::types::TagSelector;

    fn predicate(key: &str, values: &[&str]) -> TagPredicate {
        TagPredicate {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn literals_escape_quotes_and_interpolation() {
        assert_eq!(string_literal(r#"a"b"#), r#""a\"b""#);
        assert_eq!(string_literal("${x}"), r#""\${x}""#);
        assert_eq!(string_literal(r"c:\d"), r#""c:\\d""#);
    }

    #[test]
    fn search_regex_escapes_metacharacters_and_slashes() {
        assert_eq!(search_regex("us-east"), "/(?i:us\\-east)/");
        assert_eq!(search_regex("a/b.c"), "/(?i:a\\/b\\.c)/");
    }

    #[test]
    fn predicate_body_ors_values_and_ands_keys() {
        let body = predicate_body(&[predicate("host", &["a", "b"]), predicate("region", &["us"])]);
        assert_eq!(
            body,
            r#"(r["host"] == "a" or r["host"] == "b") and r["region"] == "us""#
        );
        assert_eq!(predicate_body(&[]), "true");
    }

    #[test]
    fn keys_script_excludes_keys_already_in_use() {
        let script = find_keys_script("telegraf", &[predicate("host", &["a"])], "");
        assert!(script.contains(r#"v1.tagKeys(bucket: "telegraf", predicate: (r) => r["host"] == "a""#));
        assert!(script.contains(r#"r._value != "host""#));
        assert!(script.contains(r#"r._value != "_time""#));
        assert!(!script.contains("=~"));
        assert!(script.ends_with(&format!("limit(n: {LOOKUP_LIMIT})")));
    }

    #[test]
    fn values_script_filters_by_search_term() {
        let script = find_values_script("telegraf", &[], "host", "web");
        assert!(script.contains(r#"tag: "host""#));
        assert!(script.contains("predicate: (r) => true"));
        assert!(script.contains("r._value =~ /(?i:web)/"));
    }

    #[test]
    fn build_query_requires_a_bucket() {
        let err = build_query(&BuilderConfig::default(), "1h").unwrap_err();
        assert!(err.to_string().contains("no bucket"));
    }

    #[test]
    fn build_query_without_functions_is_a_single_filter_query() {
        let config = BuilderConfig {
            buckets: vec!["telegraf".into()],
            tags: vec![
                TagSelector {
                    key: Some("host".into()),
                    values: vec!["a".into()],
                },
                TagSelector::default(),
            ],
            functions: Vec::new(),
        };
        let query = build_query(&config, "1h").unwrap();
        assert_eq!(
            query,
            "from(bucket: \"telegraf\")\n  |> range(start: -1h)\n  |> filter(fn: (r) => r[\"host\"] == \"a\")"
        );
    }

    #[test]
    fn build_query_yields_one_query_per_function() {
        let config = BuilderConfig {
            buckets: vec!["telegraf".into()],
            tags: vec![TagSelector::default()],
            functions: vec!["mean".into(), "max".into()],
        };
        let query = build_query(&config, "-6h").unwrap();
        assert_eq!(query.matches("from(bucket:").count(), 2);
        assert!(query.contains("aggregateWindow(every: 1m, fn: mean)"));
        assert!(query.contains(r#"yield(name: "max")"#));
        assert!(!query.contains("filter("));
    }

    #[test]
    fn window_period_scales_with_range() {
        let period = |range: &str| window_period(range_seconds(range).unwrap());
        assert_eq!(period("1h"), "10s");
        assert_eq!(period("6h"), "1m");
        assert_eq!(period("30d"), "2h");
        assert_eq!(period("1m"), "1s");
    }

    fn bucket_with_mean() -> BuilderConfig {
        BuilderConfig {
            buckets: vec!["telegraf".into()],
            functions: vec!["mean".into()],
            ..Default::default()
        }
    }

    #[test]
    fn oversized_range_is_an_error() {
        let err = build_query(&bucket_with_mean(), "99999999999999999w").unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(build_query(&bucket_with_mean(), "30000w").is_ok());
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        for range in ["", "bogus", "1h) |> drop(columns: [\"x\"]", "1h30m", "h", "1y", "0h"] {
            assert!(
                build_query(&bucket_with_mean(), range).is_err(),
                "range {range:?} should be rejected"
            );
        }
    }
}
