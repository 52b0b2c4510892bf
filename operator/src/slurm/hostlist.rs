use crate::util::Error;

/// Expand the compact host-range syntax `name-[a-b,c,...],other-[...]` into
/// the full list of host names it denotes. Commas inside a bracket group do
/// not split hosts; dashes inside a group separate inclusive numeric ranges;
/// a bare comma-separated value with no bracket group is passed through.
pub fn parse_host_list(input: &str) -> Result<Vec<String>, Error> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] != b',' {
            continue;
        }
        // A trailing comma, or one immediately followed by a space, never
        // splits — matches the reference host-range grammar.
        if i + 1 >= bytes.len() || bytes[i + 1] == b' ' {
            continue;
        }
        let inside_brackets = bytes[..=i]
            .iter()
            .rev()
            .find_map(|&b| match b {
                b'[' => Some(true),
                b']' => Some(false),
                _ => None,
            })
            .unwrap_or(false);
        if !inside_brackets {
            parts.push(&input[start..i]);
            start = i + 1;
        }
    }
    parts.push(&input[start..]);

    let mut result = Vec::new();
    for part in parts {
        let Some(bracket_idx) = part.find("-[") else {
            result.push(part.to_string());
            continue;
        };
        let base = format!("{}-", &part[..bracket_idx]);
        let ranges_part = part[bracket_idx + 2..].trim_matches(['[', ']']);
        for range in ranges_part.split(',') {
            match range.split_once('-') {
                Some((lo, hi)) => {
                    let lo: i64 = lo
                        .parse()
                        .map_err(|_| Error::HostRange(format!("non-numeric range start: {range}")))?;
                    let hi: i64 = hi
                        .parse()
                        .map_err(|_| Error::HostRange(format!("non-numeric range end: {range}")))?;
                    for n in lo..=hi {
                        result.push(format!("{base}{n}"));
                    }
                }
                None => result.push(format!("{base}{range}")),
            }
        }
    }
    Ok(result)
}

/// Extract the single `PhysicalHost:<path>` value from a comma-separated
/// scheduler comment, returning its basename. Absent entirely, returns an
/// empty string; present more than once, or with an empty value, is an
/// error.
pub fn parse_physical_host_from_comment(comment: &str) -> Result<String, Error> {
    if comment.is_empty() {
        return Err(Error::PhysicalHostComment("empty comment".into()));
    }

    let mut result = String::new();
    for part in comment.split(',') {
        let Some(value) = part.strip_prefix("PhysicalHost:") else {
            continue;
        };
        if !result.is_empty() {
            return Err(Error::PhysicalHostComment(
                "multiple PhysicalHost comments".into(),
            ));
        }
        if value.is_empty() {
            return Err(Error::PhysicalHostComment("empty PhysicalHost value".into()));
        }
        let basename = value.rsplit('/').next().unwrap_or(value);
        if basename.is_empty() {
            return Err(Error::PhysicalHostComment("empty PhysicalHost value".into()));
        }
        result = basename.to_string();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_expands_to_empty_list() {
        assert_eq!(parse_host_list("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn singleton_passes_through() {
        assert_eq!(parse_host_list("cluster-h100-0-0").unwrap(), vec!["cluster-h100-0-0"]);
    }

    #[test]
    fn comma_separated_singletons_split_outside_brackets() {
        assert_eq!(
            parse_host_list("cluster-h100-0-0,cluster-h100-1-1,cluster-h100-2-2").unwrap(),
            vec!["cluster-h100-0-0", "cluster-h100-1-1", "cluster-h100-2-2"]
        );
    }

    #[test]
    fn bracket_group_expands_ranges_and_singletons() {
        assert_eq!(
            parse_host_list("cluster-h100-0-[0-2,4,6-8]").unwrap(),
            vec![
                "cluster-h100-0-0",
                "cluster-h100-0-1",
                "cluster-h100-0-2",
                "cluster-h100-0-4",
                "cluster-h100-0-6",
                "cluster-h100-0-7",
                "cluster-h100-0-8",
            ]
        );
    }

    #[test]
    fn multiple_bracket_groups_expand_independently() {
        let got = parse_host_list(
            "cluster-h100-0-[0-2,18-20],cluster-h100-1-[0-1,3],cluster-h100-2-41",
        )
        .unwrap();
        assert_eq!(
            got,
            vec![
                "cluster-h100-0-0",
                "cluster-h100-0-1",
                "cluster-h100-0-2",
                "cluster-h100-0-18",
                "cluster-h100-0-19",
                "cluster-h100-0-20",
                "cluster-h100-1-0",
                "cluster-h100-1-1",
                "cluster-h100-1-3",
                "cluster-h100-2-41",
            ]
        );
    }

    #[test]
    fn non_numeric_bound_is_an_error() {
        assert!(parse_host_list("cluster-h100-0-[a-2]").is_err());
    }

    #[test]
    fn physical_host_comment_extracts_basename() {
        let got = parse_physical_host_from_comment("PhysicalHost:/abc/edf/abc,test:test").unwrap();
        assert_eq!(got, "abc");
    }

    #[test]
    fn physical_host_comment_rejects_multiple_occurrences() {
        let err = parse_physical_host_from_comment(
            "PhysicalHost:/abc/edf/abc,PhysicalHost:/123/456/789",
        );
        assert!(err.is_err());
    }

    #[test]
    fn physical_host_comment_with_no_match_is_empty_not_error() {
        let got = parse_physical_host_from_comment("foo:bar,baz:qux").unwrap();
        assert_eq!(got, "");
    }

    #[test]
    fn physical_host_comment_rejects_empty_value() {
        assert!(parse_physical_host_from_comment("PhysicalHost:").is_err());
    }
}
