//! Name and tag sanitization
//!
//! Every identifier that ends up in a catalog entity name, link title or tag
//! goes through one of the two functions here.
//!
//! Names: sequences of `[A-Za-z0-9]` separated by `.`, `_` or `-`, at most
//! 63 characters. Tags: lowercase `[a-z0-9:+#]` segments joined by single
//! dashes, at most 63 characters.

/// Maximum length of a sanitized name or a tag
pub const MAX_NAME_LEN: usize = 63;

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_separator(c)
}

/// Sanitize a free-form string into a catalog-safe name.
///
/// 1. Characters outside `[A-Za-z0-9._-]` are stripped.
/// 2. Runs of two or more separators are removed entirely.
/// 3. The result is truncated to [`MAX_NAME_LEN`] characters.
/// 4. Leading and trailing separators are trimmed.
///
/// The result may be empty when the input has no usable characters.
pub fn sanitize_name(input: &str) -> String {
    let stripped: Vec<char> = input.chars().filter(|c| is_name_char(*c)).collect();

    let mut collapsed = String::with_capacity(stripped.len());
    let mut i = 0;
    while i < stripped.len() {
        if is_separator(stripped[i]) {
            let run_end = stripped[i..]
                .iter()
                .position(|c| !is_separator(*c))
                .map_or(stripped.len(), |offset| i + offset);
            if run_end - i == 1 {
                collapsed.push(stripped[i]);
            }
            i = run_end;
        } else {
            collapsed.push(stripped[i]);
            i += 1;
        }
    }

    // Only ASCII survives the filter, so byte truncation is char-safe
    collapsed.truncate(MAX_NAME_LEN);
    collapsed.trim_matches(is_separator).to_string()
}

/// Check a tag against the catalog tag contract.
///
/// Valid tags are 1 to [`MAX_NAME_LEN`] characters of lowercase
/// `[a-z0-9:+#]` segments separated by single dashes, with no leading or
/// trailing dash.
pub fn is_valid_tag(tag: &str) -> bool {
    if tag.is_empty() || tag.len() > MAX_NAME_LEN {
        return false;
    }
    tag.split('-').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ':' | '+' | '#')
                })
    })
}

/// Lowercase a tag candidate and keep it only if it is a valid tag.
///
/// Invalid candidates are dropped rather than repaired, so a rejected tag
/// never reaches the catalog in an altered form.
pub fn normalize_tag(candidate: &str) -> Option<String> {
    let lowered = candidate.trim().to_ascii_lowercase();
    is_valid_tag(&lowered).then_some(lowered)
}

/// Strip carriage returns and newlines from an environment-provided value.
pub fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_disallowed_characters() {
        assert_eq!(sanitize_name("Inference_Server#$Test"), "Inference_ServerTest");
        assert_eq!(sanitize_name("my model v1"), "mymodelv1");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(sanitize_name(".-ValidName-_."), "ValidName");
        assert_eq!(sanitize_name("-edge-"), "edge");
    }

    #[test]
    fn removes_repeated_separator_runs() {
        assert_eq!(sanitize_name("Test-Name--Tester"), "Test-NameTester");
        assert_eq!(sanitize_name("a._b"), "ab");
        assert_eq!(sanitize_name("a.b_c-d"), "a.b_c-d");
    }

    #[test]
    fn truncates_to_max_length() {
        let input = format!("InferenceServer{}test", "b".repeat(64));
        let expected = format!("InferenceServer{}", "b".repeat(48));
        let out = sanitize_name(&input);
        assert_eq!(out, expected);
        assert_eq!(out.len(), MAX_NAME_LEN);
    }

    #[test]
    fn truncation_does_not_leave_trailing_separator() {
        let input = format!("{}-tail", "a".repeat(62));
        assert_eq!(sanitize_name(&input), "a".repeat(62));
    }

    #[test]
    fn nothing_usable_yields_empty() {
        assert_eq!(sanitize_name("!@#$%^&*()"), "");
        assert_eq!(sanitize_name(""), "");
    }

    #[test]
    fn sanitization_is_idempotent() {
        for input in ["Inference_Server#$Test", ".-ValidName-_.", "Test-Name--Tester", "mnist"] {
            let once = sanitize_name(input);
            assert_eq!(sanitize_name(&once), once);
        }
    }

    #[test]
    fn valid_tags_pass() {
        for tag in ["pytorch", "llm", "gpu:a100", "c++", "c#", "team-ai-2024", "a"] {
            assert!(is_valid_tag(tag), "{tag} should be valid");
        }
    }

    #[test]
    fn invalid_tags_fail() {
        for tag in [
            "",
            "Upper",
            "foo_bar",
            "trailing-",
            "-leading",
            "double--dash",
            "dot.ted",
            "sp ace",
        ] {
            assert!(!is_valid_tag(tag), "{tag:?} should be invalid");
        }
        assert!(!is_valid_tag(&"a".repeat(64)));
        assert!(is_valid_tag(&"a".repeat(63)));
    }

    #[test]
    fn normalize_lowercases_then_validates() {
        assert_eq!(normalize_tag("PyTorch"), Some("pytorch".to_string()));
        assert_eq!(normalize_tag(" onnx "), Some("onnx".to_string()));
        assert_eq!(normalize_tag("Foo_Bar!"), None);
        assert_eq!(normalize_tag(&"x".repeat(70)), None);
    }

    #[test]
    fn line_breaks_are_removed() {
        assert_eq!(strip_line_breaks("owner\r\n"), "owner");
        assert_eq!(strip_line_breaks("a\nb"), "ab");
    }
}
