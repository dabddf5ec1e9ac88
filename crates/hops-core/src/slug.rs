//! Slug and subject token normalisation

/// Convert free text into a slug usable as a message id
///
/// The input is lowercased; any run of characters other than `a-z`, `0-9`,
/// `_` and `-` becomes a single `-`, repeated dashes collapse, and leading or
/// trailing `-`/`_` are trimmed. Underscores are kept so that call labels of
/// the form `app_handler` survive unchanged.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_';
        if keep {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    out.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Join the parts with `-` and slugify the result
pub fn slugify_parts(parts: &[&str]) -> String {
    slugify(&parts.join("-"))
}

/// Strip everything but `[a-zA-Z0-9-_]` from a subject token and lowercase it
pub fn sanitise_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("change"), "change");
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("app_handler"), "app_handler");
    }

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("a  --  b"), "a-b");
        assert_eq!(slugify("a.b/c"), "a-b-c");
        assert_eq!(slugify("--leading and trailing--"), "leading-and-trailing");
    }

    #[test]
    fn test_slugify_trims_underscores_at_edges() {
        assert_eq!(slugify("_private_"), "private");
    }

    #[test]
    fn test_slugify_parts() {
        assert_eq!(slugify_parts(&["change", "My Name"]), "change-my-name");
        assert_eq!(slugify_parts(&["change-x", "app_handler"]), "change-x-app_handler");
    }

    #[test]
    fn test_sanitise_token() {
        assert_eq!(sanitise_token("Foo.Bar*Baz"), "foobarbaz");
        assert_eq!(sanitise_token("ok-token_1"), "ok-token_1");
    }

    proptest! {
        #[test]
        fn test_slugify_is_idempotent(input in "\\PC{0,40}") {
            let once = slugify(&input);
            prop_assert_eq!(slugify(&once), once);
        }
    }
}
