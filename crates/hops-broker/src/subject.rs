//! Subject filters with `*` and `>` wildcards

/// Whether `subject` matches `filter`
///
/// `*` matches exactly one token and a trailing `>` matches one or more.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    let mut filter_tokens = filter.split('.').peekable();

    while let Some(f) = filter_tokens.next() {
        if f == ">" && filter_tokens.peek().is_none() {
            return subject_tokens.next().is_some();
        }
        match subject_tokens.next() {
            Some(s) if f == "*" || f == s => {}
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(subject_matches("a.notify.s.event", "a.notify.s.event"));
        assert!(!subject_matches("a.notify.s.event", "a.notify.s.hops"));
        assert!(!subject_matches("a.notify.s", "a.notify.s.event"));
    }

    #[test]
    fn test_wildcards() {
        assert!(subject_matches("a.notify.>", "a.notify.s.event"));
        assert!(subject_matches("a.notify.s.>", "a.notify.s.x.done"));
        assert!(!subject_matches("a.notify.s.>", "a.notify.s"));
        assert!(subject_matches("a.notify.*.event", "a.notify.s1.event"));
        assert!(!subject_matches("a.notify.*.event", "a.notify.s1.hops"));
        assert!(!subject_matches("a.notify.*.event", "a.notify.s1.event.done"));
    }
}
