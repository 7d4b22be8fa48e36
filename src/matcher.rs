//! Symbol name matching.
//!
//! A [`NamePattern`] combines four independent switches. Every requested
//! constraint must hold at once:
//!
//! - `anchor_start`: the name starts with the pattern (with `subsequence`,
//!   only the first pattern character is pinned to the first name character)
//! - `anchor_end`: the name ends with the pattern (with `subsequence`, only
//!   the last pattern character is pinned to the last name character)
//! - `subsequence`: pattern characters appear in order, gaps allowed;
//!   otherwise the pattern must appear contiguously
//! - `ignore_case`: characters are compared after lowercase folding
//!
//! An empty pattern matches every name.

/// Compiled name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    pattern: String,
    folded: Vec<char>,
    failure: Vec<usize>,
    anchor_start: bool,
    anchor_end: bool,
    subsequence: bool,
    ignore_case: bool,
}

impl NamePattern {
    /// Unanchored, contiguous, case-sensitive pattern.
    pub fn new(pattern: &str) -> Self {
        Self::with_options(pattern, false, false, false, false)
    }

    pub fn with_options(
        pattern: &str,
        anchor_start: bool,
        anchor_end: bool,
        subsequence: bool,
        ignore_case: bool,
    ) -> Self {
        let folded: Vec<char> = pattern.chars().map(|c| fold(c, ignore_case)).collect();
        let failure = failure_table(&folded);
        Self {
            pattern: pattern.to_string(),
            folded,
            failure,
            anchor_start,
            anchor_end,
            subsequence,
            ignore_case,
        }
    }

    pub fn anchor_start(mut self, value: bool) -> Self {
        self.anchor_start = value;
        self
    }

    pub fn anchor_end(mut self, value: bool) -> Self {
        self.anchor_end = value;
        self
    }

    pub fn subsequence(mut self, value: bool) -> Self {
        self.subsequence = value;
        self
    }

    pub fn ignore_case(self, value: bool) -> Self {
        Self::with_options(
            &self.pattern,
            self.anchor_start,
            self.anchor_end,
            self.subsequence,
            value,
        )
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_anchor_start(&self) -> bool {
        self.anchor_start
    }

    pub fn is_anchor_end(&self) -> bool {
        self.anchor_end
    }

    pub fn is_subsequence(&self) -> bool {
        self.subsequence
    }

    pub fn is_ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Tests a candidate name against the pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        let pat = &self.folded;
        if pat.is_empty() {
            return true;
        }
        let name: Vec<char> = candidate.chars().map(|c| fold(c, self.ignore_case)).collect();
        if pat.len() > name.len() {
            return false;
        }

        if self.subsequence {
            // Anchors pin the first and last matched characters.
            let (mut pat, mut name) = (&pat[..], &name[..]);
            if self.anchor_start {
                if name[0] != pat[0] {
                    return false;
                }
                pat = &pat[1..];
                name = &name[1..];
                if pat.is_empty() {
                    return !self.anchor_end || name.is_empty();
                }
            }
            if self.anchor_end {
                if name[name.len() - 1] != pat[pat.len() - 1] {
                    return false;
                }
                pat = &pat[..pat.len() - 1];
                name = &name[..name.len() - 1];
            }
            return is_subsequence(pat, name);
        }

        if self.anchor_start && !name.starts_with(pat) {
            return false;
        }
        if self.anchor_end && !name.ends_with(pat) {
            return false;
        }
        if self.anchor_start || self.anchor_end {
            return true;
        }
        self.contains(&name)
    }

    // Knuth-Morris-Pratt scan, linear in the candidate length.
    fn contains(&self, name: &[char]) -> bool {
        let pat = &self.folded;
        let mut matched = 0;
        for &c in name {
            while matched > 0 && pat[matched] != c {
                matched = self.failure[matched - 1];
            }
            if pat[matched] == c {
                matched += 1;
            }
            if matched == pat.len() {
                return true;
            }
        }
        false
    }
}

fn fold(c: char, ignore_case: bool) -> char {
    if !ignore_case {
        return c;
    }
    if c.is_ascii() {
        return c.to_ascii_lowercase();
    }
    c.to_lowercase().next().unwrap_or(c)
}

fn failure_table(pat: &[char]) -> Vec<usize> {
    let mut table = vec![0; pat.len()];
    let mut k = 0;
    for i in 1..pat.len() {
        while k > 0 && pat[i] != pat[k] {
            k = table[k - 1];
        }
        if pat[i] == pat[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

fn is_subsequence(pat: &[char], name: &[char]) -> bool {
    if pat.is_empty() {
        return true;
    }
    let mut next = 0;
    for &c in name {
        if c == pat[next] {
            next += 1;
            if next == pat.len() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matching<'a>(pattern: &NamePattern, names: &[&'a str]) -> Vec<&'a str> {
        names.iter().copied().filter(|n| pattern.matches(n)).collect()
    }

    #[test]
    fn test_subsequence_ignore_case() {
        let pattern = NamePattern::with_options("fb", false, false, true, true);
        assert_eq!(
            matching(&pattern, &["fooBar", "FooBaz", "bar"]),
            vec!["fooBar", "FooBaz"]
        );
    }

    #[test]
    fn test_contiguous_substring() {
        let pattern = NamePattern::new("Bar");
        assert!(pattern.matches("fooBar"));
        assert!(pattern.matches("Barrier"));
        assert!(!pattern.matches("foobar"));
        assert!(!pattern.matches("fBoar"));
    }

    #[test]
    fn test_contiguous_with_repeated_prefix() {
        // Exercises the failure table fallback.
        let pattern = NamePattern::new("aab");
        assert!(pattern.matches("aaab"));
        assert!(pattern.matches("xaabx"));
        assert!(!pattern.matches("abab"));
        let pattern = NamePattern::new("abab");
        assert!(pattern.matches("abaabab"));
    }

    #[test]
    fn test_anchor_start_is_prefix() {
        let pattern = NamePattern::new("foo").anchor_start(true);
        assert!(pattern.matches("fooBar"));
        assert!(!pattern.matches("xfooBar"));
    }

    #[test]
    fn test_anchor_end_is_suffix() {
        let pattern = NamePattern::new("Bar").anchor_end(true);
        assert!(pattern.matches("fooBar"));
        assert!(!pattern.matches("fooBarx"));
    }

    #[test]
    fn test_both_anchors_pin_prefix_and_suffix() {
        let pattern = NamePattern::with_options("ab", true, true, false, false);
        assert!(pattern.matches("ab"));
        assert!(pattern.matches("abab"));
        assert!(pattern.matches("abxab"));
        assert!(!pattern.matches("abx"));
        assert!(!pattern.matches("a"));
    }

    #[test]
    fn test_pattern_longer_than_candidate() {
        let pattern = NamePattern::with_options("foobar", true, true, false, false);
        assert!(!pattern.matches("foo"));
        let pattern = NamePattern::with_options("foobar", false, false, true, true);
        assert!(!pattern.matches("fb"));
    }

    #[test]
    fn test_subsequence_with_anchors() {
        let pattern = NamePattern::with_options("fbz", true, false, true, false);
        assert!(pattern.matches("foobarz"));
        assert!(!pattern.matches("xfbz"));

        let pattern = NamePattern::with_options("fz", false, true, true, false);
        assert!(pattern.matches("fooz"));
        assert!(!pattern.matches("foozy"));

        let pattern = NamePattern::with_options("fz", true, true, true, false);
        assert!(pattern.matches("fz"));
        assert!(pattern.matches("fiz"));
        assert!(!pattern.matches("afz"));
        assert!(!pattern.matches("fza"));
    }

    #[test]
    fn test_single_char_subsequence_with_both_anchors() {
        let pattern = NamePattern::with_options("f", true, true, true, false);
        assert!(pattern.matches("f"));
        assert!(!pattern.matches("faf"));
        assert!(!pattern.matches("ff"));

        let pattern = NamePattern::with_options("f", true, false, true, false);
        assert!(pattern.matches("faf"));
        let pattern = NamePattern::with_options("f", false, true, true, false);
        assert!(pattern.matches("faf"));
        assert!(!pattern.matches("fa"));
    }

    #[test]
    fn test_subsequence_requires_order() {
        let pattern = NamePattern::with_options("ba", false, false, true, false);
        assert!(!pattern.matches("ab"));
        assert!(pattern.matches("xbxax"));
    }

    #[test]
    fn test_case_sensitivity() {
        let sensitive = NamePattern::new("foo");
        assert!(!sensitive.matches("FOO"));
        let insensitive = NamePattern::new("foo").ignore_case(true);
        assert!(insensitive.matches("xFOOx"));
        assert!(insensitive.is_ignore_case());
    }

    #[test]
    fn test_non_ascii_folding() {
        let pattern = NamePattern::new("ÄRGER").ignore_case(true);
        assert!(pattern.matches("kein_ärger"));
        let pattern = NamePattern::with_options("é", true, false, false, false);
        assert!(pattern.matches("école"));
        assert!(!pattern.matches("ecole"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let pattern = NamePattern::with_options("", true, true, true, true);
        assert!(pattern.matches(""));
        assert!(pattern.matches("anything"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let pattern = NamePattern::with_options("ob", false, false, true, true);
        let names = ["fooBar", "FooBaz", "bar", "obj"];
        assert_eq!(matching(&pattern, &names), matching(&pattern, &names));
    }
}
