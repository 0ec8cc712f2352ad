//! Sequence families of hairpin loops.

use regex::Regex;
use std::sync::OnceLock;

static BUILTIN: OnceLock<LoopFamilyTable> = OnceLock::new();

const LITERALS: [&str; 3] = ["UUCG", "GAAA", "CUUG"];

const PATTERNS: [(&str, &str); 3] = [
    ("GNRA", "^G[ACGU][AG]A$"),
    ("UNCG", "^U[ACGU]CG$"),
    ("CUYG", "^C[ACGU][CU]G$"),
];

/// Literal loop sequences checked first, then named patterns in order.
#[derive(Debug, Clone)]
pub struct LoopFamilyTable {
    literals: Vec<String>,
    patterns: Vec<(String, Regex)>,
}

impl LoopFamilyTable {
    pub fn new<S: AsRef<str>>(literals: &[S], patterns: &[(S, S)]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern.as_ref()).map(|re| (name.as_ref().to_string(), re))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            literals: literals.iter().map(|s| normalize(s.as_ref())).collect(),
            patterns,
        })
    }

    /// Tetraloop families common in rRNA.
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern fails to compile.
    pub fn builtin() -> &'static LoopFamilyTable {
        BUILTIN.get_or_init(|| {
            LoopFamilyTable::new(&LITERALS, &PATTERNS)
                .unwrap_or_else(|e| panic!("Failed to compile loop family pattern: {e}"))
        })
    }

    /// Family name of a loop sequence. Case-insensitive; `T` reads as `U`.
    pub fn family(&self, sequence: &str) -> Option<&str> {
        let sequence = normalize(sequence);
        if let Some(literal) = self.literals.iter().find(|l| **l == sequence) {
            return Some(literal.as_str());
        }
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(&sequence))
            .map(|(name, _)| name.as_str())
    }
}

fn normalize(sequence: &str) -> String {
    sequence
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'T' => 'U',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_before_pattern() {
        let table = LoopFamilyTable::builtin();
        assert_eq!(table.family("UUCG"), Some("UUCG"));
        assert_eq!(table.family("gaaa"), Some("GAAA"));
    }

    #[test]
    fn test_patterns() {
        let table = LoopFamilyTable::builtin();
        assert_eq!(table.family("GCGA"), Some("GNRA"));
        assert_eq!(table.family("UACG"), Some("UNCG"));
        assert_eq!(table.family("CACG"), Some("CUYG"));
        assert_eq!(table.family("TTCG"), Some("UUCG"));
        assert_eq!(table.family("AAAA"), None);
        assert_eq!(table.family("GAAAA"), None);
    }

    #[test]
    fn test_custom_table() {
        let table = LoopFamilyTable::new(&["AAAA"], &[("polyC", "^C+$")]).unwrap();
        assert_eq!(table.family("aaaa"), Some("AAAA"));
        assert_eq!(table.family("CCCCC"), Some("polyC"));
        assert!(LoopFamilyTable::new(&["A"], &[("bad", "(")]).is_err());
    }
}
