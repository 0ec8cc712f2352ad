use crate::error::StructureError;
use crate::types::PairingGraph;

/// Symbol families, in level order. Letters follow: `A`/`a` … `Z`/`z`.
const BRACKETS: [(char, char); 4] = [('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')];

/// Number of bracket families the notation provides.
pub const MAX_LEVELS: usize = BRACKETS.len() + 26;

fn open_family(ch: char) -> Option<usize> {
    BRACKETS
        .iter()
        .position(|&(o, _)| o == ch)
        .or_else(|| ch.is_ascii_uppercase().then(|| BRACKETS.len() + (ch as usize - 'A' as usize)))
}

fn close_family(ch: char) -> Option<usize> {
    BRACKETS
        .iter()
        .position(|&(_, c)| c == ch)
        .or_else(|| ch.is_ascii_lowercase().then(|| BRACKETS.len() + (ch as usize - 'a' as usize)))
}

/// Opening and closing symbols for a nesting level.
pub fn family_symbols(level: usize) -> Option<(char, char)> {
    if let Some(&pair) = BRACKETS.get(level) {
        return Some(pair);
    }
    let k = u8::try_from(level - BRACKETS.len()).ok().filter(|&k| k < 26)?;
    Some(((b'A' + k) as char, (b'a' + k) as char))
}

/// Parse dot-bracket notation into a pairing graph.
///
/// Characters: `.` = unpaired, `+` = strand break, `()` `[]` `{}` `<>` and
/// `A`/`a` … `Z`/`z` = pairs, one stack per family. Families are renumbered
/// in order so the lowest family used becomes level 0.
///
/// Returns Err on invalid input (bad characters, unmatched brackets).
pub fn parse(input: &str) -> Result<PairingGraph, StructureError> {
    let mut pairs: Vec<usize> = Vec::new();
    let mut families: Vec<usize> = Vec::new();
    let mut nicks: Vec<usize> = vec![0]; // always starts with 0
    let mut stacks: Vec<Vec<(usize, usize)>> = vec![Vec::new(); MAX_LEVELS];
    let mut base_idx: usize = 0;

    for (position, ch) in input.chars().enumerate() {
        if ch == '.' {
            pairs.push(base_idx); // self-paired = unpaired
            families.push(0);
            base_idx += 1;
        } else if ch == '+' {
            if base_idx > 0 && nicks.last() != Some(&base_idx) {
                nicks.push(base_idx);
            }
        } else if let Some(family) = open_family(ch) {
            pairs.push(base_idx); // placeholder
            families.push(family);
            stacks[family].push((base_idx, position));
            base_idx += 1;
        } else if let Some(family) = close_family(ch) {
            let (j, _) = stacks[family]
                .pop()
                .ok_or(StructureError::UnmatchedClose {
                    position,
                    symbol: ch,
                })?;
            pairs.push(j);
            families.push(family);
            pairs[j] = base_idx;
            base_idx += 1;
        } else {
            return Err(StructureError::InvalidCharacter {
                position,
                symbol: ch,
            });
        }
    }

    let first_unmatched = stacks
        .iter()
        .enumerate()
        .filter_map(|(f, s)| s.first().map(|&(_, position)| (f, position)))
        .min_by_key(|&(_, position)| position);
    if let Some((family, position)) = first_unmatched {
        let symbol = family_symbols(family).map_or('?', |(o, _)| o);
        return Err(StructureError::UnmatchedOpen { position, symbol });
    }

    // A trailing '+' marks no boundary between bases.
    nicks.retain(|&k| k < base_idx || k == 0);

    let n_bases = base_idx;
    let levels = normalize_families(&pairs, &families);
    Ok(PairingGraph {
        pairs,
        levels,
        nicks,
        n_bases,
    })
}

/// Map the bracket families in use onto consecutive levels starting at 0.
fn normalize_families(pairs: &[usize], families: &[usize]) -> Vec<usize> {
    let mut used = vec![false; MAX_LEVELS];
    for (i, &j) in pairs.iter().enumerate() {
        if j != i {
            used[families[i]] = true;
        }
    }
    let mut remap = vec![0; MAX_LEVELS];
    let mut next = 0;
    for (family, &in_use) in used.iter().enumerate() {
        if in_use {
            remap[family] = next;
            next += 1;
        }
    }
    pairs
        .iter()
        .enumerate()
        .map(|(i, &j)| if j != i { remap[families[i]] } else { 0 })
        .collect()
}

/// Write a pairing graph as dot-bracket notation.
///
/// Primary pairs use `()`; each further nesting level takes the next family.
/// Strand breaks are written as `+`.
pub fn to_dot_bracket(graph: &PairingGraph) -> Result<String, StructureError> {
    let levels = graph.level_count();
    if levels > MAX_LEVELS {
        return Err(StructureError::TooManyLevels(levels));
    }
    let mut out = String::with_capacity(graph.n_bases + graph.nicks.len());
    for i in 0..graph.n_bases {
        if i > 0 && graph.is_strand_start(i) {
            out.push('+');
        }
        match graph.partner(i) {
            None => out.push('.'),
            Some(j) => {
                let (open, close) = family_symbols(graph.levels[i])
                    .ok_or(StructureError::TooManyLevels(graph.levels[i] + 1))?;
                out.push(if i < j { open } else { close });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_pair() {
        let pt = parse("()").unwrap();
        assert_eq!(pt.pairs, vec![1, 0]);
        assert_eq!(pt.nicks, vec![0]);
        assert_eq!(pt.n_bases, 2);
    }

    #[test]
    fn test_nested() {
        let pt = parse("(((...)))").unwrap();
        assert_eq!(pt.pairs, vec![8, 7, 6, 3, 4, 5, 2, 1, 0]);
        assert_eq!(pt.n_bases, 9);
        assert_eq!(pt.level_count(), 1);
    }

    #[test]
    fn test_nick() {
        let pt = parse("(((.+.)))").unwrap();
        assert_eq!(pt.pairs, vec![7, 6, 5, 3, 4, 2, 1, 0]);
        assert_eq!(pt.nicks, vec![0, 4]);
        assert_eq!(pt.n_bases, 8);
    }

    #[test]
    fn test_pseudoknot_families() {
        let pt = parse("(([))]").unwrap();
        assert_eq!(pt.pairs, vec![4, 3, 5, 1, 0, 2]);
        assert_eq!(pt.levels, vec![0, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn test_letter_families() {
        let pt = parse("((A..))a").unwrap();
        assert_eq!(pt.partner(2), Some(7));
        assert_eq!(pt.levels[2], 1);
        assert_eq!(pt.levels[0], 0);
    }

    #[test]
    fn test_levels_renumbered_from_lowest_family() {
        let pt = parse("[[..]]").unwrap();
        assert_eq!(pt.levels, vec![0; 6]);
        assert_eq!(to_dot_bracket(&pt).unwrap(), "((..))");
    }

    #[test]
    fn test_unmatched_open() {
        assert_eq!(
            parse("((..)").unwrap_err(),
            StructureError::UnmatchedOpen {
                position: 0,
                symbol: '('
            }
        );
    }

    #[test]
    fn test_unmatched_close() {
        assert_eq!(
            parse("())").unwrap_err(),
            StructureError::UnmatchedClose {
                position: 2,
                symbol: ')'
            }
        );
    }

    #[test]
    fn test_mismatched_families() {
        assert!(parse("(]").is_err());
    }

    #[test]
    fn test_bad_char() {
        assert_eq!(
            parse("(x)").unwrap_err(),
            StructureError::InvalidCharacter {
                position: 1,
                symbol: 'x'
            }
        );
    }

    #[test]
    fn test_writer_round_trip() {
        for s in ["((..((...))..))", "..((..[[..))..]]..", "(((.+.)))", "((..{{..))..[[..}}..]]"] {
            let pt = parse(s).unwrap();
            let written = to_dot_bracket(&pt).unwrap();
            let again = parse(&written).unwrap();
            assert_eq!(again.pair_list(), pt.pair_list(), "{s} -> {written}");
            assert_eq!(again.nicks, pt.nicks);
        }
    }

    #[test]
    fn test_writer_uses_greedy_levels() {
        let g = PairingGraph::from_pairs(8, &[(0, 4), (2, 6), (5, 7)]).unwrap();
        assert_eq!(to_dot_bracket(&g).unwrap(), "(.[.)(])");
    }

    #[test]
    fn test_family_symbols() {
        assert_eq!(family_symbols(0), Some(('(', ')')));
        assert_eq!(family_symbols(4), Some(('A', 'a')));
        assert_eq!(family_symbols(29), Some(('Z', 'z')));
        assert_eq!(family_symbols(30), None);
    }
}
