//! Decomposition of a paired chain into secondary-structure motifs.

use serde::Serialize;
use std::fmt;
use tracing::{instrument, warn};

use crate::loop_families::LoopFamilyTable;
use crate::types::PairingGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotifKind {
    Helix,
    /// Hairpin loop
    Loop,
    Bulge,
    Junction,
    InternalLoop,
    /// Unpaired stretch at a strand end
    NonLoop,
}

impl MotifKind {
    pub fn name(self) -> &'static str {
        match self {
            MotifKind::Helix => "helix",
            MotifKind::Loop => "loop",
            MotifKind::Bulge => "bulge",
            MotifKind::Junction => "junction",
            MotifKind::InternalLoop => "internal_loop",
            MotifKind::NonLoop => "non_loop",
        }
    }
}

impl fmt::Display for MotifKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Motif {
    pub kind: MotifKind,
    /// Member residue indices
    pub residues: Vec<usize>,
    /// Pairs `(i, j)` with `i < j`, outermost first. Empty unless a helix.
    pub pairs: Vec<(usize, usize)>,
    /// Order among motifs of the same kind
    pub local_index: usize,
    /// Order among all motifs
    pub global_index: usize,
    /// Sequence family of a hairpin loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl Motif {
    fn new(kind: MotifKind, residues: Vec<usize>) -> Self {
        Self {
            kind,
            residues,
            pairs: Vec::new(),
            local_index: 0,
            global_index: 0,
            family: None,
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub motifs: Vec<Motif>,
    /// `motif_of[r]` is the global index of the motif holding residue `r`
    pub motif_of: Vec<usize>,
}

impl Analysis {
    pub fn motif_for(&self, residue: usize) -> Option<&Motif> {
        self.motif_of.get(residue).and_then(|&m| self.motifs.get(m))
    }

    pub fn count(&self, kind: MotifKind) -> usize {
        self.motifs.iter().filter(|m| m.kind == kind).count()
    }

    pub fn kinds(&self) -> Vec<MotifKind> {
        self.motifs.iter().map(|m| m.kind).collect()
    }
}

/// Splits a chain into helices and the loops between them.
#[derive(Debug, Clone, Copy)]
pub struct SecondaryStructureAnalyzer<'a> {
    families: &'a LoopFamilyTable,
}

impl Default for SecondaryStructureAnalyzer<'static> {
    fn default() -> Self {
        Self::new(LoopFamilyTable::builtin())
    }
}

/// Analyze without sequence information.
pub fn analyze(graph: &PairingGraph) -> Analysis {
    SecondaryStructureAnalyzer::default().analyze(graph, None)
}

/// Analyze and tag hairpin loops with their sequence family.
pub fn analyze_with_sequence(graph: &PairingGraph, sequence: &str) -> Analysis {
    SecondaryStructureAnalyzer::default().analyze(graph, Some(sequence))
}

impl<'a> SecondaryStructureAnalyzer<'a> {
    pub fn new(families: &'a LoopFamilyTable) -> Self {
        Self { families }
    }

    /// Single pass over the chain. Every residue lands in exactly one motif,
    /// and motifs come out in chain order.
    #[instrument(skip_all, fields(n = graph.n_bases))]
    pub fn analyze(&self, graph: &PairingGraph, sequence: Option<&str>) -> Analysis {
        let n = graph.n_bases;
        let mut pass = Pass {
            graph,
            assigned: vec![false; n],
            motifs: Vec::new(),
        };

        let mut tracker = 0;
        while tracker < n {
            tracker = if graph.is_paired(tracker) {
                pass.helix_at(tracker)
            } else {
                pass.run_at(tracker)
            };
        }

        let leftover: Vec<usize> = (0..n).filter(|&r| !pass.assigned[r]).collect();
        if !leftover.is_empty() {
            warn!(residues = ?leftover, "residues left outside any motif, adding as non-loop");
            for r in leftover {
                pass.emit(Motif::new(MotifKind::NonLoop, vec![r]));
            }
        }

        let mut motifs = pass.motifs;
        motifs.sort_by_key(|m| m.residues.iter().copied().min().unwrap_or(usize::MAX));
        self.finish(motifs, n, sequence)
    }

    /// Assign indices and loop families.
    fn finish(&self, mut motifs: Vec<Motif>, n: usize, sequence: Option<&str>) -> Analysis {
        let bases: Option<Vec<char>> = sequence.map(|s| s.chars().collect());
        let bases = match bases {
            Some(b) if b.len() != n => {
                warn!(
                    expected = n,
                    got = b.len(),
                    "sequence length mismatch, skipping loop families"
                );
                None
            }
            other => other,
        };

        let mut per_kind: Vec<(MotifKind, usize)> = Vec::new();
        let mut motif_of = vec![0; n];
        for (global, motif) in motifs.iter_mut().enumerate() {
            motif.global_index = global;
            motif.local_index = match per_kind.iter_mut().find(|(k, _)| *k == motif.kind) {
                Some((_, count)) => {
                    *count += 1;
                    *count - 1
                }
                None => {
                    per_kind.push((motif.kind, 1));
                    0
                }
            };
            for &r in &motif.residues {
                motif_of[r] = global;
            }
            if let (MotifKind::Loop, Some(bases)) = (motif.kind, &bases) {
                let loop_seq: String = motif.residues.iter().map(|&r| bases[r]).collect();
                motif.family = self.families.family(&loop_seq).map(str::to_string);
            }
        }
        Analysis { motifs, motif_of }
    }
}

struct Pass<'g> {
    graph: &'g PairingGraph,
    assigned: Vec<bool>,
    motifs: Vec<Motif>,
}

impl Pass<'_> {
    /// Stamp the unassigned members and record the motif.
    fn emit(&mut self, mut motif: Motif) {
        motif.residues.retain(|&r| !self.assigned[r]);
        if motif.residues.is_empty() {
            return;
        }
        for &r in &motif.residues {
            self.assigned[r] = true;
        }
        self.motifs.push(motif);
    }

    /// Walk stacked pairs from `start`. Returns the next tracker position.
    fn helix_at(&mut self, start: usize) -> usize {
        let g = self.graph;
        let mut i = start;
        let Some(mut j) = g.partner(i) else {
            return start + 1;
        };
        let mut pairs = Vec::new();
        loop {
            if i < j && !self.assigned[i] {
                pairs.push((i, j));
            }
            let stacked = j > 0
                && g.partner(i + 1) == Some(j - 1)
                && i + 1 != j
                && (i > j || i + 1 < j - 1)
                && g.is_bonded(i)
                && g.is_bonded(j - 1);
            if !stacked {
                break;
            }
            i += 1;
            j -= 1;
        }

        if !pairs.is_empty() {
            let mut residues: Vec<usize> = pairs.iter().map(|&(a, _)| a).collect();
            residues.extend(pairs.iter().rev().map(|&(_, b)| b));
            let mut motif = Motif::new(MotifKind::Helix, residues);
            motif.pairs = pairs;
            self.emit(motif);
        }
        i + 1
    }

    /// Classify the unpaired run starting at `s`. Returns the next tracker position.
    fn run_at(&mut self, s: usize) -> usize {
        let g = self.graph;
        let mut e = s;
        while g.is_bonded(e) && !g.is_paired(e + 1) {
            e += 1;
        }
        let run: Vec<usize> = (s..=e).collect();
        let next = e + 1;

        if g.is_strand_start(s) || g.is_strand_end(e) {
            self.emit(Motif::new(MotifKind::NonLoop, run));
            return next;
        }
        if run.iter().all(|&r| self.assigned[r]) {
            return next;
        }

        let (p, q) = (s - 1, e + 1);
        let (Some(pp), Some(pq)) = (g.partner(p), g.partner(q)) else {
            warn!(start = s, end = e, "unpaired run without paired flanks, recording as bulge");
            self.emit(Motif::new(MotifKind::Bulge, run));
            return next;
        };

        let kind = if pp == q {
            MotifKind::Loop
        } else if pp < pq {
            MotifKind::Junction
        } else if pq + 1 == pp {
            MotifKind::Bulge
        } else if let Some(opposite) = self.opposite_strand(pq, pp) {
            let mut residues = run;
            residues.extend(opposite);
            self.emit(Motif::new(MotifKind::InternalLoop, residues));
            return next;
        } else if self.closing_pairs(s, q) >= 3 {
            MotifKind::Junction
        } else {
            warn!(start = s, end = e, "ambiguous unpaired run, recording as bulge");
            MotifKind::Bulge
        };
        self.emit(Motif::new(kind, run));
        next
    }

    /// Unpaired residues strictly between `pq` and `pp` when that stretch is
    /// one unbroken unpaired strand.
    fn opposite_strand(&self, pq: usize, pp: usize) -> Option<Vec<usize>> {
        let g = self.graph;
        if pp == 0 || g.is_paired(pp - 1) || !g.is_bonded(pp - 1) {
            return None;
        }
        let mut k = pp - 1;
        while !g.is_paired(k) {
            if g.is_strand_start(k) {
                return None;
            }
            k -= 1;
        }
        (k == pq).then(|| (pq + 1..pp).collect())
    }

    /// Number of pairs bounding the loop that contains the run starting at
    /// `s`, walking the loop from `q`.
    fn closing_pairs(&self, s: usize, q: usize) -> usize {
        let g = self.graph;
        let mut count = 0;
        let mut k = q;
        for _ in 0..=g.n_bases {
            if k == s || k >= g.n_bases {
                break;
            }
            match g.partner(k) {
                Some(partner) => {
                    count += 1;
                    k = partner + 1;
                }
                None => k += 1,
            }
        }
        count
    }
}
