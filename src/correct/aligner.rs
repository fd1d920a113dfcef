use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// Line-level diff classification.
#[derive(Debug, Clone, PartialEq)]
enum DiffToken {
    Unchanged(String),
    Deleted(String),
    Inserted(String),
}

/// Pairs two differently-shaped line sequences one-for-one so that a
/// position-addressed substitution stays trustworthy even when the correction
/// service merged, split or reflowed lines.
#[derive(Debug, Default)]
pub struct Aligner;

impl Aligner {
    pub fn new() -> Self {
        Self
    }

    /// Align two line sequences. The returned lists have equal length unless
    /// the pairing machine runs out of resolvable structure; callers must
    /// check lengths and fall back to the unaligned input when they differ.
    pub fn align(&self, source: &[String], target: &[String]) -> (Vec<String>, Vec<String>) {
        pair_lines(line_diff(source, target))
    }
}

/// Line-level LCS diff producing unchanged/deleted/inserted tokens. Ties
/// break toward deletion, so at any divergence point all deleted lines are
/// emitted before the inserted lines that replace them.
fn line_diff(source: &[String], target: &[String]) -> Vec<DiffToken> {
    let n = source.len();
    let m = target.len();

    // lcs[i][j]: longest common subsequence length of source[i..], target[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if source[i] == target[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut tokens = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if source[i] == target[j] {
            tokens.push(DiffToken::Unchanged(source[i].clone()));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            tokens.push(DiffToken::Deleted(source[i].clone()));
            i += 1;
        } else {
            tokens.push(DiffToken::Inserted(target[j].clone()));
            j += 1;
        }
    }
    tokens.extend(source[i..].iter().cloned().map(DiffToken::Deleted));
    tokens.extend(target[j..].iter().cloned().map(DiffToken::Inserted));
    tokens
}

/// One output side of the pairing: emitted lines plus synthetic-blank flags.
#[derive(Debug, Default)]
struct Side {
    lines: Vec<String>,
    blanks: Vec<bool>,
}

impl Side {
    fn push(&mut self, line: String, blank: bool) {
        self.lines.push(line);
        self.blanks.push(blank);
    }
}

/// Pairing state machine. Unmatched deletions and insertions emit synthetic
/// blanks on the opposite side; the pending-blank queue lets an insertion
/// that directly follows a deletion take over the deletion's blank, so the
/// pair collapses into a single replace instead of two half-blank pairs.
///
/// Only the target side carries a queue: the diff emits deletions before
/// insertions at any divergence, so blanks created by insertions on the
/// source side can never be back-filled by a later deletion.
fn pair_lines(tokens: Vec<DiffToken>) -> (Vec<String>, Vec<String>) {
    let mut source = Side::default();
    let mut target = Side::default();
    let mut pending_blanks: VecDeque<usize> = VecDeque::new();

    for token in tokens {
        match token {
            DiffToken::Unchanged(line) => {
                // An unchanged anchor closes the gap; blanks before it stay.
                pending_blanks.clear();
                source.push(line.clone(), false);
                target.push(line, false);
            }
            DiffToken::Deleted(line) => {
                source.push(line, false);
                pending_blanks.push_back(target.lines.len());
                target.push(String::new(), true);
            }
            DiffToken::Inserted(line) => match pending_blanks.pop_front() {
                Some(index) => {
                    target.lines[index] = line;
                    target.blanks[index] = false;
                }
                None => {
                    target.push(line, false);
                    source.push(String::new(), true);
                }
            },
        }
    }

    coalesce_blanks(&mut source);
    coalesce_blanks(&mut target);

    (source.lines, target.lines)
}

/// A synthetic blank directly following another synthetic blank repeats the
/// side's previous real value, so runs of placeholders cannot be mistaken for
/// real empty lines.
fn coalesce_blanks(side: &mut Side) {
    let mut last_real: Option<String> = None;
    let mut previous_was_blank = false;

    for i in 0..side.lines.len() {
        if side.blanks[i] {
            if previous_was_blank {
                if let Some(real) = &last_real {
                    side.lines[i] = real.clone();
                }
            }
            previous_was_blank = true;
        } else {
            last_real = Some(side.lines[i].clone());
            previous_was_blank = false;
        }
    }
}

/// Rebuild a validated candidate batch so its texts line up 1:1 with the
/// original positions. When the aligner cannot restore a clean pairing the
/// candidate is returned unchanged; it already passed validation.
pub fn repair_batch(
    original: &BTreeMap<usize, String>,
    candidate: &BTreeMap<usize, String>,
) -> BTreeMap<usize, String> {
    let Some(&first_position) = original.keys().next() else {
        return candidate.clone();
    };

    let source: Vec<String> = original.values().cloned().collect();
    let target: Vec<String> = candidate.values().cloned().collect();

    let (aligned_source, aligned_target) = Aligner::new().align(&source, &target);

    if aligned_source.len() != aligned_target.len() || aligned_target.len() != source.len() {
        warn!(
            "Alignment produced {} source / {} target lines for a batch of {}, keeping candidate as-is",
            aligned_source.len(),
            aligned_target.len(),
            source.len()
        );
        return candidate.clone();
    }

    aligned_target
        .into_iter()
        .enumerate()
        .map(|(i, text)| (first_position + i, text))
        .collect()
}
