use std::collections::BTreeMap;

/// Split a position-addressed subtitle mapping into consecutive batches of up
/// to `batch_size` entries. Relative order is preserved and the batches
/// partition the input exactly; the final batch may be smaller.
pub fn split_batches(
    positions: &BTreeMap<usize, String>,
    batch_size: usize,
) -> Vec<BTreeMap<usize, String>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = BTreeMap::new();

    for (&position, text) in positions {
        current.insert(position, text.clone());
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(n: usize) -> BTreeMap<usize, String> {
        (1..=n).map(|i| (i, format!("line {}", i))).collect()
    }

    #[test]
    fn test_even_split() {
        let batches = split_batches(&positions(6), 3);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(batches[1].keys().copied().collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    fn test_final_batch_smaller() {
        let batches = split_batches(&positions(7), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].keys().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_batches_partition_domain() {
        let input = positions(11);
        let batches = split_batches(&input, 4);

        let mut merged = BTreeMap::new();
        for batch in &batches {
            for (k, v) in batch {
                assert!(merged.insert(*k, v.clone()).is_none(), "duplicate position");
            }
        }
        assert_eq!(merged, input);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let batches = split_batches(&positions(3), 0);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_batches(&BTreeMap::new(), 5).is_empty());
    }
}
