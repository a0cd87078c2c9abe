//! Splitting validated records into persistence chunks.

use crate::domain::execution::NewExecution;

/// A validated record tagged with its position in the original batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRecord {
    /// Zero-based index in the submitted batch.
    pub index: usize,
    /// The validated record.
    pub record: NewExecution,
}

/// Split `items` into consecutive chunks of at most `chunk_size`.
///
/// Order is preserved and every item lands in exactly one chunk. A list no
/// longer than `chunk_size` yields a single chunk; an empty list yields no
/// chunks. A `chunk_size` of zero is treated as one.
#[must_use]
pub fn split_into_chunks<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let chunk_size = chunk_size.max(1);
    if items.is_empty() {
        return Vec::new();
    }
    if items.len() <= chunk_size {
        return vec![items];
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size);
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn six_hundred_by_five_hundred() {
        let items: Vec<usize> = (0..600).collect();
        let chunks = split_into_chunks(items, 500);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![500, 100]);
        assert_eq!(chunks[1][0], 500);
    }

    #[test]
    fn smaller_than_chunk_is_single_chunk() {
        let chunks = split_into_chunks(vec![1, 2, 3], 500);
        assert_eq!(chunks, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_into_chunks(Vec::<u8>::new(), 10).is_empty());
    }

    #[test]
    fn zero_chunk_size_is_one() {
        let chunks = split_into_chunks(vec!['a', 'b'], 0);
        assert_eq!(chunks, vec![vec!['a'], vec!['b']]);
    }

    proptest! {
        #[test]
        fn concatenation_preserves_items(len in 0usize..2_000, size in 1usize..700) {
            let items: Vec<usize> = (0..len).collect();
            let chunks = split_into_chunks(items.clone(), size);

            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
