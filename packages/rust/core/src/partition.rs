//! Splitting the candidate sequence into worker batches.

use macroharvest_shared::{Batch, Candidate, HarvestError, Result};

/// Index a sequence of URLs in input order.
pub fn candidates_from_urls<I, S>(urls: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .enumerate()
        .map(|(index, url)| Candidate::new(index, url))
        .collect()
}

/// Split `candidates` into contiguous batches of at most `batch_size`.
///
/// Batch `i` holds `[i * batch_size, min((i + 1) * batch_size, n))`; the
/// batches are disjoint, ordered, and cover the input exactly.
pub fn partition(candidates: Vec<Candidate>, batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(HarvestError::validation(
            "batch size must be greater than zero",
        ));
    }

    let mut batches = Vec::with_capacity(candidates.len().div_ceil(batch_size));
    let mut remaining = candidates.into_iter().peekable();

    while remaining.peek().is_some() {
        let chunk: Vec<Candidate> = remaining.by_ref().take(batch_size).collect();
        batches.push(Batch {
            id: batches.len(),
            candidates: chunk,
        });
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<Candidate> {
        candidates_from_urls((0..n).map(|i| format!("https://example.com/{i}.doc")))
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = partition(urls(3), 0).unwrap_err();
        assert!(matches!(err, HarvestError::Validation { .. }));
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(partition(Vec::new(), 15).unwrap().is_empty());
    }

    #[test]
    fn partitions_cover_input_exactly() {
        for n in 0..40 {
            for b in 1..12 {
                let batches = partition(urls(n), b).unwrap();
                assert_eq!(batches.len(), n.div_ceil(b), "n={n} b={b}");

                let mut expected = 0;
                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.id, i);
                    assert!(!batch.is_empty());
                    assert!(batch.len() <= b);
                    assert_eq!(batch.candidates[0].index, i * b);
                    for c in &batch.candidates {
                        assert_eq!(c.index, expected);
                        expected += 1;
                    }
                }
                assert_eq!(expected, n);
            }
        }
    }

    #[test]
    fn last_batch_is_short() {
        let batches = partition(urls(7), 3).unwrap();
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn candidates_keep_input_order_and_trim() {
        let c = candidates_from_urls([" a ", "b\n"]);
        assert_eq!(c[0], Candidate::new(0, "a"));
        assert_eq!(c[1].url, "b");
        assert_eq!(c[1].index, 1);
    }
}
