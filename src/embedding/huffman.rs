use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Path from the root of the Huffman tree to one leaf.
/// `points` are inner-node indices, `codes` the branch taken at each of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HuffmanCode {
    pub codes: Vec<u8>,
    pub points: Vec<usize>,
}

/// Builds Huffman codes for `counts`, one per token, in the same order.
/// Frequent tokens get short codes. A single token gets an empty code.
pub fn build_codes(counts: &[u64]) -> Vec<HuffmanCode> {
    let n = counts.len();
    if n < 2 {
        return vec![HuffmanCode::default(); n];
    }

    // leaves are 0..n, inner nodes n..2n-1
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| Reverse((c, i)))
        .collect();
    let mut parent = vec![0usize; 2 * n - 1];
    let mut branch = vec![0u8; 2 * n - 1];

    let mut next = n;
    while let (Some(Reverse((c1, a))), Some(Reverse((c2, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        branch[b] = 1;
        heap.push(Reverse((c1 + c2, next)));
        next += 1;
    }
    let root = next - 1;

    (0..n)
        .map(|leaf| {
            let mut codes = Vec::new();
            let mut points = Vec::new();
            let mut node = leaf;
            while node != root {
                codes.push(branch[node]);
                node = parent[node];
                points.push(node - n);
            }
            codes.reverse();
            points.reverse();
            HuffmanCode { codes, points }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequent_tokens_get_shorter_codes() {
        let codes = build_codes(&[100, 40, 10, 5, 1]);
        assert_eq!(codes.len(), 5);
        assert!(codes[0].codes.len() <= codes[4].codes.len());
        for c in &codes {
            assert_eq!(c.codes.len(), c.points.len());
            assert!(c.points.iter().all(|&p| p < 4));
        }
    }

    #[test]
    fn codes_are_prefix_free() {
        let codes = build_codes(&[9, 7, 7, 3, 2, 2, 1]);
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert!(!b.codes.starts_with(&a.codes), "{:?} prefixes {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn root_is_first_point() {
        let codes = build_codes(&[3, 2, 1]);
        // two inner nodes, the root is the last one created
        for c in &codes {
            assert_eq!(c.points[0], 1);
        }
    }

    #[test]
    fn single_token_has_empty_code() {
        assert_eq!(build_codes(&[5]), vec![HuffmanCode::default()]);
        assert!(build_codes(&[]).is_empty());
    }
}
