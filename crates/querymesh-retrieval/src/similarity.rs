//! Cosine similarity ranking and an optional max-marginal-relevance pass for
//! diversity (spec §4.4). Cosine similarity follows the same formula as the
//! teacher's `EmbeddingsFilter` document compressor.

/// Cosine similarity between two equal-length vectors; `0.0` if either is
/// zero-length or a zero vector, or if the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Ranks `candidates` (each `(index, embedding)`) against `query` by cosine
/// similarity, descending, and returns the top `k` indices.
pub fn top_k_by_similarity(query: &[f32], candidates: &[(usize, &[f32])], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .map(|(idx, emb)| (*idx, cosine_similarity(query, emb)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(idx, _)| idx).collect()
}

/// Maximal marginal relevance: greedily selects up to `k` items balancing
/// query relevance against redundancy with items already selected.
/// `lambda` in `[0, 1]` trades relevance (1.0) for diversity (0.0).
pub fn mmr_select(
    query: &[f32],
    candidates: &[(usize, &[f32])],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected = Vec::with_capacity(k.min(candidates.len()));

    while !remaining.is_empty() && selected.len() < k {
        let mut best_pos = 0;
        let mut best_score = f32::MIN;

        for (pos, &cand_idx) in remaining.iter().enumerate() {
            let relevance = cosine_similarity(query, candidates[cand_idx].1);
            let redundancy = selected
                .iter()
                .map(|&sel_idx: &usize| {
                    let sel_pos = candidates.iter().position(|(idx, _)| *idx == sel_idx).unwrap();
                    cosine_similarity(candidates[cand_idx].1, candidates[sel_pos].1)
                })
                .fold(0.0_f32, f32::max);

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        let chosen = remaining.remove(best_pos);
        selected.push(candidates[chosen].0);
    }

    selected
}
