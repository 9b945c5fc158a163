//! Sparse term vectors: term frequency, inverse document frequency, TF-IDF
//! weights and cosine similarity.

use std::collections::{HashMap, HashSet};

/// Sparse mapping from term to weight. Missing terms weigh zero.
pub type TermVector = HashMap<String, f64>;

/// Normalized term frequency: `count(term) / total_tokens`.
/// An empty token list gives an empty vector.
pub fn compute_tf<S: AsRef<str>>(tokens: &[S]) -> TermVector {
    let mut tf = TermVector::new();
    if tokens.is_empty() {
        return tf;
    }
    for token in tokens {
        *tf.entry(token.as_ref().to_string()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    for value in tf.values_mut() {
        *value /= total;
    }
    tf
}

/// `ln(N / (1 + df))` for a single term.
#[inline]
pub fn idf_weight(num_docs: usize, doc_frequency: u32) -> f64 {
    (num_docs as f64 / (1.0 + doc_frequency as f64)).ln()
}

/// Counts, per term, the vectors in which it has a nonzero weight.
pub fn document_frequencies<'a, I>(vectors: I) -> HashMap<String, u32>
where
    I: IntoIterator<Item = &'a TermVector>,
{
    let mut df: HashMap<String, u32> = HashMap::new();
    for vector in vectors {
        for (term, weight) in vector {
            if *weight > 0.0 {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
    }
    df
}

/// IDF table from precomputed document frequencies over `num_docs` documents.
pub fn idf_from_frequencies(doc_frequencies: &HashMap<String, u32>, num_docs: usize) -> TermVector {
    if num_docs == 0 {
        return TermVector::new();
    }
    doc_frequencies
        .iter()
        .filter(|(_, df)| **df > 0)
        .map(|(term, df)| (term.clone(), idf_weight(num_docs, *df)))
        .collect()
}

/// IDF table over a set of TF vectors. An empty set gives an empty table.
pub fn compute_idf<'a, I>(vectors: I) -> TermVector
where
    I: IntoIterator<Item = &'a TermVector>,
{
    let vectors: Vec<&TermVector> = vectors.into_iter().collect();
    let df = document_frequencies(vectors.iter().copied());
    idf_from_frequencies(&df, vectors.len())
}

/// `tf * idf` per term, keeping only strictly positive products.
pub fn compute_tfidf(tf: &TermVector, idf: &TermVector) -> TermVector {
    tf.iter()
        .filter_map(|(term, freq)| {
            let weight = freq * idf.get(term).copied().unwrap_or(0.0);
            (weight > 0.0).then(|| (term.clone(), weight))
        })
        .collect()
}

/// Euclidean length.
pub fn norm(vector: &TermVector) -> f64 {
    vector.values().map(|w| w * w).sum::<f64>().sqrt()
}

/// Sum of products over shared terms.
pub fn dot(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|other| w * other))
        .sum()
}

/// cos(θ) = a·b / (‖a‖ ‖b‖), and 0 when either vector has zero length.
/// Lies in [0, 1] for nonnegative vectors.
pub fn cosine_similarity(a: &TermVector, b: &TermVector) -> f64 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(0.0, 1.0)
}

/// Terms ranked by their contribution `a[t] * b[t]` to the dot product.
pub fn shared_contributions(a: &TermVector, b: &TermVector) -> Vec<(String, f64)> {
    let b_terms: HashSet<&String> = b.keys().collect();
    let mut shared: Vec<(String, f64)> = a
        .iter()
        .filter(|(term, _)| b_terms.contains(term))
        .map(|(term, w)| (term.clone(), w * b[term]))
        .collect();
    shared.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
    shared
}
