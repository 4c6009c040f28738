/// Indexes that sort `values` from largest to smallest
///
/// The sort is stable, so tied values keep their original (ascending)
/// index order.
pub fn argsort_descending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}

/// Index of the first maximum, or `None` if `values` is empty
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            None => best = Some(i),
            Some(b) if v > values[b] => best = Some(i),
            _ => {}
        }
    }
    best
}

/// Median of `values`; the mean of the two middle values for an even
/// number of elements
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}
