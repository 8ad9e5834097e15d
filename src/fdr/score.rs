//! The FDR score: a rankable, piecewise-linear transform of q-values
//! against the underlying score
use crate::util::finite;

/// An FDR score is never 0, this takes its place
pub const SMALL_FDRSCORE_SUBSTITUTE: f64 = 0.00001;

#[inline]
fn substitute_zero(value: f64) -> f64 {
    if value == 0.0 {
        SMALL_FDRSCORE_SUBSTITUTE
    } else {
        value
    }
}

/// Interpolate FDR scores for items already sorted best first.
///
/// `scores` and `q_values` are given in walk order. The score axis is
/// turned into "lower is better" and the q-value is interpolated linearly
/// between the points where it steps up; after the last step point the
/// line is extrapolated. Without step points the line runs towards an
/// artificial decoy appended after the last item.
///
/// Returns `None` for lists with fewer than 2 items.
pub fn fdr_scores(
    scores: &[f64],
    q_values: &[f64],
    has_decoys: bool,
    higher_score_better: bool,
    artificial_decoy_fdr: f64,
) -> Option<Vec<f64>> {
    let n = scores.len();
    if n < 2 || q_values.len() != n {
        return None;
    }

    if !has_decoys {
        return Some(vec![SMALL_FDRSCORE_SUBSTITUTE; n]);
    }

    if scores.iter().all(|s| *s == scores[0]) {
        return Some(vec![substitute_zero(q_values[0]); n]);
    }

    // the best item must not end up at exactly 0, so the origin is moved
    // one "best to second best" distance beyond it
    let best = if higher_score_better {
        let first = scores[0];
        let second = scores
            .iter()
            .copied()
            .find(|s| *s != first)
            .unwrap_or(first);
        first + (first - second)
    } else {
        0.0
    };
    let transform = |s: f64| if higher_score_better { best - s } else { s };

    let mut steps = (0..n - 1)
        .filter(|&i| q_values[i] < q_values[i + 1])
        .map(|i| i + 1);

    let (mut s_last, mut q_last) = (0.0, 0.0);
    let (mut s_next, mut q_next, mut next_step) = match steps.next() {
        Some(step) => (transform(scores[step]), q_values[step], step),
        None => (transform(scores[n - 1]), artificial_decoy_fdr, n),
    };
    let mut slope = (q_next - q_last) / (s_next - s_last);

    let mut out = Vec::with_capacity(n);
    for (idx, score) in scores.iter().enumerate() {
        if idx == next_step {
            if let Some(step) = steps.next() {
                s_last = s_next;
                q_last = q_next;
                next_step = step;
                s_next = transform(scores[step]);
                q_next = q_values[step];
            }
            slope = (q_next - q_last) / (s_next - s_last);
        }
        out.push(substitute_zero((transform(*score) - s_last) * slope + q_last));
    }
    Some(out)
}

/// Average FDR score of a PSM set: geometric mean of the valid FDR scores
/// of its members, NaN if there are none
pub fn average_fdr_score(member_scores: &[f64]) -> f64 {
    let valid = member_scores
        .iter()
        .copied()
        .filter_map(finite)
        .collect::<Vec<_>>();
    crate::util::geometric_mean(&valid)
}
