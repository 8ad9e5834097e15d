//! Competition ranking of report items by a single score
use crate::filter::{satisfies_filter_list, Filter, Filterable};
use crate::score::{ScoreComparator, Scored};
use crate::util::finite;

/// Items that can be ranked by one of their scores
pub trait Rankable: Scored {
    fn set_rank(&mut self, rank: Option<i64>);
}

/// Rank `items` best first: equal scores share a rank and the next distinct
/// score continues at its position (1, 1, 3). Every item is unranked first,
/// items without a usable score stay unranked.
pub fn calculate_ranking<T: Rankable>(comparator: &ScoreComparator, items: Vec<&mut T>) {
    let short = comparator.short_name();
    let mut scored = Vec::with_capacity(items.len());
    for item in items {
        item.set_rank(None);
        if let Some(score) = item.score(short).and_then(finite) {
            scored.push((score, item));
        }
    }

    scored.sort_by(|a, b| comparator.compare_values(Some(a.0), Some(b.0)));

    let mut rank = 0;
    let mut last = None;
    for (idx, (score, item)) in scored.into_iter().enumerate() {
        if last != Some(score) {
            rank = idx as i64 + 1;
            last = Some(score);
        }
        item.set_rank(Some(rank));
    }
}

/// Rank the items passing `filters` at `file_id`, the others are unranked
pub(crate) fn rank_filtered<T>(comparator: &ScoreComparator, items: &mut [T], filters: &[Filter], file_id: u64)
where
    T: Rankable + Filterable,
{
    let mut passing = Vec::with_capacity(items.len());
    for item in items.iter_mut() {
        if satisfies_filter_list(item, file_id, filters) {
            passing.push(item);
        } else {
            item.set_rank(None);
        }
    }
    calculate_ranking(comparator, passing);
}

/// Dense ranks (1, 1, 2) of the values, by index. Absent values get `None`.
pub fn dense_ranks(comparator: &ScoreComparator, values: &[Option<f64>]) -> Vec<Option<i64>> {
    let mut order = (0..values.len())
        .filter(|&i| values[i].and_then(finite).is_some())
        .collect::<Vec<_>>();
    order.sort_by(|&a, &b| comparator.compare_values(values[a], values[b]));

    let mut ranks = vec![None; values.len()];
    let mut rank = 0;
    let mut last = None;
    for idx in order {
        if last != values[idx] {
            rank += 1;
            last = values[idx];
        }
        ranks[idx] = Some(rank);
    }
    ranks
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct Item(Option<f64>, Option<i64>);

    impl Scored for Item {
        fn score(&self, _: &str) -> Option<f64> {
            self.0
        }
    }

    impl Rankable for Item {
        fn set_rank(&mut self, rank: Option<i64>) {
            self.1 = rank;
        }
    }

    #[test]
    fn competition_ranking() {
        let mut items = vec![
            Item(Some(10.0), Some(7)),
            Item(Some(30.0), None),
            Item(None, Some(3)),
            Item(Some(30.0), None),
            Item(Some(f64::NAN), Some(1)),
            Item(Some(20.0), None),
        ];
        calculate_ranking(&ScoreComparator::new("s", true), items.iter_mut().collect());
        let ranks = items.iter().map(|i| i.1).collect::<Vec<_>>();
        assert_eq!(ranks, vec![Some(4), Some(1), None, Some(1), None, Some(3)]);

        calculate_ranking(&ScoreComparator::new("s", false), items.iter_mut().collect());
        let ranks = items.iter().map(|i| i.1).collect::<Vec<_>>();
        assert_eq!(ranks, vec![Some(1), Some(3), None, Some(3), None, Some(2)]);
    }

    #[test]
    fn ranks_follow_sort_order() {
        let cmp = ScoreComparator::new("s", true);
        let mut items = [5.0, 1.0, 5.0, 3.0, 3.0, 3.0, 0.5]
            .iter()
            .map(|&s| Item(Some(s), None))
            .collect::<Vec<_>>();
        calculate_ranking(&cmp, items.iter_mut().collect());
        items.sort_by(|a, b| cmp.compare_values(a.0, b.0));
        for w in items.windows(2) {
            if w[0].0 == w[1].0 {
                assert_eq!(w[0].1, w[1].1);
            } else {
                assert!(w[0].1 < w[1].1);
            }
        }
        assert_eq!(items.last().and_then(|i| i.1), Some(7));
    }

    #[test]
    fn dense() {
        let cmp = ScoreComparator::new("s", false);
        let ranks = dense_ranks(&cmp, &[Some(0.1), None, Some(0.01), Some(0.1), Some(0.5)]);
        assert_eq!(ranks, vec![Some(2), None, Some(1), Some(2), Some(3)]);
    }
}
