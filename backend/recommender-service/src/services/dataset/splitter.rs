use crate::models::RawInteraction;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

/// Leave-n-out split per user.
///
/// Users with `n` or fewer interactions are dropped from both splits. For the
/// others, `n` items go to the test split, chosen uniformly without
/// replacement when `random` is set, otherwise the last `n` in input order.
pub fn leave_n_out_split<R: Rng + ?Sized>(
    interactions: &[RawInteraction],
    n: usize,
    random: bool,
    rng: &mut R,
) -> (Vec<RawInteraction>, Vec<RawInteraction>) {
    let mut grouped: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for row in interactions {
        grouped.entry(row.user_id.as_str()).or_default().push(row.item_id);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();

    for (user, items) in grouped {
        if items.len() <= n {
            continue;
        }
        let held_out: Vec<i64> = if random {
            items.choose_multiple(rng, n).copied().collect()
        } else {
            items[items.len() - n..].to_vec()
        };
        let held_out_set: HashSet<i64> = held_out.iter().copied().collect();

        train.extend(
            items
                .iter()
                .filter(|item| !held_out_set.contains(item))
                .map(|&item| RawInteraction::new(user, item)),
        );
        test.extend(held_out.into_iter().map(|item| RawInteraction::new(user, item)));
    }

    (train, test)
}
