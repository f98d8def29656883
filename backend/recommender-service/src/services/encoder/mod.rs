/// Identifier Encoding
///
/// Maps raw handles / problem ids to dense zero-based indices and back.
/// Categories are assigned in sorted order, so fitting the same identifier
/// set always yields the same mapping regardless of row order.
use crate::models::{EncodedInteraction, ProblemId, RawInteraction};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use tracing::debug;

/// Bidirectional mapping for a single identifier space.
#[derive(Debug, Clone, Default)]
pub struct OrdinalEncoder<K> {
    categories: Vec<K>,
    index: HashMap<K, usize>,
}

impl<K> OrdinalEncoder<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let categories: Vec<K> = values
            .into_iter()
            .cloned()
            .collect::<BTreeSet<K>>()
            .into_iter()
            .collect();
        let index = categories
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        Self { categories, index }
    }

    /// `None` for identifiers not seen during `fit`.
    pub fn encode(&self, value: &K) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn decode(&self, index: usize) -> Option<&K> {
        self.categories.get(index)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// User and item encoders fitted together from an interaction table.
#[derive(Debug, Clone, Default)]
pub struct InteractionEncoder {
    users: OrdinalEncoder<String>,
    items: OrdinalEncoder<ProblemId>,
}

impl InteractionEncoder {
    pub fn fit(interactions: &[RawInteraction]) -> Self {
        let users = OrdinalEncoder::fit(interactions.iter().map(|r| &r.user_id));
        let items = OrdinalEncoder::fit(interactions.iter().map(|r| &r.item_id));
        debug!(
            users = users.len(),
            items = items.len(),
            "Interaction encoder fitted"
        );
        Self { users, items }
    }

    /// Rewrite rows to indices, dropping rows with an unseen user or item.
    pub fn transform(&self, interactions: &[RawInteraction]) -> Vec<EncodedInteraction> {
        let encoded: Vec<EncodedInteraction> = interactions
            .iter()
            .filter_map(|row| {
                let user = self.users.encode(&row.user_id)?;
                let item = self.items.encode(&row.item_id)?;
                Some(EncodedInteraction::new(user, item))
            })
            .collect();

        if encoded.len() < interactions.len() {
            debug!(
                dropped = interactions.len() - encoded.len(),
                "Dropped interactions with unknown identifiers"
            );
        }
        encoded
    }

    pub fn fit_transform(interactions: &[RawInteraction]) -> (Self, Vec<EncodedInteraction>) {
        let encoder = Self::fit(interactions);
        let encoded = encoder.transform(interactions);
        (encoder, encoded)
    }

    /// Map indices back to raw identifiers. `None` if an index is out of range.
    pub fn inverse_transform(&self, interactions: &[EncodedInteraction]) -> Option<Vec<RawInteraction>> {
        interactions
            .iter()
            .map(|row| {
                Some(RawInteraction::new(
                    self.users.decode(row.user)?.clone(),
                    *self.items.decode(row.item)?,
                ))
            })
            .collect()
    }

    pub fn encode_user(&self, handle: &str) -> Option<usize> {
        self.users.encode(&handle.to_string())
    }

    pub fn encode_item(&self, problem_id: ProblemId) -> Option<usize> {
        self.items.encode(&problem_id)
    }

    /// Encode a list of problem ids, silently dropping unknown ones.
    pub fn encode_items(&self, problem_ids: &[ProblemId]) -> Vec<usize> {
        problem_ids
            .iter()
            .filter_map(|id| self.items.encode(id))
            .collect()
    }

    pub fn decode_item(&self, index: usize) -> Option<ProblemId> {
        self.items.decode(index).copied()
    }

    pub fn decode_user(&self, index: usize) -> Option<&str> {
        self.users.decode(index).map(String::as_str)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
