//! Collection queries: one optional equality filter plus an ordering.
//!
//! This is the whole query surface the store needs to offer:
//! "list all ordered by creation" and "list where status == X ordered by
//! creation".

use serde::{Serialize, Deserialize};
use std::cmp::Ordering;

use crate::{Document, FieldValue};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Filter {
    /// Field must be present and equal to the value.
    Eq { field: String, value: FieldValue },
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc.get(field) == Some(value),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Every document of a collection, in storage order.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filter = Some(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(doc))
    }

    /// Filter and sort a full collection scan into the query result.
    ///
    /// Documents missing the order field sort as `Null`. Ties are broken
    /// by document id so the result is deterministic.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some(order) = &self.order_by {
            matched.sort_by(|a, b| {
                let ord = compare_field(a, b, &order.field).then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        matched
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    let null = FieldValue::Null;
    let va = a.get(field).unwrap_or(&null);
    let vb = b.get(field).unwrap_or(&null);
    va.total_cmp(vb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentId, Fields};

    fn doc(created_at: u64, status: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("createdAt".into(), FieldValue::Timestamp(created_at));
        fields.insert("status".into(), status.into());
        Document::new(DocumentId::new(), fields)
    }

    #[test]
    fn test_unfiltered_query_matches_everything() {
        let q = Query::collection("texts");
        assert!(q.matches(&doc(1, "draft")));
        assert!(q.matches(&doc(2, "published")));
    }

    #[test]
    fn test_equality_filter() {
        let q = Query::collection("texts").where_eq("status", "published");
        assert!(q.matches(&doc(1, "published")));
        assert!(!q.matches(&doc(1, "draft")));

        // Missing field never matches
        let empty = Document::new(DocumentId::new(), Fields::new());
        assert!(!q.matches(&empty));
    }

    #[test]
    fn test_apply_orders_descending() {
        let q = Query::collection("texts").order_by("createdAt", Direction::Descending);
        let result = q.apply(vec![doc(10, "draft"), doc(30, "draft"), doc(20, "draft")]);
        let stamps: Vec<u64> = result
            .iter()
            .map(|d| d.get("createdAt").and_then(FieldValue::as_timestamp).unwrap())
            .collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[test]
    fn test_apply_filters_then_orders() {
        let q = Query::collection("texts")
            .where_eq("status", "published")
            .order_by("createdAt", Direction::Ascending);
        let result = q.apply(vec![
            doc(3, "published"),
            doc(2, "draft"),
            doc(1, "published"),
        ]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].get("createdAt"), Some(&FieldValue::Timestamp(1)));
        assert_eq!(result[1].get("createdAt"), Some(&FieldValue::Timestamp(3)));
    }

    #[test]
    fn test_ties_are_deterministic() {
        let q = Query::collection("texts").order_by("createdAt", Direction::Descending);
        let docs = vec![doc(5, "draft"), doc(5, "draft"), doc(5, "draft")];
        let first = q.apply(docs.clone());
        let mut reversed = docs;
        reversed.reverse();
        let second = q.apply(reversed);
        assert_eq!(first, second);
    }
}
