//! # Catalog Filtering
//!
//! Search, category and sort over a list of items.
//!
//! ```text
//!   items ──► search (name contains, case-insensitive)
//!         ──► category (exact)
//!         ──► sort_by? (stable; absent keeps input order)
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::types::Item;

/// Field an item list can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortField {
    Name,
    Price,
    Stock,
    Category,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Catalog query. Absent fields put no constraint on the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl ItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn sort_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = Some(field);
        self.direction = direction;
        self
    }

    /// Checks whether a single item passes the search and category terms.
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(ref query) = self.search {
            let query = query.trim().to_lowercase();
            if !query.is_empty() && !item.name.to_lowercase().contains(&query) {
                return false;
            }
        }

        if let Some(ref category) = self.category {
            if item.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Applies `filter` to `items`, preserving input order unless sorted.
pub fn filter_items(items: Vec<Item>, filter: &ItemFilter) -> Vec<Item> {
    let mut result: Vec<Item> = items.into_iter().filter(|i| filter.matches(i)).collect();

    if let Some(field) = filter.sort_by {
        // sort_by is stable
        result.sort_by(|a, b| {
            let ord = compare(a, b, field);
            match filter.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }

    result
}

fn compare(a: &Item, b: &Item, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::Price => a.price.cmp(&b.price),
        SortField::Stock => a.stock.cmp(&b.stock),
        SortField::Category => category_key(a).cmp(&category_key(b)),
    }
}

fn category_key(item: &Item) -> String {
    item.category.as_deref().unwrap_or("").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{now_millis, ItemForm};

    fn item(id: &str, name: &str, cents: i64, stock: i64, category: Option<&str>) -> Item {
        let mut form = ItemForm::new(name, Money::from_cents(cents), stock);
        form.category = category.map(String::from);
        Item::create_with_id(id, form, now_millis()).unwrap()
    }

    fn sample() -> Vec<Item> {
        vec![
            item("1", "Coffee", 250, 10, Some("Drinks")),
            item("2", "cookie", 120, 30, Some("Bakery")),
            item("3", "Iced Coffee", 320, 5, Some("Drinks")),
            item("4", "Napkins", 0, 100, None),
        ]
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_no_filter_keeps_order() {
        assert_eq!(ids(&filter_items(sample(), &ItemFilter::new())), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let result = filter_items(sample(), &ItemFilter::new().search("COFF"));
        assert_eq!(ids(&result), vec!["1", "3"]);
    }

    #[test]
    fn test_category_is_exact() {
        let result = filter_items(sample(), &ItemFilter::new().category("Drinks"));
        assert_eq!(ids(&result), vec!["1", "3"]);

        let result = filter_items(sample(), &ItemFilter::new().category("drinks"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_sort_by_each_field() {
        let by = |field: SortField, dir: SortDirection| -> Vec<String> {
            let sorted = filter_items(sample(), &ItemFilter::new().sort_by(field, dir));
            sorted.into_iter().map(|i| i.id).collect()
        };

        assert_eq!(by(SortField::Name, SortDirection::Asc), vec!["1", "2", "3", "4"]);
        assert_eq!(by(SortField::Price, SortDirection::Desc), vec!["3", "1", "2", "4"]);
        assert_eq!(by(SortField::Stock, SortDirection::Asc), vec!["3", "1", "2", "4"]);
        // Missing category sorts as ""
        assert_eq!(by(SortField::Category, SortDirection::Asc), vec!["4", "2", "1", "3"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let items = vec![
            item("a", "Same", 100, 1, None),
            item("b", "same", 100, 1, None),
            item("c", "SAME", 100, 1, None),
        ];
        let result = filter_items(items, &ItemFilter::new().sort_by(SortField::Name, SortDirection::Asc));
        assert_eq!(ids(&result), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_filter_deserializes_from_camel_case() {
        let filter: ItemFilter =
            serde_json::from_str(r#"{"search":"tea","sortBy":"price","direction":"desc"}"#).unwrap();
        assert_eq!(filter.sort_by, Some(SortField::Price));
        assert_eq!(filter.direction, SortDirection::Desc);
    }
}
