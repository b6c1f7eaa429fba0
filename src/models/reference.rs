use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier picked up by the daily trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

/// Externally supplied reference price for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPrice {
    pub identifier: String,
    pub list_price: f64,
    pub updated_at: DateTime<Utc>,
}

impl ListPrice {
    /// Case-insensitive substring match on the identifier. Blank terms match everything.
    pub fn matches(&self, search: Option<&str>) -> bool {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => self
                .identifier
                .to_lowercase()
                .contains(&term.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let price = ListPrice {
            identifier: "B00ABC123".to_string(),
            list_price: 19.99,
            updated_at: Utc::now(),
        };

        assert!(price.matches(None));
        assert!(price.matches(Some("  ")));
        assert!(price.matches(Some("abc")));
        assert!(!price.matches(Some("xyz")));
    }
}
