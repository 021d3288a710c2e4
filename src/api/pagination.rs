use serde::Deserialize;

use crate::config;
use crate::error::ApiError;

/// Offset-style list parameters: `?_start=0&_end=25&_sort=name&_order=DESC`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "_start")]
    pub start: Option<i64>,
    #[serde(rename = "_end")]
    pub end: Option<i64>,
    #[serde(rename = "_sort")]
    pub sort: Option<String>,
    #[serde(rename = "_order")]
    pub order: Option<String>,
}

impl ListParams {
    pub fn offset(&self) -> i64 {
        self.start.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        let api = &config::config().api;
        let requested = match (self.start, self.end) {
            (Some(start), Some(end)) => end - start,
            (None, Some(end)) => end,
            _ => api.default_page_size,
        };
        requested.clamp(1, api.max_page_size)
    }

    /// Build a safe ORDER BY clause. Sort columns are matched against a
    /// per-resource whitelist; anything else is a 400, never interpolated.
    pub fn order_clause(&self, allowed: &[&str], default: &str) -> Result<String, ApiError> {
        let column = match self.sort.as_deref() {
            None => default,
            Some(requested) => allowed
                .iter()
                .copied()
                .find(|c| *c == requested)
                .ok_or_else(|| {
                    ApiError::bad_request(format!("Cannot sort by '{}'", requested))
                })?,
        };

        let direction = match self.order.as_deref() {
            None => "ASC",
            Some(o) if o.eq_ignore_ascii_case("asc") => "ASC",
            Some(o) if o.eq_ignore_ascii_case("desc") => "DESC",
            Some(other) => {
                return Err(ApiError::bad_request(format!("Invalid sort order '{}'", other)))
            }
        };

        Ok(format!("ORDER BY {} {}", column, direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: Option<i64>, end: Option<i64>) -> ListParams {
        ListParams { start, end, sort: None, order: None }
    }

    #[test]
    fn window_maps_to_limit_offset() {
        let p = params(Some(50), Some(75));
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn missing_window_uses_default_page_size() {
        let p = params(None, None);
        assert_eq!(p.offset(), 0);
        assert!(p.limit() > 0);
    }

    #[test]
    fn degenerate_window_clamps_to_one() {
        let p = params(Some(10), Some(10));
        assert_eq!(p.limit(), 1);
        let inverted = params(Some(20), Some(10));
        assert_eq!(inverted.limit(), 1);
    }

    #[test]
    fn order_clause_rejects_unknown_columns() {
        let p = ListParams {
            sort: Some("password_hash".into()),
            ..Default::default()
        };
        assert!(p.order_clause(&["name", "created_at"], "created_at").is_err());
    }

    #[test]
    fn order_clause_builds_whitelisted_sort() {
        let p = ListParams {
            sort: Some("name".into()),
            order: Some("DESC".into()),
            ..Default::default()
        };
        let clause = p.order_clause(&["name", "created_at"], "created_at").unwrap();
        assert_eq!(clause, "ORDER BY name DESC");
    }

    #[test]
    fn default_sort_applies_when_unspecified() {
        let p = ListParams::default();
        let clause = p.order_clause(&["name", "created_at"], "created_at").unwrap();
        assert_eq!(clause, "ORDER BY created_at ASC");
    }
}
