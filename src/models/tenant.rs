use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An isolated customer/organization workspace. All business data is scoped
/// by `tenant_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub currency: String,
    pub tax_percent: Decimal,
    pub discount_percent: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Slugs are URL and header safe: lowercase alphanumeric plus hyphens,
    /// 2..=63 characters, no leading/trailing hyphen.
    pub fn is_valid_slug(slug: &str) -> bool {
        if slug.len() < 2 || slug.len() > 63 {
            return false;
        }
        if slug.starts_with('-') || slug.ends_with('-') {
            return false;
        }
        slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_slugs() {
        assert!(Tenant::is_valid_slug("acme"));
        assert!(Tenant::is_valid_slug("studio-54"));
        assert!(!Tenant::is_valid_slug("a"));
        assert!(!Tenant::is_valid_slug("-acme"));
        assert!(!Tenant::is_valid_slug("acme-"));
        assert!(!Tenant::is_valid_slug("Acme Inc"));
        assert!(!Tenant::is_valid_slug("acme_inc"));
    }
}
