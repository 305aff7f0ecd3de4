use crate::ids::{MenuItemId, UserId};
use crate::money::{validate_amount_cents, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const ITEM_NAME_MAX_LEN: usize = 120;
pub const DESCRIPTION_MAX_LEN: usize = 2000;
pub const TAG_MAX_LEN: usize = 32;
pub const MAX_TAGS: usize = 16;
pub const IMAGE_URL_MAX_LEN: usize = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            other => Err(ValidationError(format!("unknown meal_type: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }

    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Breakfast, Self::Lunch, Self::Dinner]
    }
}

pub fn parse_service_date(input: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError("service date must be YYYY-MM-DD".to_string()))
}

/// A dish offered by one restaurant on one service date for one meal slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub restaurant_id: UserId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub service_date: NaiveDate,
    pub meal_type: MealType,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError("menu item name must not be empty".to_string()));
        }
        if self.name.len() > ITEM_NAME_MAX_LEN {
            return Err(ValidationError(format!(
                "menu item name exceeds max length {ITEM_NAME_MAX_LEN}"
            )));
        }
        if self.description.len() > DESCRIPTION_MAX_LEN {
            return Err(ValidationError(format!(
                "menu item description exceeds max length {DESCRIPTION_MAX_LEN}"
            )));
        }
        validate_amount_cents(self.price_cents, "price_cents")?;
        if let Some(url) = &self.image_url {
            validate_image_url(url)?;
        }
        if self.tags.len() > MAX_TAGS {
            return Err(ValidationError(format!("too many tags, max {MAX_TAGS}")));
        }
        for tag in &self.tags {
            if tag.trim().is_empty() || tag.len() > TAG_MAX_LEN {
                return Err(ValidationError(format!(
                    "tags must be non-empty and at most {TAG_MAX_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

pub fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.len() > IMAGE_URL_MAX_LEN {
        return Err(ValidationError(format!(
            "image_url exceeds max length {IMAGE_URL_MAX_LEN}"
        )));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ValidationError(
            "image_url must be an http(s) URL".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> MenuItem {
        MenuItem {
            id: MenuItemId::fresh(),
            restaurant_id: UserId::fresh(),
            name: "Masala Dosa".to_string(),
            description: "crisp dosa with potato filling".to_string(),
            price_cents: 650,
            service_date: parse_service_date("2025-03-14").unwrap(),
            meal_type: MealType::Breakfast,
            image_url: None,
            tags: vec!["vegetarian".to_string()],
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_item_passes() {
        assert!(item().validate().is_ok());
    }

    #[test]
    fn service_date_format_is_strict() {
        assert!(parse_service_date("2025-03-14").is_ok());
        assert!(parse_service_date("14/03/2025").is_err());
        assert!(parse_service_date("2025-13-01").is_err());
    }

    #[test]
    fn price_and_image_rules() {
        let mut bad = item();
        bad.price_cents = 0;
        assert!(bad.validate().is_err());

        let mut bad = item();
        bad.image_url = Some("ftp://example.com/dosa.jpg".to_string());
        assert!(bad.validate().is_err());

        let mut ok = item();
        ok.image_url = Some("https://images.example.com/dosa.jpg".to_string());
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn meal_type_round_trips() {
        for mt in MealType::all() {
            assert_eq!(MealType::parse(mt.as_str()).unwrap(), mt);
        }
        assert!(MealType::parse("brunch").is_err());
    }
}
