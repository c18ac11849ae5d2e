//! Product domain types and the allow-listed input schemas used to build them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{GeoPoint, Location, Price, ProductId, Slug, UserId};

use crate::error::CatalogError;

/// A product listed by a seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: Slug,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: Price,
    /// Ordered tags; duplicates are kept and counted by the tag histogram.
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub location: Location,
    /// Blob-store filename of the resized photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Weak reference to the selling user.
    pub seller: UserId,
}

/// Reduced projection returned by proximity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyProduct {
    pub slug: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: Location,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl From<&Product> for NearbyProduct {
    fn from(product: &Product) -> Self {
        Self {
            slug: product.slug.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            location: product.location.clone(),
            price: product.price,
            photo: product.photo.clone(),
        }
    }
}

/// Raw product fields as submitted by a client.
///
/// Only these fields exist; transports reject anything else before building
/// this struct. Values are unparsed so validation can report what was wrong.
#[derive(Debug, Clone, Default)]
pub struct ProductFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: LocationFields,
}

/// Raw location fields (`location[type]`, `location[address]`, `location[coordinates][i]`).
#[derive(Debug, Clone, Default)]
pub struct LocationFields {
    /// Accepted for compatibility and ignored: stored locations are always points.
    pub kind: Option<String>,
    pub address: Option<String>,
    pub lng: Option<String>,
    pub lat: Option<String>,
}

impl LocationFields {
    /// Whether the client sent any location data at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.lng.is_none() && self.lat.is_none() && self.kind.is_none()
    }

    fn parse(self) -> Result<Location, CatalogError> {
        let (Some(lng), Some(lat)) = (self.lng, self.lat) else {
            return Err(CatalogError::validation("You must supply coordinates!"));
        };
        let point = parse_point(&lng, &lat)?;
        let address = self
            .address
            .ok_or_else(|| CatalogError::validation("You must supply an address!"))?;
        Location::new(point, &address).map_err(|e| CatalogError::validation(e.to_string()))
    }
}

/// Parse user-supplied longitude/latitude strings into a validated point.
///
/// # Errors
///
/// Returns `CatalogError::Validation` if either value is not a number or is
/// out of range.
pub fn parse_point(lng: &str, lat: &str) -> Result<GeoPoint, CatalogError> {
    let parse = |label: &str, raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|_| CatalogError::validation(format!("{label} must be a number (got {raw:?})")))
    };
    let point = GeoPoint::new(parse("longitude", lng)?, parse("latitude", lat)?)
        .map_err(|e| CatalogError::validation(e.to_string()))?;
    Ok(point)
}

/// Validated input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
}

impl TryFrom<ProductFields> for NewProduct {
    type Error = CatalogError;

    fn try_from(fields: ProductFields) -> Result<Self, Self::Error> {
        let name = fields
            .name
            .as_deref()
            .and_then(non_blank)
            .ok_or_else(|| CatalogError::validation("Please enter a product name!"))?;
        let price = fields
            .price
            .as_deref()
            .ok_or_else(|| CatalogError::validation("Please enter the price as a number"))
            .and_then(parse_price)?;

        Ok(Self {
            name,
            description: fields.description.as_deref().and_then(non_blank),
            price,
            tags: fields.tags.map(normalize_tags).unwrap_or_default(),
            location: fields.location.parse()?,
            photo: None,
        })
    }
}

/// Validated partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub price: Option<Price>,
    pub tags: Option<Vec<String>>,
    pub location: Option<Location>,
    pub photo: Option<String>,
}

impl ProductPatch {
    /// Apply the patch, returning whether the name changed.
    pub fn apply(self, product: &mut Product) -> bool {
        let mut renamed = false;
        if let Some(name) = self.name
            && name != product.name
        {
            product.name = name;
            renamed = true;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(tags) = self.tags {
            product.tags = tags;
        }
        if let Some(location) = self.location {
            product.location = location;
        }
        if let Some(photo) = self.photo {
            product.photo = Some(photo);
        }
        renamed
    }
}

impl TryFrom<ProductFields> for ProductPatch {
    type Error = CatalogError;

    fn try_from(fields: ProductFields) -> Result<Self, Self::Error> {
        let name = match fields.name {
            Some(raw) => Some(
                non_blank(&raw)
                    .ok_or_else(|| CatalogError::validation("Please enter a product name!"))?,
            ),
            None => None,
        };
        let location = if fields.location.is_empty() {
            None
        } else {
            Some(fields.location.parse()?)
        };

        Ok(Self {
            name,
            description: fields.description.map(|raw| non_blank(&raw)),
            price: fields.price.as_deref().map(parse_price).transpose()?,
            tags: fields.tags.map(normalize_tags),
            location,
            photo: None,
        })
    }
}

/// A `(tag, count)` histogram entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_price(raw: &str) -> Result<Price, CatalogError> {
    Price::parse(raw).map_err(|e| CatalogError::validation(e.to_string()))
}

/// Split comma-separated values, trim, and drop empties. Order and
/// duplicates are preserved.
fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    raw.iter()
        .flat_map(|value| value.split(','))
        .filter_map(non_blank)
        .collect()
}
