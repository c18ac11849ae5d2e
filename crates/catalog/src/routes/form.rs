//! Multipart product form parsing.
//!
//! Only the listed field names are accepted; anything else fails the
//! request before it reaches the store.

use axum::extract::Multipart;
use axum::extract::multipart::Field;

use crate::error::{AppError, CatalogError};
use crate::models::ProductFields;

/// An uploaded photo, not yet validated.
#[derive(Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// A parsed product form.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub fields: ProductFields,
    pub photo: Option<Upload>,
}

/// Read an allow-listed product form.
///
/// A `photo` part with no content (an empty file input) counts as no photo.
/// `tags` may repeat.
///
/// # Errors
///
/// `BadRequest` for a malformed body, `Validation` for an unknown field.
pub async fn read_product_form(mut multipart: Multipart) -> Result<ProductForm, AppError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "photo" => form.photo = read_upload(field).await?,
            "name" => form.fields.name = Some(text(field).await?),
            "description" => form.fields.description = Some(text(field).await?),
            "price" => form.fields.price = Some(text(field).await?),
            "tags" => form
                .fields
                .tags
                .get_or_insert_with(Vec::new)
                .push(text(field).await?),
            "location[type]" => form.fields.location.kind = Some(text(field).await?),
            "location[address]" => form.fields.location.address = Some(text(field).await?),
            "location[coordinates][0]" => form.fields.location.lng = Some(text(field).await?),
            "location[coordinates][1]" => form.fields.location.lat = Some(text(field).await?),
            other => {
                return Err(CatalogError::validation(format!("Unexpected field {other:?}")).into());
            }
        }
    }

    Ok(form)
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

async fn read_upload(field: Field<'_>) -> Result<Option<Upload>, AppError> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload {
        bytes: bytes.to_vec(),
        content_type,
    }))
}
