//! Key derivation for the object-store widget layout.

/// Lower-cases an owner name and replaces spaces with hyphens. This is the
/// partitioning segment of the object-store layout, so two spellings of the
/// same owner that differ only in case or spacing land in the same place.
#[must_use]
pub fn owner_slug(owner: &str) -> String {
    owner.replace(' ', "-").to_lowercase()
}

/// Storage key for a widget in an object-store sink:
/// `widgets/<owner-slug>/<widgetId>`.
#[must_use]
pub fn widget_object_key(owner: &str, widget_id: &str) -> String {
    format!("widgets/{}/{}", owner_slug(owner), widget_id)
}
