//! Resolves the placeholder values a recipient contributes to rendering.

use crate::models::{ColumnMapping, Recipient};
use crate::templates::RenderContext;

/// Used for `{name}` when the recipient has no usable name.
pub const NAME_FALLBACK: &str = "there";
/// Used for `{company}` when the recipient has no usable company.
pub const COMPANY_FALLBACK: &str = "your company";

/// Build the render context for `recipient`.
///
/// `name` and `company` are always present in the result: the trimmed column value when the
/// column is mapped, present and non-blank, the fallback otherwise. No other columns are
/// exposed to templates.
pub fn resolve(
    recipient: &Recipient,
    name_field: Option<&str>,
    company_field: Option<&str>,
) -> RenderContext {
    RenderContext::new()
        .with("name", pick(recipient, name_field, NAME_FALLBACK))
        .with("company", pick(recipient, company_field, COMPANY_FALLBACK))
}

/// [`resolve`] using the name and company columns of a mapping.
pub fn resolve_mapped(recipient: &Recipient, columns: &ColumnMapping) -> RenderContext {
    resolve(recipient, columns.name.as_deref(), columns.company.as_deref())
}

fn pick<'a>(recipient: &'a Recipient, field: Option<&str>, fallback: &'a str) -> &'a str {
    field
        .and_then(|column| recipient.field(column))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
}
