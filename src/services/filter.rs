//! Search filter construction.

use crate::models::ModelSchema;
use ldap3::ldap_escape;

/// Filter that matches every entry.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// Builds `(key=value)` with the value escaped.
#[must_use]
pub fn criterion(key: &str, value: &str) -> String {
    format!("({key}={})", ldap_escape(value))
}

/// Builds a filter from `field = value` criteria.
///
/// Field names are translated to external keys through `schema` when it
/// declares them and used verbatim otherwise. A single criterion yields
/// `(key=value)`, several are AND-combined in the order given. Returns
/// `None` for no criteria.
#[must_use]
pub fn from_criteria(criteria: &[(String, String)], schema: Option<&ModelSchema>) -> Option<String> {
    let mut parts = criteria.iter().map(|(field, value)| {
        let key = schema
            .and_then(|s| s.descriptor_for(field))
            .map_or(field.as_str(), |d| d.external_key());
        criterion(key, value)
    });

    match criteria.len() {
        0 => None,
        1 => parts.next(),
        _ => Some(format!("(&{})", parts.collect::<String>())),
    }
}
