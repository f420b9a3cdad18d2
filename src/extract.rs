use crate::config::{API_CONTRACT_MARKER, XAML_NAMESPACE};
use crate::dom::Element;
use crate::markup;
use crate::namespace::NamespaceTable;

/// Unique key of a top-level resource element.
///
/// Precedence, first non-empty wins: unqualified `Key`, `Key` in the XAML
/// language namespace, `Name` in that namespace, `TargetType`. Elements from
/// an API-contract conditional namespace get the contract condition prepended
/// so gated variants of the same key coexist.
pub fn resource_key(element: &Element, namespaces: &NamespaceTable) -> Option<String> {
    let key = unqualified_attribute(element, "Key")
        .or_else(|| xaml_attribute(element, namespaces, "Key"))
        .or_else(|| xaml_attribute(element, namespaces, "Name"))
        .or_else(|| unqualified_attribute(element, "TargetType"))?;

    match contract_condition(element, namespaces) {
        Some(condition) => Some(format!("{}:{}", condition, key)),
        None => Some(key.to_string()),
    }
}

fn unqualified_attribute<'a>(element: &'a Element, local: &str) -> Option<&'a str> {
    element
        .attributes
        .iter()
        .find(|a| a.name.prefix.is_none() && a.name.local == local)
        .map(|a| a.value.as_str())
        .filter(|v| !v.is_empty())
}

fn xaml_attribute<'a>(element: &'a Element, namespaces: &NamespaceTable, local: &str) -> Option<&'a str> {
    element
        .attributes
        .iter()
        .find(|a| {
            a.name.local == local
                && a.name.prefix().is_some()
                && resolve(element, namespaces, a.name.prefix()) == Some(XAML_NAMESPACE)
        })
        .map(|a| a.value.as_str())
        .filter(|v| !v.is_empty())
}

/// Resolves a prefix using declarations on the element itself, then the merged table.
fn resolve<'a>(element: &'a Element, namespaces: &'a NamespaceTable, prefix: Option<&str>) -> Option<&'a str> {
    let wanted = prefix.unwrap_or("");
    element
        .namespace_declarations()
        .find(|(p, _)| *p == wanted)
        .map(|(_, uri)| uri)
        .or_else(|| namespaces.uri_for(prefix))
}

/// The query part of a conditional namespace such as
/// `http://...presentation?IsApiContractPresent(Windows.Foundation.UniversalApiContract,7)`.
fn contract_condition<'a>(element: &'a Element, namespaces: &'a NamespaceTable) -> Option<&'a str> {
    element.name.prefix()?;
    let uri = resolve(element, namespaces, element.name.prefix())?;
    let (_, condition) = uri.split_once('?')?;
    condition.contains(API_CONTRACT_MARKER).then_some(condition)
}

/// Keys referenced anywhere in the subtree, deduplicated in first-seen order.
///
/// Attribute values are parsed as markup extensions; the property-element form
/// `<StaticResource ResourceKey="X"/>` counts as well.
pub fn used_keys(element: &Element) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    element.walk(&mut |e| {
        if markup::REFERENCE_KEYWORDS.contains(&e.name.local.as_str()) {
            if let Some(key) = e.attribute("ResourceKey").filter(|k| !k.is_empty()) {
                push_unique(&mut keys, key.to_string());
            }
        }
        for attr in &e.attributes {
            if attr.is_namespace_declaration() {
                continue;
            }
            for key in markup::references_in(&attr.value) {
                push_unique(&mut keys, key);
            }
        }
    });
    keys
}

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}
