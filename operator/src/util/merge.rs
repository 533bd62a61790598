use std::collections::BTreeMap;

/// Merges `overrides` on top of `base`, preferring `overrides` on key
/// collision. Used to layer user-supplied labels/annotations over the
/// materializer's own generated ones without losing either side.
pub fn merge_maps(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_on_collision() {
        let mut base = BTreeMap::new();
        base.insert("app".to_string(), "storm".to_string());
        base.insert("tier".to_string(), "backend".to_string());
        let mut overrides = BTreeMap::new();
        overrides.insert("tier".to_string(), "custom".to_string());

        let merged = merge_maps(&base, &overrides);
        assert_eq!(merged.get("app"), Some(&"storm".to_string()));
        assert_eq!(merged.get("tier"), Some(&"custom".to_string()));
    }
}
