use snaphound_core::UNCATEGORIZED;

/// Well-known category keys with their display labels, in report order.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("highval", "High Value Targets"),
    ("dirlist", "Directory Listings"),
    ("cms", "Content Management System (CMS)"),
    ("idrac", "IDRAC/ILo/Management Interfaces"),
    ("nas", "Network Attached Storage (NAS)"),
    ("comms", "Communications"),
    ("devops", "Development Operations"),
    ("secops", "Security Operations"),
    ("appops", "Application Operations"),
    ("dataops", "Data Operations"),
    ("netdev", "Network Devices"),
    ("voip", "Voice/Video over IP (VoIP)"),
    ("printer", "Printers"),
    ("infrastructure", "Infrastructure"),
    (UNCATEGORIZED, "Uncategorized"),
    ("construction", "Under Construction"),
    ("crap", "Splash Pages"),
    ("empty", "No Significant Content"),
    ("unauth", "401/403 Unauthorized"),
    ("notfound", "404 Not Found"),
    ("successfulLogin", "Successful Logins"),
    ("identifiedLogin", "Identified Logins"),
    ("redirector", "Redirecting Pages"),
    ("badhost", "Invalid Hostname"),
    ("inerror", "Internal Error"),
    ("badreq", "Bad Request"),
    ("badgw", "Bad Gateway"),
    ("serviceunavailable", "Service Unavailable"),
];

/// Display label for a category key. Unknown keys are shown verbatim.
pub fn display_label(key: &str) -> &str {
    CATEGORIES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}

/// The catalogue key for `category` when it names one by key or by display
/// label, so a rule written as "Identified Logins" groups with
/// `identifiedLogin`. Anything else is returned unchanged.
pub fn canonical_key(category: &str) -> &str {
    CATEGORIES
        .iter()
        .find(|(k, label)| *k == category || *label == category)
        .map(|(k, _)| *k)
        .unwrap_or(category)
}

/// Sort key for report sections: catalogue order first, then the rest
/// alphabetically.
pub fn section_rank(key: &str) -> (usize, &str) {
    match CATEGORIES.iter().position(|(k, _)| *k == key) {
        Some(pos) => (pos, ""),
        None => (CATEGORIES.len(), key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_for_known_and_custom_keys() {
        assert_eq!(display_label("cms"), "Content Management System (CMS)");
        assert_eq!(display_label(UNCATEGORIZED), "Uncategorized");
        assert_eq!(display_label("Identified Logins"), "Identified Logins");
    }

    #[test]
    fn display_labels_fold_back_to_their_key() {
        assert_eq!(canonical_key("Identified Logins"), "identifiedLogin");
        assert_eq!(canonical_key("identifiedLogin"), "identifiedLogin");
        assert_eq!(canonical_key("Identified-Logins"), "Identified-Logins");
        assert_eq!(canonical_key("My Routers"), "My Routers");
    }

    #[test]
    fn custom_keys_sort_after_catalogue() {
        let mut keys = vec!["Zebra", "uncategorized", "Alpha", "highval"];
        keys.sort_by_key(|k| section_rank(*k));
        assert_eq!(keys, vec!["highval", "uncategorized", "Alpha", "Zebra"]);
    }
}
