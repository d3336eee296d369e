/// USPS state and territory codes paired with their display names.
pub const STATES: &[(&str, &str)] = &[
    ("AK", "Alaska"),
    ("AL", "Alabama"),
    ("AR", "Arkansas"),
    ("AS", "American Samoa"),
    ("AZ", "Arizona"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DC", "District of Columbia"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("GU", "Guam"),
    ("HI", "Hawaii"),
    ("IA", "Iowa"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("MA", "Massachusetts"),
    ("MD", "Maryland"),
    ("ME", "Maine"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MO", "Missouri"),
    ("MP", "Northern Mariana Islands"),
    ("MS", "Mississippi"),
    ("MT", "Montana"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("NE", "Nebraska"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NV", "Nevada"),
    ("NY", "New York"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("PR", "Puerto Rico"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VA", "Virginia"),
    ("VI", "U.S. Virgin Islands"),
    ("VT", "Vermont"),
    ("WA", "Washington"),
    ("WI", "Wisconsin"),
    ("WV", "West Virginia"),
    ("WY", "Wyoming"),
];

pub fn state_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    STATES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Display name for a code; unknown codes are returned unchanged.
pub fn display_name(code: &str) -> String {
    state_name(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

/// Resolves a state filter value to the code stored in the fact table.
///
/// Accepts either a code (`"OH"`, `"oh"`) or a display name (`"Ohio"`).
/// Values that match neither are passed through so they filter to nothing
/// rather than to everything.
pub fn normalize_state_code(value: &str) -> String {
    let value = value.trim();
    if let Some((code, _)) = STATES.iter().find(|(c, _)| c.eq_ignore_ascii_case(value)) {
        return code.to_string();
    }
    if let Some((code, _)) = STATES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(value))
    {
        return code.to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_names() {
        assert_eq!(state_name("OH"), Some("Ohio"));
        assert_eq!(state_name("dc"), Some("District of Columbia"));
        assert_eq!(display_name("XX"), "XX");
    }

    #[test]
    fn normalize_accepts_codes_and_names() {
        assert_eq!(normalize_state_code("Ohio"), "OH");
        assert_eq!(normalize_state_code("new york"), "NY");
        assert_eq!(normalize_state_code("tx"), "TX");
        assert_eq!(normalize_state_code("Atlantis"), "Atlantis");
    }

    #[test]
    fn table_is_sorted_and_unique() {
        assert!(STATES.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
