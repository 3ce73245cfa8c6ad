//! Utility functions shared by the crates of the workspace.

/// Naming helpers for type-derived identifiers.
pub mod naming {
    /// Strips the module path and generic arguments from a `std::any::type_name` value.
    ///
    /// # Examples
    ///
    /// ```
    /// use webi_core::utils::naming::simple_type_name;
    ///
    /// assert_eq!(simple_type_name("hallo::controllers::Hallo"), "Hallo");
    /// assert_eq!(simple_type_name("alloc::vec::Vec<alloc::string::String>"), "Vec");
    /// assert_eq!(simple_type_name("Plain"), "Plain");
    /// ```
    pub fn simple_type_name(type_name: &str) -> &str {
        let without_generics = match type_name.find('<') {
            Some(index) => &type_name[..index],
            None => type_name,
        };
        match without_generics.rfind("::") {
            Some(index) => &without_generics[index + 2..],
            None => without_generics,
        }
    }

    /// URL segment derived from a type name: the simple name, lowercased.
    ///
    /// ```
    /// use webi_core::utils::naming::to_url_segment;
    ///
    /// assert_eq!(to_url_segment("demo::HalloService"), "halloservice");
    /// ```
    pub fn to_url_segment(type_name: &str) -> String {
        simple_type_name(type_name).to_lowercase()
    }

    /// Converts a PascalCase name to camelCase, e.g. `UrlMapper` to `urlMapper`.
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::naming::*;

    #[test]
    fn test_simple_type_name() {
        assert_eq!(simple_type_name("webi_web::rest::mapper::UrlMapper"), "UrlMapper");
        assert_eq!(simple_type_name("dyn webi_core::bean::Injectable"), "Injectable");
        assert_eq!(
            simple_type_name("std::collections::HashMap<String, Vec<u8>>"),
            "HashMap"
        );
        assert_eq!(simple_type_name(""), "");
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("UrlMapper"), "urlMapper");
        assert_eq!(to_camel_case("A"), "a");
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn test_to_url_segment() {
        assert_eq!(to_url_segment("Hallo"), "hallo");
        assert_eq!(to_url_segment("crate::WebiController"), "webicontroller");
    }
}
