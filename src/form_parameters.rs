use std::collections::HashMap;
use std::fmt;
use url::form_urlencoded;

/// Decoded request parameters, from either a GET query string or a POST form
/// body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParameters {
    pub params: HashMap<String, String>,
}

impl FormParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            params: pairs.into_iter().collect(),
        }
    }

    pub fn outcome_from_query(query: &str) -> Self {
        let pairs = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self::new_from_pairs(pairs)
    }

    /// Checks if a parameter is set and non-blank
    pub fn has_param(&self, param: &str) -> bool {
        match self.params.get(param) {
            Some(s) => !s.is_empty(),
            None => false,
        }
    }

    /// Returns the parameter value if present and non-empty, otherwise None
    pub fn get_param(&self, param: &str) -> Option<String> {
        if self.has_param(param) {
            self.params.get(param).map(|s| s.to_string())
        } else {
            None
        }
    }

    /// Returns the parameter value, falling back to `default` if absent or empty
    pub fn get_param_default(&self, param: &str, default: &str) -> String {
        self.get_param(param)
            .unwrap_or_else(|| default.to_string())
    }
}

impl fmt::Display for FormParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut keys: Vec<&String> = self.params.keys().collect();
        keys.sort();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for key in keys {
            if let Some(value) = self.params.get(key) {
                serializer.append_pair(key, value);
            }
        }
        write!(f, "{}", serializer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_query() {
        let fp = FormParameters::outcome_from_query("language=fr&format=json&doit=");
        assert_eq!(fp.get_param("language"), Some("fr".to_string()));
        assert_eq!(fp.get_param("format"), Some("json".to_string()));
        // Present but blank counts as absent
        assert!(!fp.has_param("doit"));
        assert_eq!(fp.get_param("doit"), None);
        assert_eq!(fp.get_param("missing"), None);
    }

    #[test]
    fn test_percent_decoding() {
        let fp = FormParameters::outcome_from_query("language=zh%2Dmin%2Dnan&x=a+b");
        assert_eq!(fp.get_param("language"), Some("zh-min-nan".to_string()));
        assert_eq!(fp.get_param("x"), Some("a b".to_string()));
    }

    #[test]
    fn test_get_param_default() {
        let fp = FormParameters::outcome_from_query("format=");
        assert_eq!(fp.get_param_default("format", "html"), "html");
        assert_eq!(fp.get_param_default("language", "en"), "en");
    }

    #[test]
    fn test_display_round_trip() {
        let fp = FormParameters::outcome_from_query("language=fr&format=json");
        let reparsed = FormParameters::outcome_from_query(&fp.to_string());
        assert_eq!(fp, reparsed);
    }
}
