use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("email pattern is valid")
});

static POSTCODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z]{1,2}\d[a-z\d]?\s*\d[a-z]{2}$").expect("postcode pattern is valid")
});

/// Name, email and postal address shared by clients and payees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
    pub town: String,
    #[serde(default)]
    pub county: Option<String>,
    pub postcode: String,
}

impl Contact {
    /// Presence and format checks for contact details.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("address1", &self.address1),
            ("town", &self.town),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }

        if !self.email.trim().is_empty() && !EMAIL.is_match(self.email.trim()) {
            errors.add("email", "is invalid");
        }

        if !POSTCODE.is_match(self.postcode.trim()) {
            errors.add("postcode", "is badly formed postcode");
        }
    }

    pub fn address_single_line(&self) -> String {
        self.address_parts().join(", ")
    }

    pub fn address_multi_line(&self) -> String {
        let town_line = format!(
            "{}, {} {}",
            self.town,
            self.county.as_deref().unwrap_or(""),
            self.postcode
        );
        [Some(self.address1.clone()), self.address2.clone(), Some(town_line)]
            .into_iter()
            .flatten()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn address_parts(&self) -> Vec<&str> {
        [
            Some(self.address1.as_str()),
            self.address2.as_deref(),
            Some(self.town.as_str()),
            self.county.as_deref(),
            Some(self.postcode.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact {
            name: "Test Client".into(),
            email: "client@example.com".into(),
            address1: "1 High Street".into(),
            address2: None,
            town: "Cambridge".into(),
            county: None,
            postcode: "CB1 1TT".into(),
        }
    }

    #[test]
    fn test_valid_contact() {
        let mut errors = ValidationErrors::new();
        contact().validate(&mut errors);
        assert!(errors.is_empty(), "{errors}");
    }

    #[test]
    fn test_blank_fields_are_flagged() {
        for field in ["name", "email", "address1", "town"] {
            let mut c = contact();
            match field {
                "name" => c.name.clear(),
                "email" => c.email.clear(),
                "address1" => c.address1.clear(),
                _ => c.town.clear(),
            }
            let mut errors = ValidationErrors::new();
            c.validate(&mut errors);
            assert!(errors.contains(field), "{field} should be flagged");
        }
    }

    #[test]
    fn test_postcode_format() {
        for (postcode, ok) in [("CB1 1TT", true), ("cb1 1tt", true), ("cb999 111", false)] {
            let mut c = contact();
            c.postcode = postcode.into();
            let mut errors = ValidationErrors::new();
            c.validate(&mut errors);
            assert_eq!(errors.is_empty(), ok, "{postcode}");
        }
    }

    #[test]
    fn test_single_line_address_skips_blanks() {
        let mut c = contact();
        c.address2 = Some(String::new());
        assert_eq!(c.address_single_line(), "1 High Street, Cambridge, CB1 1TT");
    }
}
