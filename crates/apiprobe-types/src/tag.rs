//! The `<meqa …>` description tag.
//!
//! Spec authors (or the enrichment tooling) embed structured hints into
//! OpenAPI description strings: `<meqa Class.Property.Operation flags>`.
//! A tag binds a parameter or schema to a definition class, optionally one
//! of its properties and an operation override, plus flag keywords.

use std::fmt;

/// The tagged call is expected to succeed.
pub const FLAG_SUCCESS: u32 = 1;
/// The tagged call is expected to fail.
pub const FLAG_FAIL: u32 = 2;
/// A weak reference: not followed during dependency collection.
pub const FLAG_WEAK: u32 = 4;

const TAG_OPEN: &str = "<meqa ";

/// A parsed description tag. Equality is field-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeqaTag {
    pub class: String,
    pub property: String,
    pub operation: String,
    pub flags: u32,
}

impl MeqaTag {
    pub fn new(
        class: impl Into<String>,
        property: impl Into<String>,
        operation: impl Into<String>,
        flags: u32,
    ) -> Self {
        Self {
            class: class.into(),
            property: property.into(),
            operation: operation.into(),
            flags,
        }
    }

    /// Extract the first tag from a description string. Returns `None` when
    /// no well-formed tag is present.
    pub fn parse(description: &str) -> Option<Self> {
        let start = description.find(TAG_OPEN)?;
        let rest = &description[start + TAG_OPEN.len()..];
        let end = rest.find('>')?;
        let body = &rest[..end];

        let mut name_token: Option<&str> = None;
        let mut flags = 0u32;
        for token in body.split_whitespace() {
            match token {
                "success" => flags |= FLAG_SUCCESS,
                "fail" => flags |= FLAG_FAIL,
                "weak" => flags |= FLAG_WEAK,
                other => {
                    if !other
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
                    {
                        return None;
                    }
                    name_token = Some(other);
                }
            }
        }

        let name = name_token?;
        let mut parts = name.split('.');
        let class = parts.next().unwrap_or_default();
        if class.is_empty() {
            return None;
        }
        let property = parts.next().unwrap_or_default();
        let operation = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            // More than three dotted components is not a tag.
            return None;
        }
        Some(Self::new(class, property, operation, flags))
    }

    /// Convenience wrapper over an optional description.
    pub fn from_description(description: Option<&str>) -> Option<Self> {
        description.and_then(Self::parse)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn is_weak(&self) -> bool {
        self.has_flag(FLAG_WEAK)
    }
}

impl fmt::Display for MeqaTag {
    /// Emits `<meqa class[.property[.operation]]>`. Flags are not emitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<meqa {}", self.class)?;
        if !self.property.is_empty() {
            write!(f, ".{}", self.property)?;
        }
        if !self.operation.is_empty() {
            write!(f, ".{}", self.operation)?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn class_only() {
        let tag = MeqaTag::parse("Lists available pets <meqa Pet>").unwrap();
        assert_eq!(tag, MeqaTag::new("Pet", "", "", 0));
    }

    #[test]
    fn class_property_operation() {
        let tag = MeqaTag::parse("<meqa Pet.id.get>").unwrap();
        assert_eq!(tag.class, "Pet");
        assert_eq!(tag.property, "id");
        assert_eq!(tag.operation, "get");
    }

    #[test]
    fn flags() {
        let tag = MeqaTag::parse("<meqa Pet.id fail weak>").unwrap();
        assert!(tag.has_flag(FLAG_FAIL));
        assert!(tag.is_weak());
        assert!(!tag.has_flag(FLAG_SUCCESS));
    }

    #[test]
    fn first_tag_wins() {
        let tag = MeqaTag::parse("<meqa Pet> and later <meqa Store>").unwrap();
        assert_eq!(tag.class, "Pet");
    }

    #[test]
    fn invalid_strings() {
        assert!(MeqaTag::parse("no tag here").is_none());
        assert!(MeqaTag::parse("<meqa >").is_none());
        assert!(MeqaTag::parse("<meqa a.b.c.d>").is_none());
        assert!(MeqaTag::parse("<meqa unterminated").is_none());
        assert!(MeqaTag::parse("<meqa bad token!>").is_none());
        assert!(MeqaTag::from_description(None).is_none());
    }

    #[test]
    fn display_omits_flags() {
        let tag = MeqaTag::new("Pet", "id", "get", FLAG_WEAK);
        assert_eq!(tag.to_string(), "<meqa Pet.id.get>");
        let tag = MeqaTag::new("Pet", "", "", 0);
        assert_eq!(tag.to_string(), "<meqa Pet>");
    }

    proptest! {
        // Formatting a fully-populated tag and parsing it back is identity
        // on the name fields.
        #[test]
        fn round_trip(
            class in "[A-Za-z][A-Za-z0-9_]{0,8}",
            property in "[A-Za-z][A-Za-z0-9_]{0,8}",
            operation in "(get|put|post|patch|delete|head|options)",
        ) {
            let tag = MeqaTag::new(class, property, operation, 0);
            let parsed = MeqaTag::parse(&tag.to_string()).unwrap();
            prop_assert_eq!(parsed, tag);
        }
    }
}
