//! Error types for description parsing.

use thiserror::Error;

/// Errors that can occur while reading a robot-description document.
#[derive(Error, Debug)]
pub enum DescriptionError {
    /// I/O error reading the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed markup.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// A required attribute is absent.
    #[error("body '{body}': missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        /// Body the element belongs to.
        body: String,
        /// Element that should carry the attribute.
        element: &'static str,
        /// The missing attribute.
        attribute: &'static str,
    },

    /// An attribute is present but its value cannot be used.
    #[error("body '{body}': invalid value '{value}' for '{attribute}' on <{element}>")]
    InvalidAttribute {
        /// Body the element belongs to.
        body: String,
        /// Element carrying the attribute.
        element: &'static str,
        /// The offending attribute.
        attribute: &'static str,
        /// Raw attribute value.
        value: String,
    },

    /// Two bodies share a name.
    #[error("duplicate body name: {0}")]
    DuplicateBody(String),
}

impl DescriptionError {
    /// Create a missing attribute error.
    pub fn missing_attribute(
        body: impl Into<String>,
        element: &'static str,
        attribute: &'static str,
    ) -> Self {
        Self::MissingAttribute {
            body: body.into(),
            element,
            attribute,
        }
    }

    /// Create an invalid attribute error.
    pub fn invalid_attribute(
        body: impl Into<String>,
        element: &'static str,
        attribute: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            body: body.into(),
            element,
            attribute,
            value: value.into(),
        }
    }
}

/// Result type for description parsing.
pub type Result<T> = std::result::Result<T, DescriptionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attribute_names_body_and_axis() {
        let err = DescriptionError::missing_attribute("pole", "linear", "y");
        let msg = err.to_string();
        assert!(msg.contains("pole"));
        assert!(msg.contains("'y'"));
        assert!(msg.contains("<linear>"));
    }

    #[test]
    fn invalid_attribute_keeps_raw_value() {
        let err = DescriptionError::invalid_attribute("cart", "inertia", "mass", "heavy");
        assert!(err.to_string().contains("heavy"));
    }
}
